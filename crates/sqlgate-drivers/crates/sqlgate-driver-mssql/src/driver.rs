//! MS SQL Server driver implementation

use crate::connection::MssqlConnection;
use async_trait::async_trait;
use sqlgate_core::{
    Connection, ConnectionConfig, DatabaseDriver, DriverCapabilities, Result, SqlgateError,
};

/// MS SQL Server database driver
pub struct MssqlDriver;

impl MssqlDriver {
    /// Create a new MS SQL Server driver instance
    pub fn new() -> Self {
        tracing::debug!("MS SQL Server driver initialized");
        Self
    }
}

impl Default for MssqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for MssqlDriver {
    fn id(&self) -> &'static str {
        "mssql"
    }

    fn name(&self) -> &'static str {
        "MS SQL Server"
    }

    fn default_port(&self) -> u16 {
        1433
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            supports_transactions: true,
            supports_stored_procedures: true,
            supports_parameter_derivation: true,
            supports_output_parameters: true,
            max_parameters: Some(2100), // SQL Server limit
        }
    }

    #[tracing::instrument(skip(self, config), fields(host = %config.host, database = config.database.as_deref()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        tracing::debug!("connecting to MS SQL Server");
        let connection = MssqlConnection::from_config(config).await?;
        Ok(Box::new(connection))
    }

    /// Parse an ADO-style connection string:
    /// `Server=host,port;Database=db;User Id=user;Password=pass`
    fn parse_connection_string(&self, connection_string: &str) -> Result<ConnectionConfig> {
        let mut config = ConnectionConfig::default();
        config.host = "localhost".to_string();

        for pair in connection_string.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let Some((key, value)) = pair.split_once('=') else {
                return Err(SqlgateError::Configuration(format!(
                    "malformed connection string segment '{}'",
                    pair
                )));
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "server" | "data source" => {
                    if let Some((host, port)) = value.split_once(',') {
                        config.host = host.trim().to_string();
                        let port = port.trim().parse::<u16>().map_err(|_| {
                            SqlgateError::Configuration(format!(
                                "invalid port '{}' in connection string",
                                port
                            ))
                        })?;
                        config.port = Some(port);
                    } else {
                        config.host = value.to_string();
                    }
                }
                "database" | "initial catalog" => {
                    config.database = Some(value.to_string());
                }
                "user id" | "uid" => {
                    config.username = Some(value.to_string());
                }
                "password" | "pwd" => {
                    config.password = Some(value.to_string());
                }
                "trustservercertificate" | "trust server certificate" => {
                    let trust = value.eq_ignore_ascii_case("true") || value == "1";
                    config
                        .options
                        .insert("trust_cert".to_string(), trust.to_string());
                }
                // Keys like Trusted_Connection or Application Name pass
                // through as driver options
                other => {
                    config
                        .options
                        .insert(other.to_string(), value.to_string());
                }
            }
        }

        Ok(config)
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        let mut conn_str = match config.port {
            Some(port) => format!("Server={},{}", config.host, port),
            None => format!("Server={}", config.host),
        };

        if let Some(db) = &config.database {
            conn_str.push_str(&format!(";Database={}", db));
        }

        if let Some(user) = &config.username {
            conn_str.push_str(&format!(";User Id={}", user));
            if let Some(password) = &config.password {
                conn_str.push_str(&format!(";Password={}", password));
            }
        } else {
            conn_str.push_str(";Trusted_Connection=True");
        }

        if config.options.get("trust_cert").map(String::as_str) == Some("true") {
            conn_str.push_str(";TrustServerCertificate=True");
        }

        conn_str
    }
}
