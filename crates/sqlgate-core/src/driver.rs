//! Database driver trait and connection configuration

use crate::{Connection, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for opening a database connection
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConnectionConfig {
    /// Hostname or IP address
    pub host: String,
    /// Port number (driver default when `None`)
    pub port: Option<u16>,
    /// Database name
    pub database: Option<String>,
    /// Username
    pub username: Option<String>,
    /// Password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Driver-specific options (e.g. `encrypt`, `application_name`)
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Capabilities a driver supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverCapabilities {
    pub supports_transactions: bool,
    pub supports_stored_procedures: bool,
    pub supports_parameter_derivation: bool,
    pub supports_output_parameters: bool,
    /// Maximum number of parameters per command, if the backend caps it
    pub max_parameters: Option<usize>,
}

/// A database backend implementation
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique driver identifier (e.g. "mssql", "postgres")
    fn id(&self) -> &'static str;

    /// Human-readable driver name
    fn name(&self) -> &'static str;

    /// Default port for this database
    fn default_port(&self) -> u16;

    /// What this driver supports
    fn capabilities(&self) -> DriverCapabilities;

    /// Open a connection from structured configuration
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>>;

    /// Open a connection from a driver-native connection string
    async fn connect_str(&self, connection_string: &str) -> Result<Box<dyn Connection>> {
        let config = self.parse_connection_string(connection_string)?;
        self.connect(&config).await
    }

    /// Parse a driver-native connection string into configuration
    fn parse_connection_string(&self, connection_string: &str) -> Result<ConnectionConfig>;

    /// Render configuration back into a driver-native connection string
    fn build_connection_string(&self, config: &ConnectionConfig) -> String;
}
