//! MS SQL Server connection and transaction implementation using tiberius

use crate::parameters;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, Row as TiberiusRow};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use sqlgate_core::{
    ColumnMeta, Command, CommandType, Connection, IsolationLevel, ParameterDirection,
    ParameterSet, ParameterSource, QueryResult, Result, Row, SqlgateError, StatementOutcome,
    Transaction, Value,
};

pub(crate) type TiberiusClient = Client<Compat<TcpStream>>;

/// MS SQL Server connection errors
#[derive(Debug, thiserror::Error)]
pub enum MssqlConnectionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Tiberius error: {0}")]
    Tiberius(#[from] tiberius::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MssqlConnectionError> for SqlgateError {
    fn from(err: MssqlConnectionError) -> Self {
        match err {
            MssqlConnectionError::ConnectionClosed => {
                SqlgateError::Usage("connection is closed".to_string())
            }
            other => SqlgateError::Connection(other.to_string()),
        }
    }
}

/// MS SQL Server connection using tiberius.
///
/// The client is shared behind a mutex so an open transaction issues its
/// statements on the same TDS session that ran BEGIN TRANSACTION.
pub struct MssqlConnection {
    client: Arc<Mutex<TiberiusClient>>,
    closed: AtomicBool,
    host: String,
    database: Option<String>,
}

impl MssqlConnection {
    /// Open a connection to an MS SQL Server instance
    #[tracing::instrument(skip(password))]
    pub async fn connect(
        host: &str,
        port: u16,
        database: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
        trust_cert: bool,
    ) -> std::result::Result<Self, MssqlConnectionError> {
        tracing::debug!("connecting to MS SQL Server at {}:{}", host, port);

        let mut config = Config::new();
        config.host(host);
        config.port(port);

        if let Some(db) = database {
            config.database(db);
        }

        if trust_cert {
            config.trust_cert();
        }

        config.encryption(EncryptionLevel::Required);

        match (username, password) {
            (Some(user), Some(pass)) => {
                config.authentication(AuthMethod::sql_server(user, pass));
            }
            (Some(user), None) => {
                config.authentication(AuthMethod::sql_server(user, ""));
            }
            (None, _) => {
                #[cfg(windows)]
                {
                    config.authentication(AuthMethod::Integrated);
                }
                #[cfg(not(windows))]
                {
                    return Err(MssqlConnectionError::AuthenticationFailed(
                        "Windows authentication is only supported on Windows".to_string(),
                    ));
                }
            }
        }

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?;

        tcp.set_nodelay(true)?;
        let compat_stream = tcp.compat_write();

        let client = Client::connect(config, compat_stream)
            .await
            .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?;

        tracing::debug!("successfully connected to MS SQL Server");

        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            closed: AtomicBool::new(false),
            host: host.to_string(),
            database: database.map(String::from),
        })
    }

    /// Open a connection from structured configuration
    pub async fn from_config(
        config: &sqlgate_core::ConnectionConfig,
    ) -> std::result::Result<Self, MssqlConnectionError> {
        let port = config.port.unwrap_or(1433);
        let trust_cert = config
            .options
            .get("trust_cert")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self::connect(
            &config.host,
            port,
            config.database.as_deref(),
            config.username.as_deref(),
            config.password.as_deref(),
            trust_cert,
        )
        .await
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MssqlConnectionError::ConnectionClosed.into());
        }
        Ok(())
    }
}

#[async_trait]
impl ParameterSource for MssqlConnection {
    fn data_source(&self) -> String {
        format!(
            "mssql://{}/{}",
            self.host,
            self.database.as_deref().unwrap_or("master")
        )
    }

    async fn derive_parameters(
        &self,
        procedure: &str,
        include_return: bool,
    ) -> Result<ParameterSet> {
        self.ensure_not_closed()?;
        parameters::derive_parameters(&self.client, procedure, include_return).await
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    async fn query(&self, command: &Command) -> Result<QueryResult> {
        self.ensure_not_closed()?;
        run_query(&self.client, command).await
    }

    async fn query_all(&self, command: &Command) -> Result<Vec<QueryResult>> {
        self.ensure_not_closed()?;
        run_query_all(&self.client, command).await
    }

    async fn execute(&self, command: &Command) -> Result<StatementOutcome> {
        self.ensure_not_closed()?;
        run_execute(&self.client, command).await
    }

    async fn begin_transaction(
        &self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn Transaction>> {
        self.ensure_not_closed()?;

        let level = match isolation {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
        };
        let batch = format!(
            "SET TRANSACTION ISOLATION LEVEL {}; BEGIN TRANSACTION",
            level
        );

        {
            let mut client = self.client.lock().await;
            client
                .simple_query(&batch)
                .await
                .map_err(|e| SqlgateError::Query(e.to_string()))?
                .into_results()
                .await
                .map_err(|e| SqlgateError::Query(e.to_string()))?;
        }

        tracing::debug!(isolation = level, "transaction started");

        Ok(Box::new(MssqlTransaction {
            client: Arc::clone(&self.client),
            active: AtomicBool::new(true),
            data_source: self.data_source(),
        }))
    }

    async fn is_valid(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let mut client = self.client.lock().await;
        match client.simple_query("SELECT 1").await {
            Ok(stream) => stream.into_results().await.is_ok(),
            Err(_) => false,
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("MS SQL Server connection closed");
        Ok(())
    }
}

/// An open MS SQL Server transaction.
///
/// Statements run on the connection's own TDS session; `active` guards
/// against use after commit or rollback.
pub struct MssqlTransaction {
    client: Arc<Mutex<TiberiusClient>>,
    active: AtomicBool,
    data_source: String,
}

impl MssqlTransaction {
    fn ensure_active(&self) -> Result<()> {
        if !self.active.load(Ordering::SeqCst) {
            return Err(SqlgateError::Usage(
                "transaction has already been committed or rolled back".to_string(),
            ));
        }
        Ok(())
    }

    async fn finish(&self, statement: &str) -> Result<()> {
        self.ensure_active()?;
        let mut client = self.client.lock().await;
        client
            .simple_query(statement)
            .await
            .map_err(|e| SqlgateError::Query(e.to_string()))?
            .into_results()
            .await
            .map_err(|e| SqlgateError::Query(e.to_string()))?;
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ParameterSource for MssqlTransaction {
    fn data_source(&self) -> String {
        self.data_source.clone()
    }

    async fn derive_parameters(
        &self,
        procedure: &str,
        include_return: bool,
    ) -> Result<ParameterSet> {
        self.ensure_active()?;
        parameters::derive_parameters(&self.client, procedure, include_return).await
    }
}

#[async_trait]
impl Transaction for MssqlTransaction {
    async fn query(&self, command: &Command) -> Result<QueryResult> {
        self.ensure_active()?;
        run_query(&self.client, command).await
    }

    async fn query_all(&self, command: &Command) -> Result<Vec<QueryResult>> {
        self.ensure_active()?;
        run_query_all(&self.client, command).await
    }

    async fn execute(&self, command: &Command) -> Result<StatementOutcome> {
        self.ensure_active()?;
        run_execute(&self.client, command).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish("COMMIT TRANSACTION").await?;
        tracing::debug!("transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK TRANSACTION").await?;
        tracing::debug!("transaction rolled back");
        Ok(())
    }
}

/// Render a command into executable T-SQL.
///
/// Stored procedures become an EXEC statement with named assignments bound
/// to positional placeholders, in declaration order. The return-value
/// descriptor never participates in the rendered call.
pub(crate) fn render_command(command: &Command) -> String {
    match command.command_type() {
        CommandType::Text => command.command_text().to_string(),
        CommandType::StoredProcedure => {
            let assignments: Vec<String> = command
                .parameters()
                .iter()
                .filter(|p| p.direction != ParameterDirection::ReturnValue)
                .enumerate()
                .map(|(idx, p)| format!("@{} = @P{}", p.name, idx + 1))
                .collect();

            let name = quote_procedure_name(command.command_text());
            if assignments.is_empty() {
                format!("EXEC {}", name)
            } else {
                format!("EXEC {} {}", name, assignments.join(", "))
            }
        }
    }
}

/// Bracket-quote each dotted part of a procedure name
pub(crate) fn quote_procedure_name(name: &str) -> String {
    name.split('.')
        .map(|part| format!("[{}]", part.trim_matches(['[', ']'])))
        .collect::<Vec<_>>()
        .join(".")
}

pub(crate) async fn run_query(
    client: &Mutex<TiberiusClient>,
    command: &Command,
) -> Result<QueryResult> {
    let mut results = run_query_all(client, command).await?;
    if results.is_empty() {
        Ok(QueryResult::empty())
    } else {
        Ok(results.swap_remove(0))
    }
}

async fn run_query_all(
    client: &Mutex<TiberiusClient>,
    command: &Command,
) -> Result<Vec<QueryResult>> {
    let sql = render_command(command);
    let values = command.parameters().bound_values();
    let start = std::time::Instant::now();

    let row_sets = tokio::time::timeout(command.timeout(), async {
        let mut client = client.lock().await;

        let stream = if values.is_empty() {
            client.query(&sql, &[]).await
        } else {
            let tiberius_params = values_to_tiberius_params(&values);
            let param_refs: Vec<&dyn tiberius::ToSql> = tiberius_params
                .iter()
                .map(|p| p.as_ref() as &dyn tiberius::ToSql)
                .collect();
            client.query(&sql, &param_refs[..]).await
        };

        match stream {
            Ok(query_stream) => query_stream
                .into_results()
                .await
                .map_err(|e| SqlgateError::Query(e.to_string())),
            Err(e) => {
                tracing::error!(error = %e, "query failed");
                Err(SqlgateError::Query(e.to_string()))
            }
        }
    })
    .await
    .map_err(|_| SqlgateError::Timeout(format!("command exceeded {:?}", command.timeout())))??;

    let execution_time_ms = start.elapsed().as_millis() as u64;
    let mut results = Vec::with_capacity(row_sets.len());

    for tib_rows in row_sets {
        let mut columns: Vec<ColumnMeta> = Vec::new();
        if let Some(first_row) = tib_rows.first() {
            columns = first_row
                .columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| tiberius_column_to_meta(col, idx))
                .collect();
        }

        let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let mut rows: Vec<Row> = Vec::with_capacity(tib_rows.len());
        for tib_row in tib_rows {
            let values = tiberius_row_to_values(tib_row)?;
            rows.push(Row::new(column_names.clone(), values));
        }

        results.push(QueryResult {
            columns,
            rows,
            affected_rows: 0,
            execution_time_ms,
        });
    }

    tracing::debug!(
        result_sets = results.len(),
        duration_ms = execution_time_ms,
        "query completed"
    );

    Ok(results)
}

async fn run_execute(
    client: &Mutex<TiberiusClient>,
    command: &Command,
) -> Result<StatementOutcome> {
    let sql = render_command(command);
    let values = command.parameters().bound_values();
    let start = std::time::Instant::now();

    let exec_result = tokio::time::timeout(command.timeout(), async {
        let mut client = client.lock().await;

        let result = if values.is_empty() {
            client.execute(&sql, &[]).await
        } else {
            let tiberius_params = values_to_tiberius_params(&values);
            let param_refs: Vec<&dyn tiberius::ToSql> = tiberius_params
                .iter()
                .map(|p| p.as_ref() as &dyn tiberius::ToSql)
                .collect();
            client.execute(&sql, &param_refs[..]).await
        };

        result.map_err(|e| {
            tracing::error!(error = %e, "execute failed");
            SqlgateError::Query(e.to_string())
        })
    })
    .await
    .map_err(|_| SqlgateError::Timeout(format!("command exceeded {:?}", command.timeout())))??;

    let affected_rows = exec_result.rows_affected().iter().sum::<u64>();
    let execution_time_ms = start.elapsed().as_millis() as u64;
    tracing::debug!(
        affected_rows = affected_rows,
        duration_ms = execution_time_ms,
        "execute completed"
    );

    Ok(StatementOutcome {
        affected_rows,
        execution_time_ms,
    })
}

/// Convert a tiberius column to ColumnMeta
fn tiberius_column_to_meta(col: &tiberius::Column, ordinal: usize) -> ColumnMeta {
    ColumnMeta {
        name: col.name().to_string(),
        data_type: format!("{:?}", col.column_type()),
        nullable: true,
        ordinal,
        max_length: None,
        precision: None,
        scale: None,
    }
}

/// Convert a tiberius row to a vector of Values by consuming the row
fn tiberius_row_to_values(row: TiberiusRow) -> Result<Vec<Value>> {
    let mut values = Vec::new();

    for col_data in row.into_iter() {
        let value = column_data_to_value(col_data)?;
        values.push(value);
    }

    Ok(values)
}

/// Convert tiberius ColumnData to a sqlgate Value
pub(crate) fn column_data_to_value(col_data: ColumnData<'static>) -> Result<Value> {
    match col_data {
        ColumnData::Bit(None) => Ok(Value::Null),
        ColumnData::Bit(Some(v)) => Ok(Value::Bool(v)),
        ColumnData::U8(None) => Ok(Value::Null),
        ColumnData::U8(Some(v)) => Ok(Value::Int32(v as i32)),
        ColumnData::I16(None) => Ok(Value::Null),
        ColumnData::I16(Some(v)) => Ok(Value::Int16(v)),
        ColumnData::I32(None) => Ok(Value::Null),
        ColumnData::I32(Some(v)) => Ok(Value::Int32(v)),
        ColumnData::I64(None) => Ok(Value::Null),
        ColumnData::I64(Some(v)) => Ok(Value::Int64(v)),
        ColumnData::F32(None) => Ok(Value::Null),
        ColumnData::F32(Some(v)) => Ok(Value::Float32(v)),
        ColumnData::F64(None) => Ok(Value::Null),
        ColumnData::F64(Some(v)) => Ok(Value::Float64(v)),
        ColumnData::String(None) => Ok(Value::Null),
        ColumnData::String(Some(v)) => Ok(Value::String(v.into_owned())),
        ColumnData::Guid(None) => Ok(Value::Null),
        ColumnData::Guid(Some(v)) => Ok(Value::Uuid(v)),
        ColumnData::Binary(None) => Ok(Value::Null),
        ColumnData::Binary(Some(v)) => Ok(Value::Bytes(v.into_owned())),
        ColumnData::Numeric(None) => Ok(Value::Null),
        ColumnData::Numeric(Some(v)) => Ok(Value::Decimal(v.to_string())),
        ColumnData::DateTime(None) => Ok(Value::Null),
        ColumnData::DateTime(Some(v)) => {
            let dt = chrono::NaiveDateTime::new(
                chrono::NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default()
                    + chrono::Duration::days(v.days() as i64),
                chrono::NaiveTime::from_num_seconds_from_midnight_opt(
                    (v.seconds_fragments() as f64 / 300.0) as u32,
                    0,
                )
                .unwrap_or_default(),
            );
            Ok(Value::DateTime(dt))
        }
        ColumnData::SmallDateTime(None) => Ok(Value::Null),
        ColumnData::SmallDateTime(Some(v)) => {
            let dt = chrono::NaiveDateTime::new(
                chrono::NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default()
                    + chrono::Duration::days(v.days() as i64),
                chrono::NaiveTime::from_num_seconds_from_midnight_opt(
                    (v.seconds_fragments() as u32) * 60,
                    0,
                )
                .unwrap_or_default(),
            );
            Ok(Value::DateTime(dt))
        }
        ColumnData::DateTime2(None) => Ok(Value::Null),
        ColumnData::DateTime2(Some(v)) => {
            let date = v.date();
            let time = v.time();
            let dt = chrono::NaiveDateTime::new(
                chrono::NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or_default()
                    + chrono::Duration::days(date.days() as i64),
                chrono::NaiveTime::from_num_seconds_from_midnight_opt(
                    (time.increments() / 10_000_000) as u32,
                    ((time.increments() % 10_000_000) * 100) as u32,
                )
                .unwrap_or_default(),
            );
            Ok(Value::DateTime(dt))
        }
        ColumnData::DateTimeOffset(None) => Ok(Value::Null),
        ColumnData::DateTimeOffset(Some(v)) => {
            let dt2 = v.datetime2();
            let date = dt2.date();
            let time = dt2.time();
            let naive = chrono::NaiveDateTime::new(
                chrono::NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or_default()
                    + chrono::Duration::days(date.days() as i64),
                chrono::NaiveTime::from_num_seconds_from_midnight_opt(
                    (time.increments() / 10_000_000) as u32,
                    ((time.increments() % 10_000_000) * 100) as u32,
                )
                .unwrap_or_default(),
            );
            let utc =
                chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(naive, chrono::Utc);
            Ok(Value::DateTimeUtc(utc))
        }
        ColumnData::Date(None) => Ok(Value::Null),
        ColumnData::Date(Some(v)) => {
            let date = chrono::NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or_default()
                + chrono::Duration::days(v.days() as i64);
            Ok(Value::Date(date))
        }
        ColumnData::Time(None) => Ok(Value::Null),
        ColumnData::Time(Some(v)) => {
            let time = chrono::NaiveTime::from_num_seconds_from_midnight_opt(
                (v.increments() / 10_000_000) as u32,
                ((v.increments() % 10_000_000) * 100) as u32,
            )
            .unwrap_or_default();
            Ok(Value::Time(time))
        }
        ColumnData::Xml(None) => Ok(Value::Null),
        ColumnData::Xml(Some(v)) => Ok(Value::String(v.into_owned().into_string())),
    }
}

/// Container for tiberius parameter values
#[derive(Debug)]
pub(crate) enum TiberiusParam {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
}

impl tiberius::ToSql for TiberiusParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            TiberiusParam::Null => ColumnData::I32(None),
            TiberiusParam::Bool(v) => ColumnData::Bit(Some(*v)),
            TiberiusParam::I16(v) => ColumnData::I16(Some(*v)),
            TiberiusParam::I32(v) => ColumnData::I32(Some(*v)),
            TiberiusParam::I64(v) => ColumnData::I64(Some(*v)),
            TiberiusParam::F32(v) => ColumnData::F32(Some(*v)),
            TiberiusParam::F64(v) => ColumnData::F64(Some(*v)),
            TiberiusParam::String(v) => {
                ColumnData::String(Some(std::borrow::Cow::Borrowed(v.as_str())))
            }
            TiberiusParam::Bytes(v) => {
                ColumnData::Binary(Some(std::borrow::Cow::Borrowed(v.as_slice())))
            }
            TiberiusParam::Uuid(v) => ColumnData::Guid(Some(*v)),
        }
    }
}

/// Convert sqlgate Values to tiberius parameters
pub(crate) fn values_to_tiberius_params(values: &[Value]) -> Vec<Box<TiberiusParam>> {
    values
        .iter()
        .map(|v| {
            let param = match v {
                Value::Null => TiberiusParam::Null,
                Value::Bool(b) => TiberiusParam::Bool(*b),
                Value::Int16(i) => TiberiusParam::I16(*i),
                Value::Int32(i) => TiberiusParam::I32(*i),
                Value::Int64(i) => TiberiusParam::I64(*i),
                Value::Float32(f) => TiberiusParam::F32(*f),
                Value::Float64(f) => TiberiusParam::F64(*f),
                Value::Decimal(d) => TiberiusParam::String(d.clone()),
                Value::String(s) => TiberiusParam::String(s.clone()),
                Value::Bytes(b) => TiberiusParam::Bytes(b.clone()),
                Value::Uuid(u) => TiberiusParam::Uuid(*u),
                Value::Date(d) => TiberiusParam::String(d.to_string()),
                Value::Time(t) => TiberiusParam::String(t.to_string()),
                Value::DateTime(dt) => TiberiusParam::String(dt.to_string()),
                Value::DateTimeUtc(dt) => TiberiusParam::String(dt.to_string()),
            };
            Box::new(param)
        })
        .collect()
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
