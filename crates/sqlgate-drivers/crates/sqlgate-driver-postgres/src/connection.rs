//! PostgreSQL connection and transaction implementation

use async_trait::async_trait;
use bytes::BytesMut;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio_postgres::{
    Client, NoTls, Row as PgRow,
    types::{FromSql, ToSql},
};
use sqlgate_core::{
    ColumnMeta, Command, CommandType, Connection, IsolationLevel, ParameterDescriptor,
    ParameterDirection, ParameterSet, ParameterSource, QueryResult, Result, Row, SqlgateError,
    StatementOutcome, Transaction, Value,
};

fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let code = db_error.code();
    let mut message = db_error.message().to_string();

    if let Some(detail) = db_error.detail() {
        if !detail.trim().is_empty() {
            message.push_str(&format!(" (detail: {})", detail));
        }
    }

    if let Some(hint) = db_error.hint() {
        if !hint.trim().is_empty() {
            message.push_str(&format!(" (hint: {})", hint));
        }
    }

    match code.code() {
        "23505" => format!("duplicate value violates unique constraint: {}", message),
        "23503" => format!("foreign key violation: {}", message),
        "23502" => format!("null value violates not-null constraint: {}", message),
        "22007" => format!("invalid datetime format: {}", message),
        "22P02" => format!("invalid input syntax: {}", message),
        _ => format!("{} (code: {:?})", message, code),
    }
}

/// PostgreSQL connection wrapper
pub struct PostgresConnection {
    client: Arc<Mutex<Client>>,
    closed: AtomicBool,
    host: String,
    database: String,
}

impl PostgresConnection {
    /// Connect to a PostgreSQL database
    pub async fn connect(
        host: &str,
        port: u16,
        database: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self> {
        tracing::debug!(
            host = %host,
            port = %port,
            database = %database,
            "connecting to PostgreSQL database"
        );

        let mut config = tokio_postgres::Config::new();
        config.host(host).port(port).dbname(database);

        if let Some(u) = user {
            config.user(u);
        }
        if let Some(p) = password {
            config.password(p);
        }

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| SqlgateError::Connection(format!("failed to connect to PostgreSQL: {}", e)))?;

        // The connection object drives the socket until the client drops
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "PostgreSQL connection error");
            }
        });

        tracing::debug!(host = %host, database = %database, "PostgreSQL connection established");

        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            closed: AtomicBool::new(false),
            host: host.to_string(),
            database: database.to_string(),
        })
    }

    /// Open a connection from structured configuration
    pub async fn from_config(config: &sqlgate_core::ConnectionConfig) -> Result<Self> {
        let port = config.port.unwrap_or(5432);
        let database = config.database.as_deref().unwrap_or("postgres");
        Self::connect(
            &config.host,
            port,
            database,
            config.username.as_deref(),
            config.password.as_deref(),
        )
        .await
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SqlgateError::Usage("connection is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ParameterSource for PostgresConnection {
    fn data_source(&self) -> String {
        format!("postgres://{}/{}", self.host, self.database)
    }

    async fn derive_parameters(
        &self,
        procedure: &str,
        include_return: bool,
    ) -> Result<ParameterSet> {
        self.ensure_not_closed()?;
        derive_parameters(&self.client, procedure, include_return).await
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn query(&self, command: &Command) -> Result<QueryResult> {
        self.ensure_not_closed()?;
        run_query(&self.client, command).await
    }

    async fn query_all(&self, command: &Command) -> Result<Vec<QueryResult>> {
        // A prepared statement yields exactly one result set
        self.ensure_not_closed()?;
        Ok(vec![run_query(&self.client, command).await?])
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

        let statement = match isolation {
            IsolationLevel::ReadCommitted => "BEGIN ISOLATION LEVEL READ COMMITTED",
            IsolationLevel::ReadUncommitted => "BEGIN ISOLATION LEVEL READ UNCOMMITTED",
        };

        {
            let client = self.client.lock().await;
            client.batch_execute(statement).await.map_err(|e| {
                SqlgateError::Query(format!(
                    "failed to begin transaction: {}",
                    format_postgres_error(&e)
                ))
            })?;
        }

        tracing::debug!(statement = statement, "transaction started");

        Ok(Box::new(PostgresTransaction {
            client: Arc::clone(&self.client),
            active: AtomicBool::new(true),
            data_source: self.data_source(),
        }))
    }

    async fn is_valid(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let client = self.client.lock().await;
        client.simple_query("SELECT 1").await.is_ok()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("PostgreSQL connection closed");
        Ok(())
    }
}

/// PostgreSQL transaction wrapper.
///
/// Statements run on the connection's own session; `active` guards against
/// use after commit or rollback.
pub struct PostgresTransaction {
    client: Arc<Mutex<Client>>,
    active: AtomicBool,
    data_source: String,
}

impl PostgresTransaction {
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
        let client = self.client.lock().await;
        client.batch_execute(statement).await.map_err(|e| {
            SqlgateError::Query(format!(
                "failed to {} transaction: {}",
                statement.to_lowercase(),
                format_postgres_error(&e)
            ))
        })?;
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ParameterSource for PostgresTransaction {
    fn data_source(&self) -> String {
        self.data_source.clone()
    }

    async fn derive_parameters(
        &self,
        procedure: &str,
        include_return: bool,
    ) -> Result<ParameterSet> {
        self.ensure_active()?;
        derive_parameters(&self.client, procedure, include_return).await
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn query(&self, command: &Command) -> Result<QueryResult> {
        self.ensure_active()?;
        run_query(&self.client, command).await
    }

    async fn query_all(&self, command: &Command) -> Result<Vec<QueryResult>> {
        self.ensure_active()?;
        Ok(vec![run_query(&self.client, command).await?])
    }

    async fn execute(&self, command: &Command) -> Result<StatementOutcome> {
        self.ensure_active()?;
        run_execute(&self.client, command).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish("COMMIT").await?;
        tracing::debug!("PostgreSQL transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK").await?;
        tracing::debug!("PostgreSQL transaction rolled back");
        Ok(())
    }
}

const EXISTENCE_QUERY: &str = "SELECT 1
     FROM information_schema.routines
     WHERE routine_schema = $1 AND routine_name = $2";

const PARAMETERS_QUERY: &str = "SELECT
        p.parameter_name,
        p.data_type,
        p.parameter_mode,
        p.ordinal_position
     FROM information_schema.parameters p
     JOIN information_schema.routines r ON p.specific_name = r.specific_name
        AND p.specific_schema = r.specific_schema
     WHERE r.routine_schema = $1 AND r.routine_name = $2
        AND p.ordinal_position > 0
     ORDER BY p.ordinal_position";

/// Discover a procedure's parameters from `information_schema`.
///
/// PostgreSQL procedures have no integer return value, so requesting the
/// return-value descriptor is not supported on this backend.
async fn derive_parameters(
    client: &Mutex<Client>,
    procedure: &str,
    include_return: bool,
) -> Result<ParameterSet> {
    if include_return {
        return Err(SqlgateError::NotSupported(
            "PostgreSQL procedures do not expose an integer return value".to_string(),
        ));
    }

    let (schema, name) = split_procedure_name(procedure);

    let client = client.lock().await;

    let exists = client
        .query(EXISTENCE_QUERY, &[&schema, &name])
        .await
        .map_err(|e| SqlgateError::Discovery(format_postgres_error(&e)))?;
    if exists.is_empty() {
        return Err(SqlgateError::Discovery(format!(
            "stored procedure '{}' does not exist",
            procedure
        )));
    }

    let rows = client
        .query(PARAMETERS_QUERY, &[&schema, &name])
        .await
        .map_err(|e| SqlgateError::Discovery(format_postgres_error(&e)))?;

    let mut set = ParameterSet::new();
    for (idx, row) in rows.iter().enumerate() {
        let name: Option<String> = row
            .try_get(0)
            .map_err(|e| SqlgateError::Discovery(e.to_string()))?;
        let data_type: Option<String> = row
            .try_get(1)
            .map_err(|e| SqlgateError::Discovery(e.to_string()))?;
        let mode: Option<String> = row
            .try_get(2)
            .map_err(|e| SqlgateError::Discovery(e.to_string()))?;

        let direction = match mode.as_deref() {
            Some("OUT") => ParameterDirection::Out,
            Some("INOUT") => ParameterDirection::InOut,
            _ => ParameterDirection::In,
        };

        let name = name.unwrap_or_else(|| format!("p{}", idx + 1));
        set.push(ParameterDescriptor::new(
            name,
            direction,
            data_type.unwrap_or_default(),
        ));
    }

    tracing::debug!(
        procedure = procedure,
        parameters = set.len(),
        "derived stored procedure parameters"
    );

    Ok(set)
}

/// Split an optionally schema-qualified procedure name, defaulting to public
pub(crate) fn split_procedure_name(procedure: &str) -> (String, String) {
    match procedure.split_once('.') {
        Some((schema, name)) => (
            schema.trim_matches('"').to_string(),
            name.trim_matches('"').to_string(),
        ),
        None => ("public".to_string(), procedure.trim_matches('"').to_string()),
    }
}

/// Render a command into executable SQL.
///
/// Stored procedures become a CALL statement with positional placeholders
/// in declaration order.
pub(crate) fn render_command(command: &Command) -> String {
    match command.command_type() {
        CommandType::Text => command.command_text().to_string(),
        CommandType::StoredProcedure => {
            let placeholders: Vec<String> = command
                .parameters()
                .iter()
                .filter(|p| p.direction != ParameterDirection::ReturnValue)
                .enumerate()
                .map(|(idx, _)| format!("${}", idx + 1))
                .collect();

            let (schema, name) = split_procedure_name(command.command_text());
            format!(
                "CALL \"{}\".\"{}\"({})",
                schema,
                name,
                placeholders.join(", ")
            )
        }
    }
}

async fn run_query(client: &Mutex<Client>, command: &Command) -> Result<QueryResult> {
    let sql = render_command(command);
    let values = command.parameters().bound_values();
    let start = std::time::Instant::now();

    let (statement, pg_rows) = tokio::time::timeout(command.timeout(), async {
        let client = client.lock().await;

        let statement = client.prepare(&sql).await.map_err(|e| {
            SqlgateError::Query(format!("failed to prepare query: {}", format_postgres_error(&e)))
        })?;

        let pg_params = bind_values(&statement, &values);
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows = client.query(&statement, &param_refs).await.map_err(|e| {
            SqlgateError::Query(format!("failed to execute query: {}", format_postgres_error(&e)))
        })?;

        Ok::<_, SqlgateError>((statement, rows))
    })
    .await
    .map_err(|_| SqlgateError::Timeout(format!("command exceeded {:?}", command.timeout())))??;

    // Column metadata comes from the prepared statement so empty result
    // sets still carry their columns
    let mut columns = Vec::new();
    let mut column_names = Vec::new();
    for (idx, col) in statement.columns().iter().enumerate() {
        let name = col.name().to_string();
        column_names.push(name.clone());
        columns.push(ColumnMeta {
            name,
            data_type: format!("{:?}", col.type_()),
            nullable: true,
            ordinal: idx,
            max_length: None,
            precision: None,
            scale: None,
        });
    }

    let mut rows = Vec::with_capacity(pg_rows.len());
    for pg_row in &pg_rows {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(postgres_to_value(pg_row, idx));
        }
        rows.push(Row::new(column_names.clone(), values));
    }

    let execution_time_ms = start.elapsed().as_millis() as u64;
    tracing::debug!(
        row_count = rows.len(),
        duration_ms = execution_time_ms,
        "query completed"
    );

    Ok(QueryResult {
        columns,
        rows,
        affected_rows: 0,
        execution_time_ms,
    })
}

async fn run_execute(client: &Mutex<Client>, command: &Command) -> Result<StatementOutcome> {
    let sql = render_command(command);
    let values = command.parameters().bound_values();
    let start = std::time::Instant::now();

    let affected_rows = tokio::time::timeout(command.timeout(), async {
        let client = client.lock().await;

        let statement = client.prepare(&sql).await.map_err(|e| {
            SqlgateError::Query(format!(
                "failed to prepare statement: {}",
                format_postgres_error(&e)
            ))
        })?;

        let pg_params = bind_values(&statement, &values);
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        client.execute(&statement, &param_refs).await.map_err(|e| {
            SqlgateError::Query(format!(
                "failed to execute statement: {}",
                format_postgres_error(&e)
            ))
        })
    })
    .await
    .map_err(|_| SqlgateError::Timeout(format!("command exceeded {:?}", command.timeout())))??;

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

/// Convert values to typed parameters using the prepared statement's
/// declared parameter types
fn bind_values(statement: &tokio_postgres::Statement, values: &[Value]) -> Vec<PgValue> {
    let param_types = statement.params();
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            if let Some(target_type) = param_types.get(i) {
                PgValue::from_value_for_type(value, target_type)
            } else {
                PgValue::from_value(value)
            }
        })
        .collect()
}

/// Wrapper enum for converting sqlgate values to types implementing ToSql.
/// tokio-postgres requires owned values that implement ToSql.
#[derive(Debug)]
pub(crate) enum PgValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTimeUtc(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    DateTime(chrono::NaiveDateTime),
}

impl PgValue {
    /// Convert a value into a PgValue that matches the target PostgreSQL
    /// column type. This ensures tokio-postgres writes the correct binary
    /// width (e.g. 4 bytes for INT4, not 8 bytes from an i64).
    pub(crate) fn from_value_for_type(
        value: &Value,
        target_type: &tokio_postgres::types::Type,
    ) -> Self {
        use tokio_postgres::types::Type;

        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),

            Value::Int16(v) => Self::coerce_int(*v as i64, target_type),
            Value::Int32(v) => Self::coerce_int(*v as i64, target_type),
            Value::Int64(v) => Self::coerce_int(*v, target_type),

            Value::Float32(v) => match *target_type {
                Type::FLOAT8 => PgValue::Float64(*v as f64),
                _ => PgValue::Float32(*v),
            },
            Value::Float64(v) => match *target_type {
                Type::FLOAT4 => PgValue::Float32(*v as f32),
                _ => PgValue::Float64(*v),
            },

            Value::Decimal(v) => PgValue::String(v.clone()),
            Value::String(v) => PgValue::String(v.clone()),
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) => PgValue::Uuid(*v),
            Value::DateTimeUtc(v) => PgValue::DateTimeUtc(*v),
            Value::Date(v) => PgValue::Date(*v),
            Value::Time(v) => PgValue::Time(*v),
            Value::DateTime(v) => PgValue::DateTime(*v),
        }
    }

    /// Pick the integer variant that matches the target column type so
    /// tokio-postgres writes the correct number of bytes
    pub(crate) fn coerce_int(value: i64, target_type: &tokio_postgres::types::Type) -> Self {
        use tokio_postgres::types::Type;
        match *target_type {
            Type::INT2 => PgValue::Int16(value as i16),
            Type::INT4 => PgValue::Int32(value as i32),
            Type::INT8 => PgValue::Int64(value),
            _ => PgValue::Int64(value),
        }
    }

    /// Fallback used when the target parameter type is unknown
    pub(crate) fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int16(v) => PgValue::Int16(*v),
            Value::Int32(v) => PgValue::Int32(*v),
            Value::Int64(v) => PgValue::Int64(*v),
            Value::Float32(v) => PgValue::Float32(*v),
            Value::Float64(v) => PgValue::Float64(*v),
            Value::Decimal(v) => PgValue::String(v.clone()),
            Value::String(v) => PgValue::String(v.clone()),
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) => PgValue::Uuid(*v),
            Value::DateTimeUtc(v) => PgValue::DateTimeUtc(*v),
            Value::Date(v) => PgValue::Date(*v),
            Value::Time(v) => PgValue::Time(*v),
            Value::DateTime(v) => PgValue::DateTime(*v),
        }
    }
}

impl ToSql for PgValue {
    fn to_sql(
        &self,
        ty: &tokio_postgres::types::Type,
        out: &mut BytesMut,
    ) -> std::result::Result<postgres_types::IsNull, Box<dyn std::error::Error + Sync + Send>>
    {
        match self {
            PgValue::Null => Ok(postgres_types::IsNull::Yes),
            PgValue::Bool(v) => v.to_sql(ty, out),
            PgValue::Int16(v) => v.to_sql(ty, out),
            PgValue::Int32(v) => v.to_sql(ty, out),
            PgValue::Int64(v) => v.to_sql(ty, out),
            PgValue::Float32(v) => v.to_sql(ty, out),
            PgValue::Float64(v) => v.to_sql(ty, out),
            PgValue::String(v) => v.to_sql(ty, out),
            PgValue::Bytes(v) => v.to_sql(ty, out),
            PgValue::Uuid(v) => v.to_sql(ty, out),
            PgValue::DateTimeUtc(v) => v.to_sql(ty, out),
            PgValue::Date(v) => v.to_sql(ty, out),
            PgValue::Time(v) => v.to_sql(ty, out),
            PgValue::DateTime(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_: &tokio_postgres::types::Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

/// Decoder for NUMERIC columns: renders the binary wire format as text so
/// no precision is lost
#[derive(Debug)]
struct PgNumericString(String);

impl PgNumericString {
    fn parse(raw: &[u8]) -> std::result::Result<String, Box<dyn std::error::Error + Sync + Send>> {
        if raw.len() < 8 {
            return Err("invalid NUMERIC payload: too short".into());
        }

        let ndigits = i16::from_be_bytes([raw[0], raw[1]]) as usize;
        let weight = i16::from_be_bytes([raw[2], raw[3]]);
        let sign = u16::from_be_bytes([raw[4], raw[5]]);
        let dscale = i16::from_be_bytes([raw[6], raw[7]]) as usize;

        if raw.len() < 8 + ndigits * 2 {
            return Err("invalid NUMERIC payload: truncated digits".into());
        }
        if sign == 0xC000 {
            return Ok("NaN".to_string());
        }

        // Base-10000 digit groups, most significant first
        let mut digits = Vec::with_capacity(ndigits);
        for index in 0..ndigits {
            let offset = 8 + index * 2;
            digits.push(u16::from_be_bytes([raw[offset], raw[offset + 1]]));
        }
        if digits.is_empty() {
            return Ok("0".to_string());
        }

        let integer_groups = if weight >= 0 { weight as usize + 1 } else { 0 };
        let mut integer_text = String::new();
        if integer_groups == 0 {
            integer_text.push('0');
        } else {
            for group_index in 0..integer_groups {
                let group = digits.get(group_index).copied().unwrap_or(0);
                if group_index == 0 {
                    integer_text.push_str(&group.to_string());
                } else {
                    integer_text.push_str(&format!("{group:04}"));
                }
            }
        }

        let mut fraction_text = String::new();
        if dscale > 0 {
            for group in digits.iter().skip(integer_groups.min(digits.len())) {
                fraction_text.push_str(&format!("{group:04}"));
            }
            if fraction_text.len() < dscale {
                fraction_text.push_str(&"0".repeat(dscale - fraction_text.len()));
            } else {
                fraction_text.truncate(dscale);
            }
            while fraction_text.ends_with('0') {
                fraction_text.pop();
            }
        }

        let mut output = String::new();
        if sign == 0x4000 && integer_text != "0" {
            output.push('-');
        }
        output.push_str(&integer_text);
        if !fraction_text.is_empty() {
            output.push('.');
            output.push_str(&fraction_text);
        }

        Ok(output)
    }
}

impl<'a> FromSql<'a> for PgNumericString {
    fn from_sql(
        _: &tokio_postgres::types::Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(Self(Self::parse(raw)?))
    }

    fn accepts(ty: &tokio_postgres::types::Type) -> bool {
        *ty == tokio_postgres::types::Type::NUMERIC
    }
}

/// Fallback decoder for custom PostgreSQL types (e.g. enums): raw UTF-8
#[derive(Debug)]
struct PgFallbackString(String);

impl<'a> FromSql<'a> for PgFallbackString {
    fn from_sql(
        _: &tokio_postgres::types::Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        let text = String::from_utf8(raw.to_vec())?;
        Ok(Self(text))
    }

    fn accepts(_: &tokio_postgres::types::Type) -> bool {
        true
    }
}

/// Convert a PostgreSQL row value to a sqlgate Value
fn postgres_to_value(row: &PgRow, idx: usize) -> Value {
    let col = &row.columns()[idx];
    let type_name = col.type_().name();

    match type_name {
        "bool" => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "int2" | "smallint" => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(Value::Int16)
            .unwrap_or(Value::Null),
        "int4" | "int" | "integer" => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(Value::Int32)
            .unwrap_or(Value::Null),
        "int8" | "bigint" => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(Value::Int64)
            .unwrap_or(Value::Null),
        "float4" | "real" => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(Value::Float32)
            .unwrap_or(Value::Null),
        "float8" | "double precision" => row
            .try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(Value::Float64)
            .unwrap_or(Value::Null),
        "text" | "varchar" | "char" | "bpchar" | "name" => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        "uuid" => row
            .try_get::<_, Option<uuid::Uuid>>(idx)
            .ok()
            .flatten()
            .map(Value::Uuid)
            .unwrap_or(Value::Null),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        "date" => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)
            .ok()
            .flatten()
            .map(Value::Date)
            .unwrap_or(Value::Null),
        "time" => row
            .try_get::<_, Option<chrono::NaiveTime>>(idx)
            .ok()
            .flatten()
            .map(Value::Time)
            .unwrap_or(Value::Null),
        "timestamp" => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(Value::DateTime)
            .unwrap_or(Value::Null),
        "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .ok()
            .flatten()
            .map(Value::DateTimeUtc)
            .unwrap_or(Value::Null),
        "numeric" | "decimal" => row
            .try_get::<_, Option<PgNumericString>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Decimal(v.0))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<_, Option<PgFallbackString>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.0))
            .unwrap_or(Value::Null),
    }
}

impl std::fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
