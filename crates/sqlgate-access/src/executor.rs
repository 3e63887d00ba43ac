//! Stored-procedure executor
//!
//! Executes procedures in three addressing modes: against a connection
//! string (a connection is opened and closed per call), an open connection,
//! or an open transaction. Each mode offers four result shapes: non-query,
//! scalar, data set, and reader.

use crate::cache::ParameterCache;
use async_trait::async_trait;
use sqlgate_core::{
    ColumnMeta, Command, Connection, DataSet, DatabaseDriver, ParameterSource, QueryResult,
    Result, Row, RowCursor, Transaction, Value,
};
use std::sync::Arc;

/// Stored-procedure executor bound to one driver
pub struct Executor {
    driver: Arc<dyn DatabaseDriver>,
    cache: Arc<ParameterCache>,
}

impl Executor {
    /// Create an executor using the process-wide parameter cache
    pub fn new(driver: Arc<dyn DatabaseDriver>) -> Self {
        Self {
            driver,
            cache: ParameterCache::global(),
        }
    }

    /// Create an executor with a private parameter cache
    pub fn with_cache(driver: Arc<dyn DatabaseDriver>, cache: Arc<ParameterCache>) -> Self {
        Self { driver, cache }
    }

    pub fn driver(&self) -> &Arc<dyn DatabaseDriver> {
        &self.driver
    }

    pub fn cache(&self) -> &Arc<ParameterCache> {
        &self.cache
    }

    /// Build a stored-procedure command with positional values bound to the
    /// procedure's discovered signature.
    ///
    /// With no values the catalog is not consulted at all; the procedure is
    /// executed without parameters.
    pub async fn build_command(
        &self,
        source: &dyn ParameterSource,
        procedure: &str,
        values: &[Value],
    ) -> Result<Command> {
        let command = Command::stored_procedure(procedure)?;
        if values.is_empty() {
            return Ok(command);
        }

        let mut parameters = self.cache.parameter_set(source, procedure, false).await?;
        parameters.bind_values(values)?;
        Ok(command.with_parameters(parameters))
    }

    /// Build a stored-procedure command whose parameters are mapped to
    /// result-set columns by ordinal, for row-driven updates.
    pub async fn create_command(
        &self,
        source: &dyn ParameterSource,
        procedure: &str,
        source_columns: &[&str],
    ) -> Result<Command> {
        let mut parameters = self.cache.parameter_set(source, procedure, false).await?;
        parameters.map_source_columns(source_columns)?;
        Ok(Command::stored_procedure(procedure)?.with_parameters(parameters))
    }

    // Connection-string addressing: one connection per call, owned by the
    // executor and closed before returning (the reader shape closes when
    // the cursor is exhausted or closed).

    pub async fn execute_non_query_on_source(
        &self,
        connection_string: &str,
        procedure: &str,
        values: &[Value],
    ) -> Result<u64> {
        let connection = self.driver.connect_str(connection_string).await?;
        let result = self
            .execute_non_query_on(connection.as_ref(), procedure, values)
            .await;
        close_quietly(connection.as_ref()).await;
        result
    }

    pub async fn execute_scalar_on_source(
        &self,
        connection_string: &str,
        procedure: &str,
        values: &[Value],
    ) -> Result<Value> {
        let connection = self.driver.connect_str(connection_string).await?;
        let result = self
            .execute_scalar_on(connection.as_ref(), procedure, values)
            .await;
        close_quietly(connection.as_ref()).await;
        result
    }

    pub async fn execute_dataset_on_source(
        &self,
        connection_string: &str,
        procedure: &str,
        values: &[Value],
        table_names: &[&str],
    ) -> Result<DataSet> {
        let connection = self.driver.connect_str(connection_string).await?;
        let result = self
            .execute_dataset_on(connection.as_ref(), procedure, values, table_names)
            .await;
        close_quietly(connection.as_ref()).await;
        result
    }

    /// Execute and stream rows; the self-opened connection stays alive for
    /// the cursor's lifetime and closes when the cursor does.
    pub async fn execute_reader_on_source(
        &self,
        connection_string: &str,
        procedure: &str,
        values: &[Value],
    ) -> Result<Box<dyn RowCursor>> {
        let connection = self.driver.connect_str(connection_string).await?;

        let cursor = async {
            let command = self
                .build_command(connection.as_ref(), procedure, values)
                .await?;
            connection.query_cursor(&command).await
        }
        .await;

        own_cursor(cursor, connection).await
    }

    // Open-connection addressing: the caller owns the connection

    pub async fn execute_non_query_on(
        &self,
        connection: &dyn Connection,
        procedure: &str,
        values: &[Value],
    ) -> Result<u64> {
        let command = self.build_command(connection, procedure, values).await?;
        Ok(connection.execute(&command).await?.affected_rows)
    }

    pub async fn execute_scalar_on(
        &self,
        connection: &dyn Connection,
        procedure: &str,
        values: &[Value],
    ) -> Result<Value> {
        let command = self.build_command(connection, procedure, values).await?;
        Ok(scalar_of(connection.query(&command).await?))
    }

    pub async fn execute_dataset_on(
        &self,
        connection: &dyn Connection,
        procedure: &str,
        values: &[Value],
        table_names: &[&str],
    ) -> Result<DataSet> {
        let command = self.build_command(connection, procedure, values).await?;
        let results = connection.query_all(&command).await?;
        Ok(DataSet::from_results(results, table_names))
    }

    pub async fn execute_reader_on(
        &self,
        connection: &dyn Connection,
        procedure: &str,
        values: &[Value],
    ) -> Result<Box<dyn RowCursor>> {
        let command = self.build_command(connection, procedure, values).await?;
        connection.query_cursor(&command).await
    }

    // Open-transaction addressing: the caller owns the transaction

    pub async fn execute_non_query_in(
        &self,
        transaction: &dyn Transaction,
        procedure: &str,
        values: &[Value],
    ) -> Result<u64> {
        let command = self.build_command(transaction, procedure, values).await?;
        Ok(transaction.execute(&command).await?.affected_rows)
    }

    pub async fn execute_scalar_in(
        &self,
        transaction: &dyn Transaction,
        procedure: &str,
        values: &[Value],
    ) -> Result<Value> {
        let command = self.build_command(transaction, procedure, values).await?;
        Ok(scalar_of(transaction.query(&command).await?))
    }

    pub async fn execute_dataset_in(
        &self,
        transaction: &dyn Transaction,
        procedure: &str,
        values: &[Value],
        table_names: &[&str],
    ) -> Result<DataSet> {
        let command = self.build_command(transaction, procedure, values).await?;
        let results = transaction.query_all(&command).await?;
        Ok(DataSet::from_results(results, table_names))
    }

    pub async fn execute_reader_in(
        &self,
        transaction: &dyn Transaction,
        procedure: &str,
        values: &[Value],
    ) -> Result<Box<dyn RowCursor>> {
        let command = self.build_command(transaction, procedure, values).await?;
        transaction.query_cursor(&command).await
    }

    // Prepared-command entry points: the caller supplies a ready command
    // (text SQL or a stored procedure with its parameters already attached)
    // and no discovery or binding happens here. Addressing and ownership
    // rules are the same as for the positional-value methods above.

    pub async fn execute_command_non_query_on_source(
        &self,
        connection_string: &str,
        command: &Command,
    ) -> Result<u64> {
        let connection = self.driver.connect_str(connection_string).await?;
        let result = self
            .execute_command_non_query_on(connection.as_ref(), command)
            .await;
        close_quietly(connection.as_ref()).await;
        result
    }

    pub async fn execute_command_scalar_on_source(
        &self,
        connection_string: &str,
        command: &Command,
    ) -> Result<Value> {
        let connection = self.driver.connect_str(connection_string).await?;
        let result = self
            .execute_command_scalar_on(connection.as_ref(), command)
            .await;
        close_quietly(connection.as_ref()).await;
        result
    }

    pub async fn execute_command_dataset_on_source(
        &self,
        connection_string: &str,
        command: &Command,
        table_names: &[&str],
    ) -> Result<DataSet> {
        let connection = self.driver.connect_str(connection_string).await?;
        let result = self
            .execute_command_dataset_on(connection.as_ref(), command, table_names)
            .await;
        close_quietly(connection.as_ref()).await;
        result
    }

    pub async fn execute_command_reader_on_source(
        &self,
        connection_string: &str,
        command: &Command,
    ) -> Result<Box<dyn RowCursor>> {
        let connection = self.driver.connect_str(connection_string).await?;
        let cursor = connection.query_cursor(command).await;
        own_cursor(cursor, connection).await
    }

    pub async fn execute_command_non_query_on(
        &self,
        connection: &dyn Connection,
        command: &Command,
    ) -> Result<u64> {
        Ok(connection.execute(command).await?.affected_rows)
    }

    pub async fn execute_command_scalar_on(
        &self,
        connection: &dyn Connection,
        command: &Command,
    ) -> Result<Value> {
        Ok(scalar_of(connection.query(command).await?))
    }

    pub async fn execute_command_dataset_on(
        &self,
        connection: &dyn Connection,
        command: &Command,
        table_names: &[&str],
    ) -> Result<DataSet> {
        let results = connection.query_all(command).await?;
        Ok(DataSet::from_results(results, table_names))
    }

    pub async fn execute_command_reader_on(
        &self,
        connection: &dyn Connection,
        command: &Command,
    ) -> Result<Box<dyn RowCursor>> {
        connection.query_cursor(command).await
    }

    pub async fn execute_command_non_query_in(
        &self,
        transaction: &dyn Transaction,
        command: &Command,
    ) -> Result<u64> {
        Ok(transaction.execute(command).await?.affected_rows)
    }

    pub async fn execute_command_scalar_in(
        &self,
        transaction: &dyn Transaction,
        command: &Command,
    ) -> Result<Value> {
        Ok(scalar_of(transaction.query(command).await?))
    }

    pub async fn execute_command_dataset_in(
        &self,
        transaction: &dyn Transaction,
        command: &Command,
        table_names: &[&str],
    ) -> Result<DataSet> {
        let results = transaction.query_all(command).await?;
        Ok(DataSet::from_results(results, table_names))
    }

    pub async fn execute_command_reader_in(
        &self,
        transaction: &dyn Transaction,
        command: &Command,
    ) -> Result<Box<dyn RowCursor>> {
        transaction.query_cursor(command).await
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("driver", &self.driver.id())
            .finish()
    }
}

fn scalar_of(result: QueryResult) -> Value {
    result.scalar().cloned().unwrap_or(Value::Null)
}

/// Wrap a freshly opened cursor so it owns the connection it reads from,
/// closing the connection if the query itself failed.
async fn own_cursor(
    cursor: Result<Box<dyn RowCursor>>,
    connection: Box<dyn Connection>,
) -> Result<Box<dyn RowCursor>> {
    match cursor {
        Ok(inner) => Ok(Box::new(OwnedCursor {
            inner,
            connection: Some(connection),
        })),
        Err(e) => {
            close_quietly(connection.as_ref()).await;
            Err(e)
        }
    }
}

async fn close_quietly(connection: &dyn Connection) {
    if let Err(e) = connection.close().await {
        tracing::warn!(error = %e, "failed to close connection");
    }
}

/// Cursor that owns the connection it reads from.
///
/// The connection closes when the cursor is exhausted or explicitly
/// closed, whichever comes first.
struct OwnedCursor {
    inner: Box<dyn RowCursor>,
    connection: Option<Box<dyn Connection>>,
}

impl OwnedCursor {
    async fn release_connection(&mut self) {
        if let Some(connection) = self.connection.take() {
            close_quietly(connection.as_ref()).await;
        }
    }
}

#[async_trait]
impl RowCursor for OwnedCursor {
    async fn next(&mut self) -> Result<Option<Row>> {
        match self.inner.next().await {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                self.release_connection().await;
                Ok(None)
            }
            Err(e) => {
                self.release_connection().await;
                Err(e)
            }
        }
    }

    fn columns(&self) -> &[ColumnMeta] {
        self.inner.columns()
    }

    async fn close(&mut self) -> Result<()> {
        let result = self.inner.close().await;
        self.release_connection().await;
        result
    }
}
