//! Connection, transaction and cursor traits implemented by every backend

use crate::{Command, ColumnMeta, ParameterSet, QueryResult, Result, Row, StatementOutcome};
use async_trait::async_trait;

/// Transaction isolation level requested at begin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    ReadUncommitted,
}

/// Anything stored-procedure parameters can be discovered against.
///
/// Both live connections and open transactions expose the same discovery
/// surface, so the parameter cache can be fed from either.
#[async_trait]
pub trait ParameterSource: Send + Sync {
    /// Stable identity of the underlying data source (driver + host +
    /// database), used as part of the parameter-cache key.
    fn data_source(&self) -> String;

    /// Query the backend's catalog for the procedure's formal parameters.
    ///
    /// The returned set is in declaration order with every value unset.
    /// When `include_return` is true and the backend models one, the
    /// return-value descriptor is first.
    async fn derive_parameters(
        &self,
        procedure: &str,
        include_return: bool,
    ) -> Result<ParameterSet>;
}

/// An open connection to a database backend
#[async_trait]
pub trait Connection: ParameterSource {
    /// Execute a command and buffer the first result set
    async fn query(&self, command: &Command) -> Result<QueryResult>;

    /// Execute a command and buffer every result set it produces
    async fn query_all(&self, command: &Command) -> Result<Vec<QueryResult>>;

    /// Execute a command that returns no rows
    async fn execute(&self, command: &Command) -> Result<StatementOutcome>;

    /// Execute a command and stream its first result set
    async fn query_cursor(&self, command: &Command) -> Result<Box<dyn RowCursor>> {
        let result = self.query(command).await?;
        Ok(Box::new(BufferedCursor::new(result)))
    }

    /// Begin a transaction at the given isolation level
    async fn begin_transaction(
        &self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn Transaction>>;

    /// Whether the connection is still usable
    async fn is_valid(&self) -> bool;

    /// Close the connection; further use is an error
    async fn close(&self) -> Result<()>;
}

/// An open transaction on a connection.
///
/// `commit` and `rollback` consume the transaction; a transaction dropped
/// without either is rolled back by the backend when the connection closes.
#[async_trait]
pub trait Transaction: ParameterSource {
    async fn query(&self, command: &Command) -> Result<QueryResult>;

    async fn query_all(&self, command: &Command) -> Result<Vec<QueryResult>>;

    async fn execute(&self, command: &Command) -> Result<StatementOutcome>;

    async fn query_cursor(&self, command: &Command) -> Result<Box<dyn RowCursor>> {
        let result = self.query(command).await?;
        Ok(Box::new(BufferedCursor::new(result)))
    }

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Forward-only row stream over one result set
#[async_trait]
pub trait RowCursor: Send {
    /// Next row, or `None` once the result set is exhausted
    async fn next(&mut self) -> Result<Option<Row>>;

    /// Column metadata for the result set
    fn columns(&self) -> &[ColumnMeta];

    /// Release any resources held by the cursor. Idempotent.
    async fn close(&mut self) -> Result<()>;
}

/// Cursor over an already-buffered result set
pub struct BufferedCursor {
    columns: Vec<ColumnMeta>,
    rows: std::vec::IntoIter<Row>,
    closed: bool,
}

impl BufferedCursor {
    pub fn new(result: QueryResult) -> Self {
        Self {
            columns: result.columns,
            rows: result.rows.into_iter(),
            closed: false,
        }
    }
}

#[async_trait]
impl RowCursor for BufferedCursor {
    async fn next(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.rows.next())
    }

    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    fn two_row_result() -> QueryResult {
        let column = ColumnMeta {
            name: "n".to_string(),
            data_type: "int".to_string(),
            ..Default::default()
        };
        QueryResult {
            columns: vec![column],
            rows: vec![
                Row::new(vec!["n".to_string()], vec![Value::Int32(1)]),
                Row::new(vec!["n".to_string()], vec![Value::Int32(2)]),
            ],
            affected_rows: 0,
            execution_time_ms: 0,
        }
    }

    #[tokio::test]
    async fn buffered_cursor_yields_rows_then_none() {
        let mut cursor = BufferedCursor::new(two_row_result());
        assert!(cursor.next().await.unwrap().is_some());
        assert!(cursor.next().await.unwrap().is_some());
        assert!(cursor.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closed_cursor_yields_no_further_rows() {
        let mut cursor = BufferedCursor::new(two_row_result());
        cursor.close().await.unwrap();
        assert!(cursor.next().await.unwrap().is_none());
        // Second close is a no-op
        cursor.close().await.unwrap();
    }
}
