//! Transactional persistence session
//!
//! A session is a single unit of work: it opens one connection and one
//! transaction, runs stored procedures through them, and finishes with
//! commit, rollback, or close. The first execution failure is recorded and
//! every later operation short-circuits until the session is discarded.

use crate::executor::Executor;
use sqlgate_core::{
    Connection, DataSet, DataTable, DatabaseDriver, IsolationLevel, Result, RowCursor,
    SqlgateError, Transaction, Value,
};
use sqlgate_drivers::DriverRegistry;
use std::sync::Arc;

/// Lifecycle state of a [`Session`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, not yet opened
    Created,
    /// Connection and transaction are open
    Connected,
    /// Transaction committed
    Committed,
    /// Transaction rolled back, session unusable
    RolledBack,
    /// Closed without commit or rollback outcome
    Closed,
}

/// A transactional unit of work over stored procedures.
///
/// Commit mode decides what `commit` does: in commit mode the transaction
/// commits; otherwise `commit` is a no-op and the work is discarded when
/// the session closes. A session constructed with commit mode off can
/// therefore never persist anything, which callers use for dry runs.
pub struct Session {
    connection_string: String,
    executor: Executor,
    connection: Option<Box<dyn Connection>>,
    transaction: Option<Box<dyn Transaction>>,
    state: SessionState,
    commit_mode: bool,
    isolation: IsolationLevel,
    failed: Option<String>,
    pending: Vec<(String, Value)>,
}

impl Session {
    /// Create a session in commit mode with read-committed isolation
    pub fn new(driver: Arc<dyn DatabaseDriver>, connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            executor: Executor::new(driver),
            connection: None,
            transaction: None,
            state: SessionState::Created,
            commit_mode: true,
            isolation: IsolationLevel::ReadCommitted,
            failed: None,
            pending: Vec::new(),
        }
    }

    /// Create a session for the backend registered under `driver_id`
    pub fn from_registry(
        registry: &DriverRegistry,
        driver_id: &str,
        connection_string: impl Into<String>,
    ) -> Result<Self> {
        let driver = registry.get(driver_id).ok_or_else(|| {
            SqlgateError::Configuration(format!("no driver registered for '{}'", driver_id))
        })?;
        Ok(Self::new(driver, connection_string))
    }

    /// Create a session with a private executor (and parameter cache)
    pub fn with_executor(executor: Executor, connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            executor,
            connection: None,
            transaction: None,
            state: SessionState::Created,
            commit_mode: true,
            isolation: IsolationLevel::ReadCommitted,
            failed: None,
            pending: Vec::new(),
        }
    }

    pub fn with_commit_mode(mut self, commit_mode: bool) -> Self {
        self.commit_mode = commit_mode;
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn commit_mode(&self) -> bool {
        self.commit_mode
    }

    pub fn has_failed(&self) -> bool {
        self.failed.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.failed.as_deref()
    }

    /// Open the connection and begin the transaction
    pub async fn open(&mut self) -> Result<()> {
        if self.state != SessionState::Created {
            return Err(SqlgateError::Usage(format!(
                "session cannot be opened from state {:?}",
                self.state
            )));
        }

        let connection = match self
            .executor
            .driver()
            .connect_str(&self.connection_string)
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                self.failed = Some(e.to_string());
                return Err(e);
            }
        };
        let transaction = match connection.begin_transaction(self.isolation).await {
            Ok(transaction) => transaction,
            Err(e) => {
                self.failed = Some(e.to_string());
                return Err(e);
            }
        };

        self.connection = Some(connection);
        self.transaction = Some(transaction);
        self.state = SessionState::Connected;
        tracing::debug!(isolation = ?self.isolation, "session opened");
        Ok(())
    }

    /// Queue a positional parameter value for the next execution.
    ///
    /// The name is informational; values bind to the procedure's declared
    /// parameters by queue order.
    pub fn add_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.pending.push((name.into(), value));
    }

    /// Execute a stored procedure with the queued parameters, returning the
    /// number of affected rows
    pub async fn execute_non_query(&mut self, procedure: &str) -> Result<u64> {
        let values = self.take_pending(procedure)?;
        let transaction = self.active_transaction()?;
        let result = self
            .executor
            .execute_non_query_in(transaction, procedure, &values)
            .await;
        self.record(procedure, result)
    }

    /// Execute a stored procedure with the queued parameters, returning the
    /// first column of the first row
    pub async fn execute_scalar(&mut self, procedure: &str) -> Result<Value> {
        let values = self.take_pending(procedure)?;
        let transaction = self.active_transaction()?;
        let result = self
            .executor
            .execute_scalar_in(transaction, procedure, &values)
            .await;
        self.record(procedure, result)
    }

    /// Execute a stored procedure with the queued parameters, buffering
    /// every result set
    pub async fn execute_dataset(
        &mut self,
        procedure: &str,
        table_names: &[&str],
    ) -> Result<DataSet> {
        let values = self.take_pending(procedure)?;
        let transaction = self.active_transaction()?;
        let result = self
            .executor
            .execute_dataset_in(transaction, procedure, &values, table_names)
            .await;
        self.record(procedure, result)
    }

    /// Execute a stored procedure with the queued parameters, buffering the
    /// first result set as a single table
    pub async fn execute_data_table(&mut self, procedure: &str) -> Result<DataTable> {
        let dataset = self.execute_dataset(procedure, &[]).await?;
        Ok(dataset
            .tables
            .into_iter()
            .next()
            .unwrap_or_else(|| DataTable {
                name: "Table".to_string(),
                columns: Vec::new(),
                rows: Vec::new(),
            }))
    }

    /// Execute a stored procedure with the queued parameters, streaming the
    /// first result set
    pub async fn execute_reader(&mut self, procedure: &str) -> Result<Box<dyn RowCursor>> {
        let values = self.take_pending(procedure)?;
        let transaction = self.active_transaction()?;
        let result = self
            .executor
            .execute_reader_in(transaction, procedure, &values)
            .await;
        self.record(procedure, result)
    }

    /// Conclude the unit of work.
    ///
    /// A failed session rolls back and closes. Outside commit mode this is
    /// a no-op and the session stays connected. In commit mode the
    /// transaction commits and the session closes.
    pub async fn commit(&mut self) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(SqlgateError::Usage(format!(
                "session cannot commit from state {:?}",
                self.state
            )));
        }

        if let Some(message) = self.failed.clone() {
            tracing::warn!(error = %message, "session failed, rolling back instead of committing");
            self.abandon().await;
            self.state = SessionState::RolledBack;
            return Err(SqlgateError::SessionFailed(message));
        }

        if !self.commit_mode {
            tracing::debug!("commit mode off, leaving transaction open");
            return Ok(());
        }

        // Guard above ensures the transaction is present
        let Some(transaction) = self.transaction.take() else {
            return Err(SqlgateError::Usage(
                "session has no open transaction".to_string(),
            ));
        };

        match transaction.commit().await {
            Ok(()) => {
                self.close_connection().await;
                self.state = SessionState::Committed;
                tracing::debug!("session committed");
                Ok(())
            }
            Err(e) => {
                self.failed = Some(e.to_string());
                self.close_connection().await;
                self.state = SessionState::RolledBack;
                Err(e)
            }
        }
    }

    /// Roll back the transaction and close
    pub async fn rollback(&mut self) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(SqlgateError::Usage(format!(
                "session cannot roll back from state {:?}",
                self.state
            )));
        }
        self.abandon().await;
        self.state = SessionState::RolledBack;
        Ok(())
    }

    /// Release the connection, rolling back any open transaction.
    /// Idempotent; failures are logged and swallowed.
    pub async fn close(&mut self) {
        self.abandon().await;
        if self.state == SessionState::Connected {
            self.state = SessionState::Closed;
        }
    }

    fn take_pending(&mut self, procedure: &str) -> Result<Vec<Value>> {
        if let Some(message) = &self.failed {
            return Err(SqlgateError::SessionFailed(message.clone()));
        }
        if self.state != SessionState::Connected {
            self.pending.clear();
            return Err(SqlgateError::Usage(format!(
                "session cannot execute '{}' from state {:?}",
                procedure, self.state
            )));
        }
        Ok(self.pending.drain(..).map(|(_, value)| value).collect())
    }

    fn active_transaction(&self) -> Result<&dyn Transaction> {
        self.transaction
            .as_deref()
            .ok_or_else(|| SqlgateError::Usage("session has no open transaction".to_string()))
    }

    fn record<T>(&mut self, procedure: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            // Caller mistakes do not poison the session
            if !e.is_usage() {
                tracing::error!(procedure = procedure, error = %e, "session operation failed");
                self.failed = Some(e.to_string());
            }
        }
        result
    }

    async fn abandon(&mut self) {
        if let Some(transaction) = self.transaction.take() {
            if let Err(e) = transaction.rollback().await {
                tracing::warn!(error = %e, "rollback during session teardown failed");
            }
        }
        self.close_connection().await;
    }

    async fn close_connection(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                tracing::warn!(error = %e, "failed to close session connection");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("commit_mode", &self.commit_mode)
            .field("failed", &self.failed)
            .finish()
    }
}
