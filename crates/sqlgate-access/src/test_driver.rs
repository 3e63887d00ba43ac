//! Scripted in-memory driver used by the unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlgate_core::{
    ColumnMeta, Command, Connection, ConnectionConfig, DatabaseDriver, DriverCapabilities,
    IsolationLevel, ParameterSet, ParameterSource, QueryResult, Result, Row, RowCursor,
    SqlgateError, StatementOutcome, Transaction,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Shared scripted state observed and mutated by every handle the driver
/// hands out
#[derive(Default)]
pub(crate) struct MemoryBackend {
    signatures: Mutex<HashMap<String, ParameterSet>>,
    results: Mutex<HashMap<String, Vec<QueryResult>>>,
    affected: Mutex<HashMap<String, u64>>,
    pub(crate) derive_calls: AtomicUsize,
    fail_next: Mutex<Option<String>>,
    fail_derive: Mutex<Option<String>>,
    fail_cursor_close: Mutex<Option<String>>,
    events: Mutex<Vec<String>>,
}

impl MemoryBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn script_signature(&self, procedure: &str, signature: ParameterSet) {
        self.signatures
            .lock()
            .insert(procedure.to_string(), signature);
    }

    pub(crate) fn script_result(&self, procedure: &str, results: Vec<QueryResult>) {
        self.results.lock().insert(procedure.to_string(), results);
    }

    pub(crate) fn script_affected(&self, procedure: &str, affected: u64) {
        self.affected.lock().insert(procedure.to_string(), affected);
    }

    /// Make the next query or execute fail with the given message
    pub(crate) fn fail_next(&self, message: &str) {
        *self.fail_next.lock() = Some(message.to_string());
    }

    /// Make the next parameter derivation fail with the given message
    pub(crate) fn fail_next_derive(&self, message: &str) {
        *self.fail_derive.lock() = Some(message.to_string());
    }

    /// Make the next cursor close fail with the given message
    pub(crate) fn fail_next_cursor_close(&self, message: &str) {
        *self.fail_cursor_close.lock() = Some(message.to_string());
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub(crate) fn event_count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    fn log(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    fn take_failure(&self) -> Option<String> {
        self.fail_next.lock().take()
    }

    fn derive(&self, procedure: &str) -> Result<ParameterSet> {
        self.derive_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail_derive.lock().take() {
            return Err(SqlgateError::Discovery(message));
        }
        self.signatures
            .lock()
            .get(procedure)
            .cloned()
            .ok_or_else(|| {
                SqlgateError::Discovery(format!("stored procedure '{}' does not exist", procedure))
            })
    }

    fn run_query(&self, command: &Command) -> Result<Vec<QueryResult>> {
        let procedure = command.command_text();
        self.log(format!("query:{}", procedure));
        if let Some(message) = self.take_failure() {
            return Err(SqlgateError::Query(message));
        }
        Ok(self
            .results
            .lock()
            .get(procedure)
            .cloned()
            .unwrap_or_else(|| vec![QueryResult::empty()]))
    }

    fn run_execute(&self, command: &Command) -> Result<StatementOutcome> {
        let procedure = command.command_text();
        self.log(format!("execute:{}", procedure));
        if let Some(message) = self.take_failure() {
            return Err(SqlgateError::Query(message));
        }
        let affected_rows = self
            .affected
            .lock()
            .get(procedure)
            .copied()
            .unwrap_or(1);
        Ok(StatementOutcome {
            affected_rows,
            execution_time_ms: 0,
        })
    }
}

pub(crate) struct MemoryDriver {
    backend: Arc<MemoryBackend>,
}

impl MemoryDriver {
    pub(crate) fn new(backend: Arc<MemoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl DatabaseDriver for MemoryDriver {
    fn id(&self) -> &'static str {
        "memory"
    }

    fn name(&self) -> &'static str {
        "In-Memory"
    }

    fn default_port(&self) -> u16 {
        0
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            supports_transactions: true,
            supports_stored_procedures: true,
            supports_parameter_derivation: true,
            supports_output_parameters: true,
            max_parameters: None,
        }
    }

    async fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        self.backend.log("connect");
        Ok(Box::new(MemoryConnection {
            backend: Arc::clone(&self.backend),
            closed: AtomicBool::new(false),
        }))
    }

    fn parse_connection_string(&self, connection_string: &str) -> Result<ConnectionConfig> {
        Ok(ConnectionConfig::new(connection_string))
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        config.host.clone()
    }
}

pub(crate) struct MemoryConnection {
    backend: Arc<MemoryBackend>,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SqlgateError::Usage("connection is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ParameterSource for MemoryConnection {
    fn data_source(&self) -> String {
        "memory://test".to_string()
    }

    async fn derive_parameters(
        &self,
        procedure: &str,
        _include_return: bool,
    ) -> Result<ParameterSet> {
        self.ensure_open()?;
        self.backend.derive(procedure)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn query(&self, command: &Command) -> Result<QueryResult> {
        self.ensure_open()?;
        let mut results = self.backend.run_query(command)?;
        Ok(if results.is_empty() {
            QueryResult::empty()
        } else {
            results.swap_remove(0)
        })
    }

    async fn query_all(&self, command: &Command) -> Result<Vec<QueryResult>> {
        self.ensure_open()?;
        self.backend.run_query(command)
    }

    async fn execute(&self, command: &Command) -> Result<StatementOutcome> {
        self.ensure_open()?;
        self.backend.run_execute(command)
    }

    async fn query_cursor(&self, command: &Command) -> Result<Box<dyn RowCursor>> {
        let result = self.query(command).await?;
        Ok(Box::new(MemoryCursor {
            backend: Arc::clone(&self.backend),
            columns: result.columns,
            rows: result.rows.into_iter(),
            closed: false,
        }))
    }

    async fn begin_transaction(
        &self,
        _isolation: IsolationLevel,
    ) -> Result<Box<dyn Transaction>> {
        self.ensure_open()?;
        self.backend.log("begin");
        Ok(Box::new(MemoryTransaction {
            backend: Arc::clone(&self.backend),
            active: AtomicBool::new(true),
        }))
    }

    async fn is_valid(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.backend.log("close");
        Ok(())
    }
}

/// Cursor over a scripted result set; its close can be scripted to fail
pub(crate) struct MemoryCursor {
    backend: Arc<MemoryBackend>,
    columns: Vec<ColumnMeta>,
    rows: std::vec::IntoIter<Row>,
    closed: bool,
}

#[async_trait]
impl RowCursor for MemoryCursor {
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
        if let Some(message) = self.backend.fail_cursor_close.lock().take() {
            return Err(SqlgateError::Query(message));
        }
        Ok(())
    }
}

pub(crate) struct MemoryTransaction {
    backend: Arc<MemoryBackend>,
    active: AtomicBool,
}

impl MemoryTransaction {
    fn ensure_active(&self) -> Result<()> {
        if !self.active.load(Ordering::SeqCst) {
            return Err(SqlgateError::Usage(
                "transaction has already been committed or rolled back".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ParameterSource for MemoryTransaction {
    fn data_source(&self) -> String {
        "memory://test".to_string()
    }

    async fn derive_parameters(
        &self,
        procedure: &str,
        _include_return: bool,
    ) -> Result<ParameterSet> {
        self.ensure_active()?;
        self.backend.derive(procedure)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn query(&self, command: &Command) -> Result<QueryResult> {
        self.ensure_active()?;
        let mut results = self.backend.run_query(command)?;
        Ok(if results.is_empty() {
            QueryResult::empty()
        } else {
            results.swap_remove(0)
        })
    }

    async fn query_all(&self, command: &Command) -> Result<Vec<QueryResult>> {
        self.ensure_active()?;
        self.backend.run_query(command)
    }

    async fn execute(&self, command: &Command) -> Result<StatementOutcome> {
        self.ensure_active()?;
        self.backend.run_execute(command)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.ensure_active()?;
        self.active.store(false, Ordering::SeqCst);
        self.backend.log("commit");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.ensure_active()?;
        self.active.store(false, Ordering::SeqCst);
        self.backend.log("rollback");
        Ok(())
    }
}
