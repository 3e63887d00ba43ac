//! Tests for the transactional persistence session

use crate::cache::ParameterCache;
use crate::executor::Executor;
use crate::session::{Session, SessionState};
use crate::test_driver::{MemoryBackend, MemoryDriver};
use sqlgate_core::{
    ColumnMeta, ParameterDescriptor, ParameterSet, QueryResult, Row, SqlgateError, Value,
};
use std::sync::Arc;

fn session(backend: &Arc<MemoryBackend>) -> Session {
    let executor = Executor::with_cache(
        Arc::new(MemoryDriver::new(Arc::clone(backend))),
        Arc::new(ParameterCache::new()),
    );
    Session::with_executor(executor, "memory://test")
}

fn order_count_signature() -> ParameterSet {
    let mut set = ParameterSet::new();
    set.push(ParameterDescriptor::input("CustomerId", "int"));
    set.push(ParameterDescriptor::input("Region", "nvarchar"));
    set
}

fn scalar_result(value: Value) -> QueryResult {
    QueryResult {
        columns: vec![ColumnMeta {
            name: "count".to_string(),
            ..Default::default()
        }],
        rows: vec![Row::new(vec!["count".to_string()], vec![value])],
        affected_rows: 0,
        execution_time_ms: 0,
    }
}

#[tokio::test]
async fn from_registry_resolves_the_driver_by_id() {
    let backend = MemoryBackend::new();
    let mut registry = sqlgate_drivers::DriverRegistry::new();
    registry.register(Arc::new(MemoryDriver::new(Arc::clone(&backend))));

    let mut session = Session::from_registry(&registry, "memory", "memory://test").unwrap();
    session.open().await.unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(backend.events(), vec!["connect", "begin"]);
}

#[tokio::test]
async fn from_registry_rejects_unknown_driver_ids() {
    let registry = sqlgate_drivers::DriverRegistry::new();
    let err = Session::from_registry(&registry, "oracle", "oracle://test").unwrap_err();
    assert!(matches!(err, SqlgateError::Configuration(_)));
}

#[tokio::test]
async fn open_connects_and_begins_a_transaction() {
    let backend = MemoryBackend::new();
    let mut session = session(&backend);

    assert_eq!(session.state(), SessionState::Created);
    session.open().await.unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(backend.events(), vec!["connect", "begin"]);
}

#[tokio::test]
async fn open_twice_is_a_usage_error() {
    let backend = MemoryBackend::new();
    let mut session = session(&backend);
    session.open().await.unwrap();

    let err = session.open().await.unwrap_err();
    assert!(matches!(err, SqlgateError::Usage(_)));
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn scalar_with_queued_parameters_then_commit() {
    let backend = MemoryBackend::new();
    backend.script_signature("GetOrderCount", order_count_signature());
    backend.script_result("GetOrderCount", vec![scalar_result(Value::Int32(42))]);
    let mut session = session(&backend);
    session.open().await.unwrap();

    session.add_parameter("CustomerId", Value::Int32(7));
    session.add_parameter("Region", Value::String("south".into()));
    let count = session.execute_scalar("GetOrderCount").await.unwrap();
    assert_eq!(count, Value::Int32(42));

    session.commit().await.unwrap();
    assert_eq!(session.state(), SessionState::Committed);
    assert_eq!(backend.event_count("commit"), 1);
    assert_eq!(backend.event_count("close"), 1);
}

#[tokio::test]
async fn queued_parameters_are_consumed_per_call() {
    let backend = MemoryBackend::new();
    backend.script_signature("GetOrderCount", order_count_signature());
    let mut session = session(&backend);
    session.open().await.unwrap();

    session.add_parameter("CustomerId", Value::Int32(1));
    session.add_parameter("Region", Value::Null);
    session.execute_scalar("GetOrderCount").await.unwrap();

    // The queue is empty again, so a parameterless call skips binding
    session.execute_non_query("RebuildIndexes").await.unwrap();
    assert_eq!(backend.event_count("execute:RebuildIndexes"), 1);
}

#[tokio::test]
async fn data_table_is_the_first_result_set() {
    let backend = MemoryBackend::new();
    backend.script_result(
        "ListLines",
        vec![scalar_result(Value::Int32(1)), scalar_result(Value::Int32(2))],
    );
    let mut session = session(&backend);
    session.open().await.unwrap();

    let table = session.execute_data_table("ListLines").await.unwrap();
    assert_eq!(table.name, "Table");
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.rows[0].get(0), Some(&Value::Int32(1)));
}

#[tokio::test]
async fn reader_streams_rows_inside_the_transaction() {
    let backend = MemoryBackend::new();
    backend.script_result("ListLines", vec![scalar_result(Value::Int32(7))]);
    let mut session = session(&backend);
    session.open().await.unwrap();

    let mut cursor = session.execute_reader("ListLines").await.unwrap();
    assert_eq!(
        cursor.next().await.unwrap().unwrap().get(0),
        Some(&Value::Int32(7))
    );
    assert!(cursor.next().await.unwrap().is_none());
}

#[tokio::test]
async fn commit_mode_off_never_commits() {
    let backend = MemoryBackend::new();
    let mut session = session(&backend).with_commit_mode(false);
    session.open().await.unwrap();

    session.execute_non_query("RebuildIndexes").await.unwrap();
    session.commit().await.unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(backend.event_count("commit"), 0);

    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(backend.event_count("rollback"), 1);
    assert_eq!(backend.event_count("close"), 1);
}

#[tokio::test]
async fn execution_failures_poison_the_session() {
    let backend = MemoryBackend::new();
    backend.fail_next("deadlock victim");
    let mut session = session(&backend);
    session.open().await.unwrap();

    let err = session.execute_non_query("PurgeOrders").await.unwrap_err();
    assert!(matches!(err, SqlgateError::Query(_)));
    assert!(session.has_failed());

    // Later work is refused without touching the backend
    let err = session.execute_non_query("RebuildIndexes").await.unwrap_err();
    assert!(matches!(err, SqlgateError::SessionFailed(_)));
    assert_eq!(backend.event_count("execute:RebuildIndexes"), 0);

    // Commit rolls back instead
    let err = session.commit().await.unwrap_err();
    assert!(matches!(err, SqlgateError::SessionFailed(_)));
    assert_eq!(session.state(), SessionState::RolledBack);
    assert_eq!(backend.event_count("rollback"), 1);
    assert_eq!(backend.event_count("commit"), 0);
}

#[tokio::test]
async fn usage_errors_do_not_poison_the_session() {
    let backend = MemoryBackend::new();
    backend.script_signature("GetOrderCount", order_count_signature());
    let mut session = session(&backend);
    session.open().await.unwrap();

    session.add_parameter("CustomerId", Value::Int32(1));
    let err = session.execute_scalar("GetOrderCount").await.unwrap_err();
    assert!(matches!(err, SqlgateError::Usage(_)));
    assert!(!session.has_failed());

    // The session is still usable afterwards
    session.add_parameter("CustomerId", Value::Int32(1));
    session.add_parameter("Region", Value::Null);
    session.execute_scalar("GetOrderCount").await.unwrap();
    session.commit().await.unwrap();
    assert_eq!(session.state(), SessionState::Committed);
}

#[tokio::test]
async fn execute_after_commit_is_a_usage_error() {
    let backend = MemoryBackend::new();
    let mut session = session(&backend);
    session.open().await.unwrap();
    session.commit().await.unwrap();

    let err = session.execute_non_query("RebuildIndexes").await.unwrap_err();
    assert!(matches!(err, SqlgateError::Usage(_)));
    assert_eq!(session.state(), SessionState::Committed);
}

#[tokio::test]
async fn explicit_rollback_discards_work() {
    let backend = MemoryBackend::new();
    let mut session = session(&backend);
    session.open().await.unwrap();

    session.execute_non_query("RebuildIndexes").await.unwrap();
    session.rollback().await.unwrap();
    assert_eq!(session.state(), SessionState::RolledBack);
    assert_eq!(backend.event_count("rollback"), 1);
    assert_eq!(backend.event_count("commit"), 0);
    assert_eq!(backend.event_count("close"), 1);
}

#[tokio::test]
async fn close_is_idempotent() {
    let backend = MemoryBackend::new();
    let mut session = session(&backend);
    session.open().await.unwrap();

    session.close().await;
    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(backend.event_count("close"), 1);
}
