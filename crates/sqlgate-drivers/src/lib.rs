//! sqlgate drivers - database backend implementations
//!
//! This crate aggregates the concrete backends implementing the driver
//! traits defined in `sqlgate-core`, behind feature gates.

#[cfg(feature = "mssql")]
pub use sqlgate_driver_mssql as mssql;
#[cfg(feature = "postgres")]
pub use sqlgate_driver_postgres as postgres;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from sqlgate-core
pub use sqlgate_core::{
    ColumnMeta, Command, CommandType, Connection, ConnectionConfig, DataSet, DataTable,
    DatabaseDriver, DriverCapabilities, IsolationLevel, ParameterDescriptor, ParameterDirection,
    ParameterSet, ParameterSource, QueryResult, Result, Row, RowCursor, SqlgateError,
    StatementOutcome, Transaction, Value,
};
