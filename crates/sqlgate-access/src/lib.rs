//! sqlgate access - stored-procedure data access layer
//!
//! Builds the caller-facing helpers on top of the driver traits:
//!
//! - `ParameterCache` - discovered procedure signatures, cloned per call
//! - `Executor` - stored-procedure execution in three addressing modes
//!   (connection string, open connection, open transaction) and four
//!   result shapes (non-query, scalar, data set, reader)
//! - `Session` - a transactional unit of work with sticky failure state
//! - Plain entity types loaded from result rows

mod cache;
mod entities;
mod executor;
mod session;

#[cfg(test)]
mod test_driver;

#[cfg(test)]
mod session_tests;

pub use cache::ParameterCache;
pub use entities::{BusinessLine, BusinessLines};
pub use executor::Executor;
pub use session::{Session, SessionState};

/// Re-export commonly used types from sqlgate-core
pub use sqlgate_core::{
    Command, CommandType, Connection, DataSet, DataTable, DatabaseDriver, IsolationLevel,
    ParameterDescriptor, ParameterDirection, ParameterSet, ParameterSource, QueryResult, Result,
    Row, RowCursor, SqlgateError, Transaction, Value,
};
