//! MS SQL Server backend for sqlgate
//!
//! Implements the sqlgate driver traits over tiberius, including
//! stored-procedure execution, transactions, and parameter discovery
//! through the `sys.parameters` catalog.

mod connection;
mod driver;
mod parameters;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod driver_tests;
#[cfg(test)]
mod parameters_tests;

pub use connection::{MssqlConnection, MssqlConnectionError, MssqlTransaction};
pub use driver::MssqlDriver;
