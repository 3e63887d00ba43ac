//! PostgreSQL backend for sqlgate
//!
//! A partial backend: procedures execute through CALL and parameters are
//! discovered from `information_schema`, but PostgreSQL has no integer
//! return value, so return-value discovery reports not supported.

mod connection;
mod driver;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod driver_tests;

pub use connection::{PostgresConnection, PostgresTransaction};
pub use driver::PostgresDriver;
