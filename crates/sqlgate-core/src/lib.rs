//! sqlgate core - abstractions shared by every sqlgate crate
//!
//! This crate provides the fundamental traits and types the driver and
//! data-access crates depend on. It defines:
//!
//! - `DatabaseDriver` - trait for database backend implementations
//! - `Connection` / `Transaction` - traits for live database handles
//! - `ParameterDescriptor` / `ParameterSet` - stored-procedure signatures
//! - Common types like `Value`, `Row`, `QueryResult`, `DataSet`

mod command;
mod connection;
mod driver;
mod error;
mod params;
mod types;

pub use command::*;
pub use connection::*;
pub use driver::*;
pub use error::*;
pub use params::*;
pub use types::*;
