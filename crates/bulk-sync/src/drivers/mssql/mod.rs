//! Microsoft SQL Server driver.
//!
//! - [`MssqlDialect`]: SQL syntax strategy for MSSQL
//! - [`MssqlBackend`] / [`MssqlSession`]: tiberius connections, transactions and TDS bulk load

mod dialect;
mod encode;
mod session;

pub use dialect::MssqlDialect;
pub use session::{MssqlBackend, MssqlSession};
