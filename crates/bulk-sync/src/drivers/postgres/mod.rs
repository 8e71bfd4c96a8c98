//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PostgresBackend`] / [`PostgresSession`]: connections, transactions and binary COPY

mod dialect;
mod encode;
mod session;

pub use dialect::PostgresDialect;
pub use session::{PostgresBackend, PostgresSession};
