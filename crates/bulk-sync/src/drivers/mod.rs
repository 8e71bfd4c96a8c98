//! Database driver implementations.
//!
//! This module provides database-specific implementations of the core traits:
//!
//! - [`mssql`]: Microsoft SQL Server driver
//! - [`postgres`]: PostgreSQL driver
//! - [`common`]: Shared utilities (TLS)
//!
//! # Architecture
//!
//! Each driver module implements:
//! - `Dialect`: SQL syntax strategy for the database engine
//! - `Backend`: opens sessions from a [`TargetConfig`]
//! - `Session`: transactions, statements and the native bulk-row channel
//!
//! The `*Impl` enums below select a driver at runtime from configuration
//! with static dispatch: each method is a `match` over the variants.
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect`, `Backend` and `Session`
//! 3. Add a variant to `DialectImpl`, `BackendImpl` and `SessionImpl`
//! 4. Accept its type name in `BackendImpl::from_config` and config validation

use std::time::Duration;

use async_trait::async_trait;

pub mod common;
pub mod mssql;
pub mod postgres;

pub use common::{SslMode, TlsBuilder};
pub use mssql::{MssqlBackend, MssqlDialect, MssqlSession};
pub use postgres::{PostgresBackend, PostgresDialect, PostgresSession};

use crate::config::TargetConfig;
use crate::core::schema::{KeyKind, StagingScope, TableDescriptor};
use crate::core::traits::{
    Backend, CopyRequest, Dialect, InsertStrategy, MergeQueryPair, Session,
};
use crate::core::value::Row;
use crate::error::{BulkError, Result};

/// Forward a call to whichever variant is present.
macro_rules! dispatch {
    ($enum:ident, $value:expr, $inner:ident => $call:expr) => {
        match $value {
            $enum::Mssql($inner) => $call,
            $enum::Postgres($inner) => $call,
        }
    };
}

/// Enum-based static dispatch for dialects.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Mssql(MssqlDialect),
    Postgres(PostgresDialect),
}

static MSSQL_DIALECT: DialectImpl = DialectImpl::Mssql(MssqlDialect);
static POSTGRES_DIALECT: DialectImpl = DialectImpl::Postgres(PostgresDialect);

impl DialectImpl {
    /// Create a dialect implementation from a database type string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database type is not recognized.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        match db_type.to_lowercase().as_str() {
            "mssql" | "sqlserver" | "sql_server" => Ok(DialectImpl::Mssql(MssqlDialect::new())),
            "postgres" | "postgresql" | "pg" => Ok(DialectImpl::Postgres(PostgresDialect::new())),
            other => Err(BulkError::Config(format!(
                "Unknown database type: '{}'. Supported types: mssql, postgres",
                other
            ))),
        }
    }
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        dispatch!(DialectImpl, self, d => d.name())
    }

    fn quote_ident(&self, name: &str) -> String {
        dispatch!(DialectImpl, self, d => d.quote_ident(name))
    }

    fn qualify(&self, schema: &str, table: &str) -> String {
        dispatch!(DialectImpl, self, d => d.qualify(schema, table))
    }

    fn default_schema(&self) -> &str {
        dispatch!(DialectImpl, self, d => d.default_schema())
    }

    fn staging_table_name(&self, table: &str) -> String {
        dispatch!(DialectImpl, self, d => d.staging_table_name(table))
    }

    fn qualify_staging(&self, staging_table: &str) -> String {
        dispatch!(DialectImpl, self, d => d.qualify_staging(staging_table))
    }

    fn staging_scope(&self) -> StagingScope {
        dispatch!(DialectImpl, self, d => d.staging_scope())
    }

    fn default_key_literal(&self, kind: KeyKind) -> Option<String> {
        dispatch!(DialectImpl, self, d => d.default_key_literal(kind))
    }

    fn insert_strategy(&self, desc: &TableDescriptor, keep_identity: bool) -> InsertStrategy {
        dispatch!(DialectImpl, self, d => d.insert_strategy(desc, keep_identity))
    }

    fn build_create_staging(&self, desc: &TableDescriptor) -> String {
        dispatch!(DialectImpl, self, d => d.build_create_staging(desc))
    }

    fn build_drop_staging(&self, desc: &TableDescriptor) -> String {
        dispatch!(DialectImpl, self, d => d.build_drop_staging(desc))
    }

    fn build_update(&self, desc: &TableDescriptor) -> Option<String> {
        dispatch!(DialectImpl, self, d => d.build_update(desc))
    }

    fn build_split_merge(&self, desc: &TableDescriptor) -> MergeQueryPair {
        dispatch!(DialectImpl, self, d => d.build_split_merge(desc))
    }

    fn build_insert_from_staging(&self, desc: &TableDescriptor, keep_identity: bool) -> String {
        dispatch!(DialectImpl, self, d => d.build_insert_from_staging(desc, keep_identity))
    }

    fn build_identity_resync(&self, desc: &TableDescriptor) -> Vec<String> {
        dispatch!(DialectImpl, self, d => d.build_identity_resync(desc))
    }
}

/// Backend selected from configuration.
pub enum BackendImpl {
    Mssql(MssqlBackend),
    Postgres(PostgresBackend),
}

impl BackendImpl {
    /// Build the backend named by `config.type`. No connection is made yet.
    pub fn from_config(config: &TargetConfig) -> Result<Self> {
        match DialectImpl::from_db_type(&config.r#type)? {
            DialectImpl::Mssql(_) => Ok(BackendImpl::Mssql(MssqlBackend::new(config.clone())?)),
            DialectImpl::Postgres(_) => {
                Ok(BackendImpl::Postgres(PostgresBackend::new(config.clone())?))
            }
        }
    }

    pub fn config(&self) -> &TargetConfig {
        dispatch!(BackendImpl, self, b => b.config())
    }
}

#[async_trait]
impl Backend for BackendImpl {
    type Dialect = DialectImpl;
    type Session = SessionImpl;

    fn dialect(&self) -> &DialectImpl {
        match self {
            BackendImpl::Mssql(_) => &MSSQL_DIALECT,
            BackendImpl::Postgres(_) => &POSTGRES_DIALECT,
        }
    }

    async fn open(&self) -> Result<SessionImpl> {
        match self {
            BackendImpl::Mssql(b) => Ok(SessionImpl::Mssql(b.open().await?)),
            BackendImpl::Postgres(b) => Ok(SessionImpl::Postgres(b.open().await?)),
        }
    }
}

/// Session of a [`BackendImpl`].
pub enum SessionImpl {
    Mssql(MssqlSession),
    Postgres(PostgresSession),
}

#[async_trait]
impl Session for SessionImpl {
    async fn begin(&mut self, statement_timeout: Option<Duration>) -> Result<()> {
        dispatch!(SessionImpl, self, s => s.begin(statement_timeout).await)
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        dispatch!(SessionImpl, self, s => s.execute(sql).await)
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<()> {
        dispatch!(SessionImpl, self, s => s.batch_execute(sql).await)
    }

    async fn copy_in(&mut self, request: &CopyRequest, rows: Vec<Row>) -> Result<u64> {
        dispatch!(SessionImpl, self, s => s.copy_in(request, rows).await)
    }

    async fn commit(&mut self) -> Result<()> {
        dispatch!(SessionImpl, self, s => s.commit().await)
    }

    async fn rollback(&mut self) -> Result<()> {
        dispatch!(SessionImpl, self, s => s.rollback().await)
    }

    async fn close(self) -> Result<()> {
        dispatch!(SessionImpl, self, s => s.close().await)
    }
}
