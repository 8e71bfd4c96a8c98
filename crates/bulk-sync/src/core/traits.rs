//! Core traits for dialect-aware bulk synchronization.
//!
//! This module defines the seams between the engine and each database engine:
//!
//! - [`Dialect`]: SQL generation strategy (staging DDL, merge statements, quoting)
//! - [`Backend`]: Opens sessions against one configured database
//! - [`Session`]: One connection with transaction control and a bulk-row channel
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` implementations are interchangeable SQL generators;
//!   the orchestrator is generic over them and never inspects which one it has
//! - **Template Method**: key predicates and column lists are default methods
//!   built on the two dialect primitives `quote_ident` and `default_key_literal`

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

use super::schema::{ColumnMapping, KeyKind, StagingScope, TableDescriptor};
use super::value::Row;

/// The two statements of a split upsert, executed in field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeQueryPair {
    /// Insert-or-overwrite for staged rows whose keys are all present.
    pub upsert: String,
    /// Plain insert for staged rows with any null or default key.
    pub insert: String,
}

/// How a pure insert reaches the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStrategy {
    /// Bulk-transfer straight into the target.
    Direct,
    /// Bulk-transfer into staging, then `build_insert_from_staging`.
    ViaStaging,
}

/// Where a bulk transfer lands; drivers may resolve column order differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDestination {
    /// Staging table created by this operation, columns in request order.
    Staging,
    /// The caller's target table.
    Target,
}

/// A bulk-row transfer into one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    /// Dialect-quoted table reference.
    pub table: String,
    /// Unquoted physical column names, matching the order of values in each row.
    pub columns: Vec<String>,
    pub destination: CopyDestination,
}

/// SQL syntax strategy for a database engine.
///
/// All identifiers reaching a dialect have been validated by the resolver, so
/// builders return plain strings.
pub trait Dialect: Send + Sync {
    /// Get the dialect name (e.g., "postgres", "mssql").
    fn name(&self) -> &str;

    /// Quote an identifier for this dialect.
    fn quote_ident(&self, name: &str) -> String;

    /// Quote `schema.table`.
    fn qualify(&self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
    }

    /// Schema used when neither the model nor the engine names one.
    fn default_schema(&self) -> &str;

    /// Deterministic staging table name for `table`.
    fn staging_table_name(&self, table: &str) -> String;

    /// Quoted reference to a staging table.
    fn qualify_staging(&self, staging_table: &str) -> String {
        self.quote_ident(staging_table)
    }

    /// Lifetime of staging tables on this engine.
    fn staging_scope(&self) -> StagingScope;

    /// SQL literal for a key kind's default placeholder, if it has one.
    fn default_key_literal(&self, kind: KeyKind) -> Option<String>;

    /// Path a pure insert takes for this descriptor.
    fn insert_strategy(&self, _desc: &TableDescriptor, _keep_identity: bool) -> InsertStrategy {
        InsertStrategy::Direct
    }

    /// Create an empty, nullable clone of the target table.
    fn build_create_staging(&self, desc: &TableDescriptor) -> String;

    /// Drop the staging table if it exists.
    fn build_drop_staging(&self, desc: &TableDescriptor) -> String;

    /// Update-only merge. `None` when there is no column to assign.
    fn build_update(&self, desc: &TableDescriptor) -> Option<String>;

    /// Split upsert: keyed rows first, key-less rows second.
    fn build_split_merge(&self, desc: &TableDescriptor) -> MergeQueryPair;

    /// Copy every staged row into the target (the `ViaStaging` insert path).
    fn build_insert_from_staging(&self, desc: &TableDescriptor, keep_identity: bool) -> String;

    /// Statements that realign identity generators after explicit values were written.
    fn build_identity_resync(&self, _desc: &TableDescriptor) -> Vec<String> {
        Vec::new()
    }

    /// Comma-separated quoted columns, optionally prefixed by `alias.`.
    fn column_list(&self, columns: &[&ColumnMapping], alias: Option<&str>) -> String {
        columns
            .iter()
            .map(|c| match alias {
                Some(a) => format!("{}.{}", a, self.quote_ident(&c.column)),
                None => self.quote_ident(&c.column),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `left.k1 = right.k1 AND left.k2 = right.k2 ...`
    fn key_join(&self, desc: &TableDescriptor, left: &str, right: &str) -> String {
        desc.key_columns()
            .iter()
            .map(|c| {
                let col = self.quote_ident(&c.column);
                format!("{}.{} = {}.{}", left, col, right, col)
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Every key column of `alias` is non-null (no default check).
    fn keys_not_null(&self, desc: &TableDescriptor, alias: &str) -> String {
        desc.key_columns()
            .iter()
            .map(|c| format!("{}.{} IS NOT NULL", alias, self.quote_ident(&c.column)))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Every key column of `alias` holds a real value: not null and not its default.
    fn keys_present(&self, desc: &TableDescriptor, alias: &str) -> String {
        desc.key_columns()
            .iter()
            .map(|c| {
                let col = format!("{}.{}", alias, self.quote_ident(&c.column));
                match self.default_key_literal(c.key_kind) {
                    Some(lit) => format!("({} IS NOT NULL AND {} <> {})", col, col, lit),
                    None => format!("{} IS NOT NULL", col),
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Any key column of `alias` is null or its default.
    fn keys_absent(&self, desc: &TableDescriptor, alias: &str) -> String {
        desc.key_columns()
            .iter()
            .map(|c| {
                let col = format!("{}.{}", alias, self.quote_ident(&c.column));
                match self.default_key_literal(c.key_kind) {
                    Some(lit) => format!("{} IS NULL OR {} = {}", col, col, lit),
                    None => format!("{} IS NULL", col),
                }
            })
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}

/// One connection to the target database.
///
/// Sessions are not shared: every public operation opens its own and closes it
/// on every exit path.
#[async_trait]
pub trait Session: Send {
    /// Begin a transaction. `statement_timeout` is applied server-side where supported.
    async fn begin(&mut self, statement_timeout: Option<Duration>) -> Result<()>;

    /// Execute a statement, returning rows affected.
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Run `sql` as a plain batch in the session's own scope.
    ///
    /// Objects it creates (e.g. `#temp` tables) stay visible to later calls,
    /// which `execute` does not guarantee on every engine.
    async fn batch_execute(&mut self, sql: &str) -> Result<()>;

    /// Stream rows into a table with the engine's native bulk channel.
    async fn copy_in(&mut self, request: &CopyRequest, rows: Vec<Row>) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Close the connection.
    async fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// A configured database that can open sessions.
#[async_trait]
pub trait Backend: Send + Sync {
    type Dialect: Dialect;
    type Session: Session;

    /// SQL strategy for this backend.
    fn dialect(&self) -> &Self::Dialect;

    /// Open a new connection.
    async fn open(&self) -> Result<Self::Session>;
}
