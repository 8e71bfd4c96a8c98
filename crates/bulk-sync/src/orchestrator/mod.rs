//! Operation orchestrator - sequences one bulk operation end to end.
//!
//! Every public call walks the same states:
//!
//! ```text
//! open -> begin -> resolve -> [create staging] -> stream -> [merge] -> commit -> close
//! ```
//!
//! Any failure after the session is open takes the failure path instead:
//! rollback, best-effort staging drop, close, then the error wrapped in the
//! operation's kind (`InsertFailed`, `UpdateFailed`, `UpsertFailed`).

use std::any::type_name;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::metadata::MetadataProvider;
use crate::core::record::Record;
use crate::core::schema::TableDescriptor;
use crate::core::traits::{Backend, Dialect, InsertStrategy, Session};
use crate::drivers::BackendImpl;
use crate::error::{BulkError, Result};
use crate::merge;
use crate::options::BulkOptions;
use crate::resolver::SchemaResolver;
use crate::staging::{self, StagingTable};
use crate::streamer::{self, StreamTarget};

/// The three public operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
    InsertOrUpdate,
}

impl Operation {
    /// Wrap a failure in this operation's error kind.
    pub fn wrap(self, record: &str, source: BulkError) -> BulkError {
        let record = record.to_string();
        let source = Box::new(source);
        match self {
            Operation::Insert => BulkError::InsertFailed { record, source },
            Operation::Update => BulkError::UpdateFailed { record, source },
            Operation::InsertOrUpdate => BulkError::UpsertFailed { record, source },
        }
    }

    fn requires_primary_key(self) -> bool {
        !matches!(self, Operation::Insert)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::InsertOrUpdate => "insert-or-update",
        })
    }
}

/// Outcome of a committed bulk operation.
///
/// Counts are what the database reported; they are informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkReport {
    pub operation: Operation,

    /// Dialect-qualified target table. Empty when nothing was resolved.
    pub table: String,

    /// Rows accepted by the bulk transfer.
    pub rows_streamed: u64,

    /// Rows written by key: matched by an update, or by the keyed upsert
    /// statement (which may also insert rows carrying new keys).
    pub rows_updated: u64,

    /// Rows inserted as new.
    pub rows_inserted: u64,

    /// Wall-clock duration in seconds.
    pub duration_seconds: f64,
}

impl BulkReport {
    /// Report for an empty batch: no connection was opened.
    pub fn empty(operation: Operation) -> Self {
        Self {
            operation,
            table: String::new(),
            rows_streamed: 0,
            rows_updated: 0,
            rows_inserted: 0,
            duration_seconds: 0.0,
        }
    }

    fn started(operation: Operation, desc: &TableDescriptor) -> Self {
        Self {
            table: desc.qualified_name.clone(),
            ..Self::empty(operation)
        }
    }

    /// Rows changed in the target table.
    pub fn rows_affected(&self) -> u64 {
        self.rows_updated + self.rows_inserted
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Bulk insert, update and upsert against one configured database.
///
/// The engine holds no per-operation state; each call opens its own session,
/// so a shared engine can serve concurrent callers.
pub struct BulkEngine<B: Backend> {
    backend: B,
    metadata: Arc<dyn MetadataProvider>,
    default_schema: Option<String>,
}

impl BulkEngine<BackendImpl> {
    /// Build an engine for the target described by `config`.
    ///
    /// `target.schema`, when set, becomes the default schema for models
    /// that do not name one.
    pub fn from_config(config: &Config, metadata: Arc<dyn MetadataProvider>) -> Result<Self> {
        let backend = BackendImpl::from_config(&config.target)?;
        let engine = BulkEngine::new(backend, metadata);
        Ok(match &config.target.schema {
            Some(schema) => engine.with_default_schema(schema.clone()),
            None => engine,
        })
    }
}

impl<B: Backend> BulkEngine<B> {
    pub fn new(backend: B, metadata: Arc<dyn MetadataProvider>) -> Self {
        Self {
            backend,
            metadata,
            default_schema: None,
        }
    }

    /// Schema for models without one, in place of the dialect default.
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Insert every record as a new row.
    ///
    /// Identity columns are left to the database unless
    /// `options.keep_identity` is set.
    pub async fn bulk_insert<R: Record + 'static>(
        &self,
        records: &[R],
        options: &BulkOptions,
    ) -> Result<BulkReport> {
        self.execute(Operation::Insert, records, options).await
    }

    /// Overwrite every non-key column of existing rows, matched by primary key.
    ///
    /// Records whose key matches no row, or whose key is absent, are skipped.
    pub async fn bulk_update<R: Record + 'static>(
        &self,
        records: &[R],
        options: &BulkOptions,
    ) -> Result<BulkReport> {
        self.execute(Operation::Update, records, options).await
    }

    /// Update records with a real key and insert the ones without.
    ///
    /// A key is absent when it is null or its type's default (zero, empty
    /// string, nil UUID). Duplicate keys in one batch are not deduplicated.
    pub async fn bulk_insert_or_update<R: Record + 'static>(
        &self,
        records: &[R],
        options: &BulkOptions,
    ) -> Result<BulkReport> {
        self.execute(Operation::InsertOrUpdate, records, options).await
    }

    async fn execute<R: Record + 'static>(
        &self,
        operation: Operation,
        records: &[R],
        options: &BulkOptions,
    ) -> Result<BulkReport> {
        let record = type_name::<R>();
        if records.is_empty() {
            debug!("{} of {}: empty batch, nothing to do", operation, record);
            return Ok(BulkReport::empty(operation));
        }

        let start = Instant::now();
        let mut report = self
            .run(operation, records, options)
            .await
            .map_err(|e| operation.wrap(record, e))?;
        report.duration_seconds = start.elapsed().as_secs_f64();

        info!(
            "{} {}: {} rows streamed, {} updated, {} inserted in {:.2}s",
            operation,
            report.table,
            report.rows_streamed,
            report.rows_updated,
            report.rows_inserted,
            report.duration_seconds
        );
        Ok(report)
    }

    async fn run<R: Record + 'static>(
        &self,
        operation: Operation,
        records: &[R],
        options: &BulkOptions,
    ) -> Result<BulkReport> {
        options.check_cancelled()?;
        let mut session = options.guard("open connection", self.backend.open()).await?;
        debug!("{}: session open", operation);

        let mut lifecycle = Lifecycle::default();
        let result = self
            .transact(&mut session, &mut lifecycle, operation, records, options)
            .await;

        if result.is_err() && lifecycle.in_transaction {
            match options.bounded("rollback", session.rollback()).await {
                Ok(()) => debug!("{}: rolled back", operation),
                Err(e) => warn!("{}: rollback failed: {}", operation, e.format_detailed()),
            }
        }

        if let Some(table) = lifecycle.staging.take() {
            // Outcome is logged by teardown and never replaces the result
            table.teardown(&mut session, options).await;
        }

        if let Err(e) = session.close().await {
            warn!("{}: closing session failed: {}", operation, e);
        }

        result
    }

    async fn transact<R: Record + 'static>(
        &self,
        session: &mut B::Session,
        lifecycle: &mut Lifecycle,
        operation: Operation,
        records: &[R],
        options: &BulkOptions,
    ) -> Result<BulkReport> {
        // Set first: a begin that fails halfway still needs a rollback
        lifecycle.in_transaction = true;
        options
            .guard("begin transaction", session.begin(options.timeout))
            .await?;

        let desc = self.resolve::<R>(operation)?;
        debug!(
            "{}: resolved {} -> {} ({} columns)",
            operation,
            desc.record,
            desc.qualified_name,
            desc.columns.len()
        );

        let mut report = BulkReport::started(operation, &desc);
        match operation {
            Operation::Insert => {
                self.insert(session, lifecycle, records, &desc, options, &mut report)
                    .await?
            }
            Operation::Update => {
                self.update(session, lifecycle, records, &desc, options, &mut report)
                    .await?
            }
            Operation::InsertOrUpdate => {
                self.upsert(session, lifecycle, records, &desc, options, &mut report)
                    .await?
            }
        }

        options.guard("commit", session.commit()).await?;
        lifecycle.in_transaction = false;
        debug!("{}: committed", operation);
        Ok(report)
    }

    fn resolve<R: Record + 'static>(&self, operation: Operation) -> Result<TableDescriptor> {
        let desc = SchemaResolver::new(&*self.metadata, self.backend.dialect())
            .with_default_schema(self.default_schema.as_deref())
            .resolve::<R>()?;
        if operation.requires_primary_key() {
            desc.require_primary_key()?;
        }
        Ok(desc)
    }

    async fn stage<R: Record>(
        &self,
        session: &mut B::Session,
        lifecycle: &mut Lifecycle,
        records: &[R],
        desc: &TableDescriptor,
        options: &BulkOptions,
    ) -> Result<u64> {
        let table = staging::create(session, self.backend.dialect(), desc, options).await?;
        lifecycle.staging = Some(table);
        streamer::stream(session, records, desc, StreamTarget::Staging, options).await
    }

    async fn insert<R: Record>(
        &self,
        session: &mut B::Session,
        lifecycle: &mut Lifecycle,
        records: &[R],
        desc: &TableDescriptor,
        options: &BulkOptions,
        report: &mut BulkReport,
    ) -> Result<()> {
        let dialect = self.backend.dialect();
        let keep_identity = options.keep_identity;

        match dialect.insert_strategy(desc, keep_identity) {
            InsertStrategy::Direct => {
                let target = StreamTarget::Target { keep_identity };
                report.rows_streamed =
                    streamer::stream(session, records, desc, target, options).await?;
                report.rows_inserted = report.rows_streamed;
            }
            InsertStrategy::ViaStaging => {
                report.rows_streamed = self
                    .stage(session, lifecycle, records, desc, options)
                    .await?;
                report.rows_inserted =
                    merge::run_insert_from_staging(session, dialect, desc, options).await?;
            }
        }

        if keep_identity && desc.has_identity() {
            merge::run_identity_resync(session, dialect, desc, options).await?;
        }
        Ok(())
    }

    async fn update<R: Record>(
        &self,
        session: &mut B::Session,
        lifecycle: &mut Lifecycle,
        records: &[R],
        desc: &TableDescriptor,
        options: &BulkOptions,
        report: &mut BulkReport,
    ) -> Result<()> {
        report.rows_streamed = self
            .stage(session, lifecycle, records, desc, options)
            .await?;
        report.rows_updated =
            merge::run_update(session, self.backend.dialect(), desc, options).await?;
        Ok(())
    }

    async fn upsert<R: Record>(
        &self,
        session: &mut B::Session,
        lifecycle: &mut Lifecycle,
        records: &[R],
        desc: &TableDescriptor,
        options: &BulkOptions,
        report: &mut BulkReport,
    ) -> Result<()> {
        let dialect = self.backend.dialect();
        report.rows_streamed = self
            .stage(session, lifecycle, records, desc, options)
            .await?;

        let counts = merge::run_split_upsert(session, dialect, desc, options).await?;
        report.rows_updated = counts.upserted;
        report.rows_inserted = counts.inserted;
        Ok(())
    }
}

/// Resources acquired by the current call that the exit path must release.
#[derive(Default)]
struct Lifecycle {
    in_transaction: bool,
    staging: Option<StagingTable>,
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Operation
    // =========================================================================

    #[test]
    fn test_operation_wraps_into_its_kind() {
        let err = Operation::Insert.wrap("app::Tavern", BulkError::Cancelled);
        assert!(matches!(err, BulkError::InsertFailed { ref record, .. } if record == "app::Tavern"));

        let err = Operation::Update.wrap("app::Tavern", BulkError::Cancelled);
        assert!(matches!(err, BulkError::UpdateFailed { .. }));

        let err = Operation::InsertOrUpdate.wrap("app::Tavern", BulkError::Cancelled);
        assert!(matches!(err, BulkError::UpsertFailed { .. }));
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_only_insert_allows_keyless_tables() {
        assert!(!Operation::Insert.requires_primary_key());
        assert!(Operation::Update.requires_primary_key());
        assert!(Operation::InsertOrUpdate.requires_primary_key());
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::InsertOrUpdate.to_string(), "insert-or-update");
        assert_eq!(Operation::Insert.to_string(), "insert");
    }

    // =========================================================================
    // BulkReport
    // =========================================================================

    #[test]
    fn test_empty_report() {
        let report = BulkReport::empty(Operation::Update);
        assert_eq!(report.rows_affected(), 0);
        assert!(report.table.is_empty());
    }

    #[test]
    fn test_rows_affected_sums_writes() {
        let report = BulkReport {
            rows_streamed: 3,
            rows_updated: 1,
            rows_inserted: 2,
            ..BulkReport::empty(Operation::InsertOrUpdate)
        };
        assert_eq!(report.rows_affected(), 3);
    }

    #[test]
    fn test_report_json() {
        let report = BulkReport {
            table: "\"public\".\"taverns\"".into(),
            rows_streamed: 5,
            rows_inserted: 5,
            ..BulkReport::empty(Operation::Insert)
        };
        let json = report.to_json().unwrap();
        assert!(json.contains("\"operation\": \"insert\""));
        assert!(json.contains("\"rows_inserted\": 5"));
    }
}
