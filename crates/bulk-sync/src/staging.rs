//! Staging table lifecycle.
//!
//! Staging tables are empty structural clones of the target that accept NULL
//! (and explicit values) in every column, including keys and identity columns.
//! Creation failures abort the operation. Drop is best-effort: its outcome is
//! reported as a [`CleanupOutcome`] and never replaces the primary result.

use tracing::{debug, warn};

use crate::core::schema::{StagingScope, TableDescriptor};
use crate::core::traits::{Dialect, Session};
use crate::error::{BulkError, Result};
use crate::options::BulkOptions;

/// A staging table created during the current operation.
#[derive(Debug, Clone)]
pub struct StagingTable {
    pub name: String,
    pub scope: StagingScope,
    drop_sql: String,
}

/// Result of tearing down a staging table.
#[derive(Debug)]
pub enum CleanupOutcome {
    Dropped,
    /// Non-fatal; carries the failure for diagnostics.
    Failed(BulkError),
}

impl CleanupOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, CleanupOutcome::Dropped)
    }
}

/// Create the staging table for `desc`.
///
/// # Errors
///
/// `BulkError::StagingTable` wrapping the driver failure.
pub async fn create<S, D>(
    session: &mut S,
    dialect: &D,
    desc: &TableDescriptor,
    options: &BulkOptions,
) -> Result<StagingTable>
where
    S: Session,
    D: Dialect + ?Sized,
{
    let sql = dialect.build_create_staging(desc);
    debug!("Creating staging table {}: {}", desc.staging_table, sql);

    options
        .guard("create staging table", session.batch_execute(&sql))
        .await
        .map_err(|e| BulkError::staging(&desc.staging_table, e))?;

    Ok(StagingTable {
        name: desc.staging_table.clone(),
        scope: desc.staging_scope,
        drop_sql: dialect.build_drop_staging(desc),
    })
}

impl StagingTable {
    /// Drop the table. Failures are logged and returned, never raised.
    ///
    /// Runs outside the operation's transaction (after commit or rollback),
    /// so cancellation is not applied; the timeout still is.
    pub async fn teardown<S: Session>(
        self,
        session: &mut S,
        options: &BulkOptions,
    ) -> CleanupOutcome {
        let result = options
            .bounded("drop staging table", session.batch_execute(&self.drop_sql))
            .await;

        match result {
            Ok(_) => {
                debug!("Dropped staging table {}", self.name);
                CleanupOutcome::Dropped
            }
            Err(e) => {
                let err = BulkError::staging(&self.name, e);
                match self.scope {
                    StagingScope::Connection => debug!(
                        "Staging table {} not dropped (released with the connection): {}",
                        self.name,
                        err.format_detailed()
                    ),
                    StagingScope::Named => warn!(
                        "Failed to drop staging table {}: {}",
                        self.name,
                        err.format_detailed()
                    ),
                }
                CleanupOutcome::Failed(err)
            }
        }
    }
}
