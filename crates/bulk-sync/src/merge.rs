//! Merge execution: reconcile staged rows with the target table.
//!
//! Statement text comes from the dialect (see `drivers::*::dialect`); this
//! module runs it in the order each strategy requires and turns failures into
//! `BulkError::MergeExecution`. Row counts are informational and only logged.

use tracing::{debug, info};

use crate::core::schema::TableDescriptor;
use crate::core::traits::{Dialect, Session};
use crate::error::{BulkError, Result};
use crate::options::BulkOptions;

pub use crate::core::traits::MergeQueryPair;

/// Row counts reported by a split upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    /// Rows inserted or overwritten by key.
    pub upserted: u64,
    /// Key-less rows inserted as new.
    pub inserted: u64,
}

async fn run_statement<S: Session>(
    session: &mut S,
    desc: &TableDescriptor,
    statement: &str,
    sql: &str,
    options: &BulkOptions,
) -> Result<u64> {
    debug!("{} {}: {}", desc.qualified_name, statement, sql);
    options
        .guard(statement, session.execute(sql))
        .await
        .map_err(|e| BulkError::merge(&desc.qualified_name, statement, e))
}

/// Update-only merge. Staged rows with a NULL key are skipped.
pub async fn run_update<S, D>(
    session: &mut S,
    dialect: &D,
    desc: &TableDescriptor,
    options: &BulkOptions,
) -> Result<u64>
where
    S: Session,
    D: Dialect + ?Sized,
{
    let Some(sql) = dialect.build_update(desc) else {
        debug!(
            "{} has no assignable columns; update is a no-op",
            desc.qualified_name
        );
        return Ok(0);
    };

    let updated = run_statement(session, desc, "update", &sql, options).await?;
    info!("{}: updated {} rows from staging", desc.qualified_name, updated);
    Ok(updated)
}

/// Split upsert: the keyed statement first, then the key-less insert.
///
/// Keyed rows write explicit identity values, so the identity generator is
/// resynced between the two statements; the key-less insert then draws ids
/// above every key the upsert just wrote.
pub async fn run_split_upsert<S, D>(
    session: &mut S,
    dialect: &D,
    desc: &TableDescriptor,
    options: &BulkOptions,
) -> Result<UpsertCounts>
where
    S: Session,
    D: Dialect + ?Sized,
{
    let pair = dialect.build_split_merge(desc);

    let upserted = run_statement(session, desc, "upsert", &pair.upsert, options).await?;
    if upserted > 0 && desc.has_identity() {
        run_identity_resync(session, dialect, desc, options).await?;
    }
    let inserted = run_statement(session, desc, "insert", &pair.insert, options).await?;

    info!(
        "{}: upsert matched or inserted {} keyed rows, inserted {} new rows",
        desc.qualified_name, upserted, inserted
    );
    Ok(UpsertCounts { upserted, inserted })
}

/// Copy staged rows into the target (insert via staging).
pub async fn run_insert_from_staging<S, D>(
    session: &mut S,
    dialect: &D,
    desc: &TableDescriptor,
    options: &BulkOptions,
) -> Result<u64>
where
    S: Session,
    D: Dialect + ?Sized,
{
    let sql = dialect.build_insert_from_staging(desc, options.keep_identity);
    let inserted = run_statement(session, desc, "insert", &sql, options).await?;
    info!(
        "{}: inserted {} rows from staging",
        desc.qualified_name, inserted
    );
    Ok(inserted)
}

/// Realign identity generators after explicit identity values were written.
pub async fn run_identity_resync<S, D>(
    session: &mut S,
    dialect: &D,
    desc: &TableDescriptor,
    options: &BulkOptions,
) -> Result<()>
where
    S: Session,
    D: Dialect + ?Sized,
{
    for sql in dialect.build_identity_resync(desc) {
        run_statement(session, desc, "identity resync", &sql, options).await?;
    }
    Ok(())
}
