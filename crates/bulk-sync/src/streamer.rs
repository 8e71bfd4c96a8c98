//! Batch streamer: records -> native bulk-transfer rows.
//!
//! Each record becomes one row. Primary-key values that are NULL or their
//! type's default placeholder are written as typed NULL, so the merge step can
//! classify rows with a plain `IS NULL` regardless of how the record encoded
//! "no key".

use tracing::debug;

use crate::core::record::Record;
use crate::core::schema::{ColumnMapping, TableDescriptor};
use crate::core::traits::{CopyDestination, CopyRequest, Session};
use crate::core::value::{Row, SqlValue};
use crate::error::{BulkError, Result};
use crate::options::BulkOptions;

/// Which table a stream writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTarget {
    /// The operation's staging table; every mapped column is transferred.
    Staging,
    /// The target table directly; identity columns only with `keep_identity`.
    Target { keep_identity: bool },
}

/// Columns transferred for `target`, in descriptor order.
pub fn transfer_columns(desc: &TableDescriptor, target: StreamTarget) -> Vec<&ColumnMapping> {
    match target {
        StreamTarget::Staging => desc.columns.iter().collect(),
        StreamTarget::Target { keep_identity } => desc.insert_columns(keep_identity),
    }
}

/// Build the copy request for `target`.
pub fn copy_request(desc: &TableDescriptor, target: StreamTarget) -> CopyRequest {
    let (table, destination) = match target {
        StreamTarget::Staging => (desc.qualified_staging.clone(), CopyDestination::Staging),
        StreamTarget::Target { .. } => (desc.qualified_name.clone(), CopyDestination::Target),
    };
    CopyRequest {
        table,
        columns: transfer_columns(desc, target)
            .iter()
            .map(|c| c.column.clone())
            .collect(),
        destination,
    }
}

/// Convert one record into a transfer row.
///
/// # Errors
///
/// `BulkError::BulkTransfer` if the record's value count does not match the
/// descriptor (a heterogeneous batch).
pub fn build_row<R: Record>(
    record: &R,
    position: usize,
    desc: &TableDescriptor,
    columns: &[&ColumnMapping],
) -> Result<Row> {
    let values = record.values();
    if values.len() != desc.columns.len() {
        return Err(BulkError::transfer(
            &desc.qualified_name,
            format!(
                "record {} has {} values, expected {}",
                position,
                values.len(),
                desc.columns.len()
            ),
        ));
    }

    let row = columns
        .iter()
        .map(|col| {
            let value = &values[col.value_index];
            if col.is_primary_key && col.key_kind.is_absent(value) {
                SqlValue::Null(col.value_type)
            } else {
                value.clone().into_owned()
            }
        })
        .collect();

    Ok(row)
}

/// Stream `records` into the table selected by `target`, chunk by chunk.
///
/// Returns the number of rows the server accepted. The cancellation token is
/// checked before each chunk and raced against every transfer.
pub async fn stream<S, R>(
    session: &mut S,
    records: &[R],
    desc: &TableDescriptor,
    target: StreamTarget,
    options: &BulkOptions,
) -> Result<u64>
where
    S: Session,
    R: Record,
{
    let request = copy_request(desc, target);
    let columns = transfer_columns(desc, target);
    let batch_size = options.effective_batch_size();
    let notify_after = options.effective_notify_after() as u64;

    debug!(
        "Streaming {} rows into {} ({} columns, chunks of {})",
        records.len(),
        request.table,
        request.columns.len(),
        batch_size
    );

    let mut written = 0u64;
    let mut next_notice = notify_after;

    for (chunk_idx, chunk) in records.chunks(batch_size).enumerate() {
        options.check_cancelled()?;

        let offset = chunk_idx * batch_size;
        let rows = chunk
            .iter()
            .enumerate()
            .map(|(i, record)| build_row(record, offset + i, desc, &columns))
            .collect::<Result<Vec<_>>>()?;

        let accepted = options
            .guard("bulk transfer", session.copy_in(&request, rows))
            .await
            .map_err(|e| match e {
                BulkError::BulkTransfer { .. } => e,
                other => BulkError::transfer_caused(
                    &request.table,
                    format!("chunk {} failed", chunk_idx),
                    other,
                ),
            })?;
        written += accepted;

        if written >= next_notice {
            debug!(
                "{}: streamed {}/{} rows",
                request.table,
                written,
                records.len()
            );
            while next_notice <= written {
                next_notice += notify_after;
            }
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::FieldDef;
    use crate::core::schema::{KeyKind, StagingScope};
    use crate::core::value::SqlNullType;
    use uuid::Uuid;

    struct Tavern {
        id: i64,
        key: Uuid,
        name: Option<String>,
    }

    impl Record for Tavern {
        fn fields() -> Vec<FieldDef> {
            vec![
                FieldDef::scalar("Id", SqlNullType::I64),
                FieldDef::scalar("Key", SqlNullType::Uuid),
                FieldDef::scalar("Name", SqlNullType::String),
            ]
        }

        fn values(&self) -> Vec<SqlValue<'_>> {
            vec![
                SqlValue::I64(self.id),
                SqlValue::Uuid(self.key),
                self.name
                    .as_deref()
                    .map_or(SqlValue::Null(SqlNullType::String), SqlValue::text_borrowed),
            ]
        }
    }

    struct Short;

    impl Record for Short {
        fn fields() -> Vec<FieldDef> {
            Vec::new()
        }

        fn values(&self) -> Vec<SqlValue<'_>> {
            vec![SqlValue::I64(1)]
        }
    }

    fn column(field: &str, idx: usize, pk: bool, identity: bool, ty: SqlNullType) -> ColumnMapping {
        ColumnMapping {
            field: field.into(),
            column: field.to_lowercase(),
            value_type: ty,
            value_index: idx,
            is_primary_key: pk,
            is_identity: identity,
            key_kind: KeyKind::from_type(ty),
        }
    }

    fn descriptor() -> TableDescriptor {
        TableDescriptor {
            record: "Tavern".into(),
            schema: "dbo".into(),
            table: "taverns".into(),
            qualified_name: "[dbo].[taverns]".into(),
            staging_table: "#temp_taverns".into(),
            qualified_staging: "[#temp_taverns]".into(),
            staging_scope: StagingScope::Connection,
            columns: vec![
                column("Id", 0, true, true, SqlNullType::I64),
                column("Key", 1, true, false, SqlNullType::Uuid),
                column("Name", 2, false, false, SqlNullType::String),
            ],
            primary_key: vec!["Id".into(), "Key".into()],
            identity_fields: vec!["Id".into()],
        }
    }

    #[test]
    fn test_default_keys_become_null() {
        let desc = descriptor();
        let cols = transfer_columns(&desc, StreamTarget::Staging);
        let record = Tavern {
            id: 0,
            key: Uuid::nil(),
            name: Some("a".into()),
        };

        let row = build_row(&record, 0, &desc, &cols).unwrap();
        assert_eq!(
            row,
            vec![
                SqlValue::Null(SqlNullType::I64),
                SqlValue::Null(SqlNullType::Uuid),
                SqlValue::text_owned("a".into()),
            ]
        );
    }

    #[test]
    fn test_real_keys_kept_verbatim() {
        let desc = descriptor();
        let cols = transfer_columns(&desc, StreamTarget::Staging);
        let key = Uuid::new_v4();
        let record = Tavern {
            id: 5,
            key,
            name: None,
        };

        let row = build_row(&record, 0, &desc, &cols).unwrap();
        assert_eq!(row[0], SqlValue::I64(5));
        assert_eq!(row[1], SqlValue::Uuid(key));
        assert_eq!(row[2], SqlValue::Null(SqlNullType::String));
    }

    #[test]
    fn test_direct_insert_skips_identity() {
        let desc = descriptor();
        let request = copy_request(&desc, StreamTarget::Target { keep_identity: false });
        assert_eq!(request.table, "[dbo].[taverns]");
        assert_eq!(request.columns, vec!["key", "name"]);
        assert_eq!(request.destination, CopyDestination::Target);

        let request = copy_request(&desc, StreamTarget::Target { keep_identity: true });
        assert_eq!(request.columns, vec!["id", "key", "name"]);
    }

    #[test]
    fn test_staging_request_includes_every_column() {
        let desc = descriptor();
        let request = copy_request(&desc, StreamTarget::Staging);
        assert_eq!(request.table, "[#temp_taverns]");
        assert_eq!(request.columns, vec!["id", "key", "name"]);
        assert_eq!(request.destination, CopyDestination::Staging);
    }

    #[test]
    fn test_heterogeneous_record_rejected() {
        let desc = descriptor();
        let cols = transfer_columns(&desc, StreamTarget::Staging);
        let err = build_row(&Short, 7, &desc, &cols).unwrap_err();
        assert!(matches!(err, BulkError::BulkTransfer { .. }));
        assert!(err.to_string().contains("record 7 has 1 values, expected 3"));
    }
}
