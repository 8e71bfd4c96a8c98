//! Resolved table layout for one bulk operation.
//!
//! A [`TableDescriptor`] is produced by the resolver at the start of every
//! public call and owned by that call. It is never cached: the record type,
//! connection and transaction can all differ between calls.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{BulkError, Result};

use super::value::{SqlNullType, SqlValue};

/// How a primary-key field signals "no key assigned yet".
///
/// Resolved once per key field from its declared type, so the streamer and the
/// merge builder agree on the same sentinel without inspecting type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KeyKind {
    /// Integer, floating or decimal keys; zero is the default.
    Numeric,
    /// GUID/UUID keys; the nil UUID is the default.
    Uuid,
    /// String keys; the empty string is the default.
    Text,
    /// Any other type. Only NULL counts as absent.
    Other,
}

impl KeyKind {
    /// Classify a declared field type.
    pub fn from_type(ty: SqlNullType) -> Self {
        match ty {
            SqlNullType::I16
            | SqlNullType::I32
            | SqlNullType::I64
            | SqlNullType::F32
            | SqlNullType::F64
            | SqlNullType::Decimal => KeyKind::Numeric,
            SqlNullType::Uuid => KeyKind::Uuid,
            SqlNullType::String => KeyKind::Text,
            _ => KeyKind::Other,
        }
    }

    /// True if `value` is NULL or this kind's default placeholder.
    pub fn is_absent(self, value: &SqlValue<'_>) -> bool {
        match (self, value) {
            (_, SqlValue::Null(_)) => true,
            (KeyKind::Numeric, SqlValue::I16(v)) => *v == 0,
            (KeyKind::Numeric, SqlValue::I32(v)) => *v == 0,
            (KeyKind::Numeric, SqlValue::I64(v)) => *v == 0,
            (KeyKind::Numeric, SqlValue::F32(v)) => *v == 0.0,
            (KeyKind::Numeric, SqlValue::F64(v)) => *v == 0.0,
            (KeyKind::Numeric, SqlValue::Decimal(v)) => *v == Decimal::ZERO,
            (KeyKind::Uuid, SqlValue::Uuid(v)) => v.is_nil(),
            (KeyKind::Text, SqlValue::Text(v)) => v.is_empty(),
            _ => false,
        }
    }
}

/// One mapped scalar field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMapping {
    /// Logical field name on the record.
    pub field: String,
    /// Physical column name (unquoted).
    pub column: String,
    /// Declared field type.
    #[serde(skip)]
    pub value_type: SqlNullType,
    /// Position of this field's value in `Record::values()`.
    pub value_index: usize,
    /// Part of the primary key.
    pub is_primary_key: bool,
    /// Server-generated (identity/serial).
    pub is_identity: bool,
    /// Default-detection rule; meaningful for key columns.
    pub key_kind: KeyKind,
}

/// Whether the staging table disappears with the connection or must be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StagingScope {
    /// `#temp` tables: dropped by the server when the connection closes.
    Connection,
    /// Named temp tables that the engine drops explicitly.
    Named,
}

/// Physical schema of the target table for one record type.
#[derive(Debug, Clone, Serialize)]
pub struct TableDescriptor {
    /// Rust type name of the record, for diagnostics.
    pub record: String,

    /// Schema name.
    pub schema: String,

    /// Table name.
    pub table: String,

    /// Dialect-quoted `schema.table`.
    pub qualified_name: String,

    /// Unquoted staging table name (e.g. `temp_users`, `#temp_users`).
    pub staging_table: String,

    /// Dialect-quoted staging table reference.
    pub qualified_staging: String,

    /// Staging lifetime for this dialect.
    pub staging_scope: StagingScope,

    /// Scalar columns in declaration order.
    pub columns: Vec<ColumnMapping>,

    /// Primary-key field names in declared order.
    pub primary_key: Vec<String>,

    /// Server-generated field names.
    pub identity_fields: Vec<String>,
}

impl TableDescriptor {
    /// Mapping for a logical field.
    pub fn column(&self, field: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// Key columns, in primary-key order.
    pub fn key_columns(&self) -> Vec<&ColumnMapping> {
        self.primary_key
            .iter()
            .filter_map(|f| self.column(f))
            .collect()
    }

    /// Columns that an update may assign: neither key nor identity.
    pub fn assignable_columns(&self) -> Vec<&ColumnMapping> {
        self.columns
            .iter()
            .filter(|c| !c.is_primary_key && !c.is_identity)
            .collect()
    }

    /// Columns written by a plain insert.
    ///
    /// Identity columns are left to the server unless `keep_identity` is set.
    pub fn insert_columns(&self, keep_identity: bool) -> Vec<&ColumnMapping> {
        self.columns
            .iter()
            .filter(|c| keep_identity || !c.is_identity)
            .collect()
    }

    /// Columns written when a row arrives with its key: every key column
    /// (identity or not) plus the non-identity rest.
    pub fn keyed_insert_columns(&self) -> Vec<&ColumnMapping> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key || !c.is_identity)
            .collect()
    }

    /// Identity columns, in declaration order.
    pub fn identity_columns(&self) -> Vec<&ColumnMapping> {
        self.columns.iter().filter(|c| c.is_identity).collect()
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    pub fn has_identity(&self) -> bool {
        !self.identity_fields.is_empty()
    }

    /// Fail unless the table has a primary key (required by update and upsert).
    pub fn require_primary_key(&self) -> Result<()> {
        if self.has_primary_key() {
            Ok(())
        } else {
            Err(BulkError::schema(
                &self.record,
                format!(
                    "table {} has no primary key; update and upsert require one",
                    self.qualified_name
                ),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use uuid::Uuid;

    fn mapping(field: &str, pk: bool, identity: bool, ty: SqlNullType) -> ColumnMapping {
        ColumnMapping {
            field: field.to_string(),
            column: field.to_lowercase(),
            value_type: ty,
            value_index: 0,
            is_primary_key: pk,
            is_identity: identity,
            key_kind: KeyKind::from_type(ty),
        }
    }

    fn descriptor(primary_key: Vec<&str>) -> TableDescriptor {
        TableDescriptor {
            record: "Tavern".into(),
            schema: "public".into(),
            table: "taverns".into(),
            qualified_name: "\"public\".\"taverns\"".into(),
            staging_table: "temp_taverns".into(),
            qualified_staging: "\"temp_taverns\"".into(),
            staging_scope: StagingScope::Named,
            columns: vec![
                mapping("Id", true, true, SqlNullType::I64),
                mapping("Name", false, false, SqlNullType::String),
                mapping("Rating", false, false, SqlNullType::I32),
            ],
            primary_key: primary_key.into_iter().map(String::from).collect(),
            identity_fields: vec!["Id".into()],
        }
    }

    // =========================================================================
    // KeyKind tests
    // =========================================================================

    #[test]
    fn test_key_kind_from_type() {
        assert_eq!(KeyKind::from_type(SqlNullType::I32), KeyKind::Numeric);
        assert_eq!(KeyKind::from_type(SqlNullType::Decimal), KeyKind::Numeric);
        assert_eq!(KeyKind::from_type(SqlNullType::Uuid), KeyKind::Uuid);
        assert_eq!(KeyKind::from_type(SqlNullType::String), KeyKind::Text);
        assert_eq!(KeyKind::from_type(SqlNullType::DateTime), KeyKind::Other);
    }

    #[test]
    fn test_numeric_default_detection() {
        assert!(KeyKind::Numeric.is_absent(&SqlValue::I64(0)));
        assert!(KeyKind::Numeric.is_absent(&SqlValue::I16(0)));
        assert!(KeyKind::Numeric.is_absent(&SqlValue::Decimal(Decimal::ZERO)));
        assert!(!KeyKind::Numeric.is_absent(&SqlValue::I32(5)));
        assert!(!KeyKind::Numeric.is_absent(&SqlValue::I64(-1)));
    }

    #[test]
    fn test_uuid_default_detection() {
        assert!(KeyKind::Uuid.is_absent(&SqlValue::Uuid(Uuid::nil())));
        assert!(!KeyKind::Uuid.is_absent(&SqlValue::Uuid(Uuid::new_v4())));
    }

    #[test]
    fn test_text_default_detection() {
        assert!(KeyKind::Text.is_absent(&SqlValue::Text(Cow::Borrowed(""))));
        assert!(!KeyKind::Text.is_absent(&SqlValue::Text(Cow::Borrowed("k1"))));
    }

    #[test]
    fn test_null_is_always_absent() {
        for kind in [KeyKind::Numeric, KeyKind::Uuid, KeyKind::Text, KeyKind::Other] {
            assert!(kind.is_absent(&SqlValue::Null(SqlNullType::I32)));
        }
        assert!(!KeyKind::Other.is_absent(&SqlValue::Bool(false)));
    }

    #[test]
    fn test_kind_mismatch_is_present() {
        // A text key never treats numeric zero as its placeholder
        assert!(!KeyKind::Text.is_absent(&SqlValue::I32(0)));
    }

    // =========================================================================
    // TableDescriptor tests
    // =========================================================================

    #[test]
    fn test_column_partitions() {
        let desc = descriptor(vec!["Id"]);

        let keys: Vec<_> = desc.key_columns().iter().map(|c| c.column.as_str()).collect();
        assert_eq!(keys, vec!["id"]);

        let assignable: Vec<_> = desc
            .assignable_columns()
            .iter()
            .map(|c| c.column.as_str())
            .collect();
        assert_eq!(assignable, vec!["name", "rating"]);

        assert_eq!(desc.insert_columns(false).len(), 2);
        assert_eq!(desc.insert_columns(true).len(), 3);
        assert_eq!(desc.identity_columns().len(), 1);
    }

    #[test]
    fn test_require_primary_key() {
        assert!(descriptor(vec!["Id"]).require_primary_key().is_ok());

        let err = descriptor(vec![]).require_primary_key().unwrap_err();
        assert!(matches!(err, BulkError::SchemaResolution { .. }));
        assert!(err.to_string().contains("no primary key"));
    }
}
