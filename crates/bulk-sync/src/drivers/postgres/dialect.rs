//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! Staging happens in a named `TEMP` table cloned with `CREATE TABLE AS ...
//! WITH NO DATA`, which copies column types but none of the constraints,
//! defaults or identity behaviour. Upserts use `INSERT ... ON CONFLICT`.

use crate::core::identifier::{quote_literal, quote_pg};
use crate::core::schema::{KeyKind, StagingScope, TableDescriptor};
use crate::core::traits::{Dialect, MergeQueryPair};

/// Prefix for staging table names.
const STAGING_PREFIX: &str = "temp_";

/// PostgreSQL dialect implementation.
///
/// Implements the Strategy pattern for SQL syntax differences.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    fn overriding(&self, columns: &[&crate::core::schema::ColumnMapping]) -> &'static str {
        if columns.iter().any(|c| c.is_identity) {
            " OVERRIDING SYSTEM VALUE"
        } else {
            ""
        }
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_pg(name)
    }

    fn default_schema(&self) -> &str {
        "public"
    }

    fn staging_table_name(&self, table: &str) -> String {
        format!("{}{}", STAGING_PREFIX, table)
    }

    fn staging_scope(&self) -> StagingScope {
        StagingScope::Named
    }

    fn default_key_literal(&self, kind: KeyKind) -> Option<String> {
        match kind {
            KeyKind::Numeric => Some("0".to_string()),
            KeyKind::Text => Some("''".to_string()),
            KeyKind::Uuid => Some("'00000000-0000-0000-0000-000000000000'::uuid".to_string()),
            KeyKind::Other => None,
        }
    }

    fn build_create_staging(&self, desc: &TableDescriptor) -> String {
        format!(
            "CREATE TEMP TABLE {} AS TABLE {} WITH NO DATA",
            desc.qualified_staging, desc.qualified_name
        )
    }

    fn build_drop_staging(&self, desc: &TableDescriptor) -> String {
        format!("DROP TABLE IF EXISTS {}", desc.qualified_staging)
    }

    fn build_update(&self, desc: &TableDescriptor) -> Option<String> {
        let assignable = desc.assignable_columns();
        if assignable.is_empty() {
            return None;
        }

        let set_clause = assignable
            .iter()
            .map(|c| {
                let col = self.quote_ident(&c.column);
                format!("{} = temp.{}", col, col)
            })
            .collect::<Vec<_>>()
            .join(", ");

        Some(format!(
            "UPDATE {} AS target SET {} FROM {} AS temp WHERE {} AND {}",
            desc.qualified_name,
            set_clause,
            desc.qualified_staging,
            self.key_join(desc, "target", "temp"),
            self.keys_not_null(desc, "temp")
        ))
    }

    fn build_split_merge(&self, desc: &TableDescriptor) -> MergeQueryPair {
        let keyed = desc.keyed_insert_columns();
        let conflict_cols = self.column_list(&desc.key_columns(), None);

        let assignable = desc.assignable_columns();
        let on_conflict = if assignable.is_empty() {
            "DO NOTHING".to_string()
        } else {
            let set_clause = assignable
                .iter()
                .map(|c| {
                    let col = self.quote_ident(&c.column);
                    format!("{} = EXCLUDED.{}", col, col)
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("DO UPDATE SET {}", set_clause)
        };

        let upsert = format!(
            "INSERT INTO {} ({}){} SELECT {} FROM {} AS temp WHERE {} ON CONFLICT ({}) {}",
            desc.qualified_name,
            self.column_list(&keyed, None),
            self.overriding(&keyed),
            self.column_list(&keyed, Some("temp")),
            desc.qualified_staging,
            self.keys_present(desc, "temp"),
            conflict_cols,
            on_conflict
        );

        let fresh = desc.insert_columns(false);
        let insert = format!(
            "INSERT INTO {} ({}) SELECT {} FROM {} AS temp WHERE {}",
            desc.qualified_name,
            self.column_list(&fresh, None),
            self.column_list(&fresh, Some("temp")),
            desc.qualified_staging,
            self.keys_absent(desc, "temp")
        );

        MergeQueryPair { upsert, insert }
    }

    fn build_insert_from_staging(&self, desc: &TableDescriptor, keep_identity: bool) -> String {
        let columns = desc.insert_columns(keep_identity);
        format!(
            "INSERT INTO {} ({}){} SELECT {} FROM {} AS temp",
            desc.qualified_name,
            self.column_list(&columns, None),
            self.overriding(&columns),
            self.column_list(&columns, Some("temp")),
            desc.qualified_staging
        )
    }

    fn build_identity_resync(&self, desc: &TableDescriptor) -> Vec<String> {
        desc.identity_columns()
            .iter()
            .map(|c| {
                // Never below the last value drawn: other sessions may hold
                // uncommitted ids that MAX cannot see
                format!(
                    "SELECT setval(seq.name::regclass, GREATEST(\
                     COALESCE((SELECT MAX({}) FROM {}), 0), \
                     COALESCE(pg_sequence_last_value(seq.name::regclass), 0)) + 1, false) \
                     FROM (SELECT pg_get_serial_sequence({}, {}) AS name) AS seq \
                     WHERE seq.name IS NOT NULL",
                    self.quote_ident(&c.column),
                    desc.qualified_name,
                    quote_literal(&desc.qualified_name),
                    quote_literal(&c.column)
                )
            })
            .collect()
    }
}
