//! MSSQL SQL dialect (Strategy pattern).
//!
//! Staging happens in a connection-scoped `#temp` table. It is created with
//! `SELECT TOP 0 ... INTO` through an outer join, so every column comes out
//! nullable and without the IDENTITY property. Upserts use `MERGE`.

use crate::core::identifier::quote_mssql;
use crate::core::schema::{KeyKind, StagingScope, TableDescriptor};
use crate::core::traits::{Dialect, InsertStrategy, MergeQueryPair};

/// Prefix for staging table names; `#` makes them session-local.
const STAGING_PREFIX: &str = "#temp_";

/// Microsoft SQL Server dialect implementation.
///
/// Implements the Strategy pattern for SQL syntax differences.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MSSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    /// Wrap `body` in `SET IDENTITY_INSERT ... ON/OFF` when `enabled`.
    fn with_identity_insert(&self, desc: &TableDescriptor, enabled: bool, body: String) -> String {
        if enabled {
            format!(
                "SET IDENTITY_INSERT {table} ON; {body} SET IDENTITY_INSERT {table} OFF;",
                table = desc.qualified_name,
                body = body
            )
        } else {
            body
        }
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_mssql(name)
    }

    fn default_schema(&self) -> &str {
        "dbo"
    }

    fn staging_table_name(&self, table: &str) -> String {
        format!("{}{}", STAGING_PREFIX, table)
    }

    fn staging_scope(&self) -> StagingScope {
        StagingScope::Connection
    }

    fn default_key_literal(&self, kind: KeyKind) -> Option<String> {
        match kind {
            KeyKind::Numeric => Some("0".to_string()),
            KeyKind::Text => Some("''".to_string()),
            KeyKind::Uuid => Some(
                "CAST('00000000-0000-0000-0000-000000000000' AS UNIQUEIDENTIFIER)".to_string(),
            ),
            KeyKind::Other => None,
        }
    }

    /// The TDS bulk channel never carries identity values, so inserts that
    /// keep identity go through staging and `IDENTITY_INSERT`.
    fn insert_strategy(&self, desc: &TableDescriptor, keep_identity: bool) -> InsertStrategy {
        if keep_identity && desc.has_identity() {
            InsertStrategy::ViaStaging
        } else {
            InsertStrategy::Direct
        }
    }

    fn build_create_staging(&self, desc: &TableDescriptor) -> String {
        let all: Vec<_> = desc.columns.iter().collect();
        format!(
            "SELECT TOP 0 {} INTO {} FROM (SELECT 1 AS [seed]) AS [seed] \
             LEFT JOIN {} AS target ON 1 = 0",
            self.column_list(&all, Some("target")),
            desc.qualified_staging,
            desc.qualified_name
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
                format!("target.{} = temp.{}", col, col)
            })
            .collect::<Vec<_>>()
            .join(", ");

        Some(format!(
            "UPDATE target SET {} FROM {} AS target INNER JOIN {} AS temp ON {} WHERE {}",
            set_clause,
            desc.qualified_name,
            desc.qualified_staging,
            self.key_join(desc, "target", "temp"),
            self.keys_not_null(desc, "temp")
        ))
    }

    fn build_split_merge(&self, desc: &TableDescriptor) -> MergeQueryPair {
        let keyed = desc.keyed_insert_columns();
        let writes_identity = keyed.iter().any(|c| c.is_identity);

        let assignable = desc.assignable_columns();
        let when_matched = if assignable.is_empty() {
            String::new()
        } else {
            let set_clause = assignable
                .iter()
                .map(|c| {
                    let col = self.quote_ident(&c.column);
                    format!("target.{} = temp.{}", col, col)
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!(" WHEN MATCHED THEN UPDATE SET {}", set_clause)
        };

        let merge = format!(
            "MERGE INTO {} WITH (HOLDLOCK) AS target \
             USING (SELECT {} FROM {} AS staged WHERE {}) AS temp ON {}{} \
             WHEN NOT MATCHED BY TARGET THEN INSERT ({}) VALUES ({});",
            desc.qualified_name,
            self.column_list(&keyed, Some("staged")),
            desc.qualified_staging,
            self.keys_present(desc, "staged"),
            self.key_join(desc, "target", "temp"),
            when_matched,
            self.column_list(&keyed, None),
            self.column_list(&keyed, Some("temp"))
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

        MergeQueryPair {
            upsert: self.with_identity_insert(desc, writes_identity, merge),
            insert,
        }
    }

    fn build_insert_from_staging(&self, desc: &TableDescriptor, keep_identity: bool) -> String {
        let columns = desc.insert_columns(keep_identity);
        let insert = format!(
            "INSERT INTO {} ({}) SELECT {} FROM {} AS temp;",
            desc.qualified_name,
            self.column_list(&columns, None),
            self.column_list(&columns, Some("temp")),
            desc.qualified_staging
        );
        self.with_identity_insert(desc, keep_identity && desc.has_identity(), insert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{descriptor, Ledger, Tag, Tavern};

    #[test]
    fn test_quote_ident() {
        let dialect = MssqlDialect::new();
        assert_eq!(dialect.quote_ident("name"), "[name]");
        assert_eq!(dialect.quote_ident("table]name"), "[table]]name]");
        assert_eq!(dialect.qualify("dbo", "Users"), "[dbo].[Users]");
    }

    #[test]
    fn test_staging_ddl() {
        let dialect = MssqlDialect::new();
        let desc = descriptor::<Tavern, _>(&dialect);

        assert_eq!(
            dialect.build_create_staging(&desc),
            "SELECT TOP 0 target.[id], target.[tavern_name], target.[rating] \
             INTO [#temp_taverns] FROM (SELECT 1 AS [seed]) AS [seed] \
             LEFT JOIN [dbo].[taverns] AS target ON 1 = 0"
        );
        assert_eq!(
            dialect.build_drop_staging(&desc),
            "DROP TABLE IF EXISTS [#temp_taverns]"
        );
    }

    #[test]
    fn test_build_update() {
        let dialect = MssqlDialect::new();
        let desc = descriptor::<Tavern, _>(&dialect);

        assert_eq!(
            dialect.build_update(&desc).unwrap(),
            "UPDATE target SET target.[tavern_name] = temp.[tavern_name], \
             target.[rating] = temp.[rating] \
             FROM [dbo].[taverns] AS target INNER JOIN [#temp_taverns] AS temp \
             ON target.[id] = temp.[id] WHERE temp.[id] IS NOT NULL"
        );
        assert!(dialect.build_update(&descriptor::<Tag, _>(&dialect)).is_none());
    }

    #[test]
    fn test_split_merge_identity_key() {
        let dialect = MssqlDialect::new();
        let desc = descriptor::<Tavern, _>(&dialect);
        let pair = dialect.build_split_merge(&desc);

        assert_eq!(
            pair.upsert,
            "SET IDENTITY_INSERT [dbo].[taverns] ON; \
             MERGE INTO [dbo].[taverns] WITH (HOLDLOCK) AS target \
             USING (SELECT staged.[id], staged.[tavern_name], staged.[rating] \
             FROM [#temp_taverns] AS staged \
             WHERE (staged.[id] IS NOT NULL AND staged.[id] <> 0)) AS temp \
             ON target.[id] = temp.[id] \
             WHEN MATCHED THEN UPDATE SET target.[tavern_name] = temp.[tavern_name], \
             target.[rating] = temp.[rating] \
             WHEN NOT MATCHED BY TARGET THEN INSERT ([id], [tavern_name], [rating]) \
             VALUES (temp.[id], temp.[tavern_name], temp.[rating]); \
             SET IDENTITY_INSERT [dbo].[taverns] OFF;"
        );
        assert_eq!(
            pair.insert,
            "INSERT INTO [dbo].[taverns] ([tavern_name], [rating]) \
             SELECT temp.[tavern_name], temp.[rating] FROM [#temp_taverns] AS temp \
             WHERE temp.[id] IS NULL OR temp.[id] = 0"
        );
    }

    #[test]
    fn test_split_merge_composite_natural_key() {
        let dialect = MssqlDialect::new();
        let desc = descriptor::<Ledger, _>(&dialect);
        let pair = dialect.build_split_merge(&desc);

        assert!(!pair.upsert.contains("IDENTITY_INSERT"));
        assert!(pair.upsert.contains(
            "ON target.[Region] = temp.[Region] AND target.[Entry] = temp.[Entry]"
        ));
        assert!(pair.upsert.contains(
            "(staged.[Entry] IS NOT NULL AND staged.[Entry] <> \
             CAST('00000000-0000-0000-0000-000000000000' AS UNIQUEIDENTIFIER))"
        ));
        assert!(pair.insert.contains("temp.[Region] IS NULL OR temp.[Region] = ''"));
    }

    #[test]
    fn test_split_merge_key_only_table_skips_matched_branch() {
        let dialect = MssqlDialect::new();
        let desc = descriptor::<Tag, _>(&dialect);
        let pair = dialect.build_split_merge(&desc);
        assert!(!pair.upsert.contains("WHEN MATCHED"));
        assert!(pair
            .upsert
            .ends_with("WHEN NOT MATCHED BY TARGET THEN INSERT ([Name]) VALUES (temp.[Name]);"));
    }

    #[test]
    fn test_insert_strategy() {
        let dialect = MssqlDialect::new();
        let tavern = descriptor::<Tavern, _>(&dialect);
        let ledger = descriptor::<Ledger, _>(&dialect);

        assert_eq!(dialect.insert_strategy(&tavern, false), InsertStrategy::Direct);
        assert_eq!(dialect.insert_strategy(&tavern, true), InsertStrategy::ViaStaging);
        // No identity column: nothing to preserve
        assert_eq!(dialect.insert_strategy(&ledger, true), InsertStrategy::Direct);
    }

    #[test]
    fn test_insert_from_staging() {
        let dialect = MssqlDialect::new();
        let desc = descriptor::<Tavern, _>(&dialect);

        assert_eq!(
            dialect.build_insert_from_staging(&desc, true),
            "SET IDENTITY_INSERT [dbo].[taverns] ON; \
             INSERT INTO [dbo].[taverns] ([id], [tavern_name], [rating]) \
             SELECT temp.[id], temp.[tavern_name], temp.[rating] FROM [#temp_taverns] AS temp; \
             SET IDENTITY_INSERT [dbo].[taverns] OFF;"
        );
        assert_eq!(
            dialect.build_insert_from_staging(&desc, false),
            "INSERT INTO [dbo].[taverns] ([tavern_name], [rating]) \
             SELECT temp.[tavern_name], temp.[rating] FROM [#temp_taverns] AS temp;"
        );
    }

    #[test]
    fn test_no_identity_resync() {
        let dialect = MssqlDialect::new();
        let desc = descriptor::<Tavern, _>(&dialect);
        assert!(dialect.build_identity_resync(&desc).is_empty());
    }
}
