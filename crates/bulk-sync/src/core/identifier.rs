//! Identifier validation and quoting for generated SQL.
//!
//! Table, schema and column names come from entity metadata and end up spliced
//! into staging, COPY and merge statements. They cannot be bound as parameters,
//! so every name is validated once by the resolver and escaped by the dialect
//! that emits it.

use crate::error::{BulkError, Result};

/// Maximum identifier length (SQL Server's limit; PostgreSQL truncates at 63).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
///
/// # Errors
///
/// Returns `BulkError::Config` for invalid identifiers with a descriptive message.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BulkError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(BulkError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(BulkError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier, doubling embedded double quotes.
pub fn quote_pg(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL Server identifier, doubling closing brackets.
pub fn quote_mssql(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Render a string literal, doubling embedded single quotes.
///
/// Used where a catalog function takes a name as text, e.g.
/// `pg_get_serial_sequence('"public"."users"', 'id')`.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
