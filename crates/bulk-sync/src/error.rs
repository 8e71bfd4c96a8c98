//! Error types for bulk synchronization operations.

use std::time::Duration;

use thiserror::Error;

/// Main error type for bulk operations.
#[derive(Error, Debug)]
pub enum BulkError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The record type could not be mapped to a table.
    #[error("Schema resolution failed for {record}: {reason}")]
    SchemaResolution { record: String, reason: String },

    /// Creating the staging table failed.
    #[error("Staging table {table} could not be prepared")]
    StagingTable {
        table: String,
        #[source]
        source: Box<BulkError>,
    },

    /// Streaming rows into a table failed.
    #[error("Bulk transfer into {table} failed: {message}")]
    BulkTransfer {
        table: String,
        message: String,
        #[source]
        source: Option<Box<BulkError>>,
    },

    /// A generated merge statement failed at the database.
    #[error("{statement} statement against {table} failed")]
    MergeExecution {
        table: String,
        statement: String,
        #[source]
        source: Box<BulkError>,
    },

    /// Bulk insert rolled back.
    #[error("Bulk insert of {record} failed")]
    InsertFailed {
        record: String,
        #[source]
        source: Box<BulkError>,
    },

    /// Bulk update rolled back.
    #[error("Bulk update of {record} failed")]
    UpdateFailed {
        record: String,
        #[source]
        source: Box<BulkError>,
    },

    /// Bulk insert-or-update rolled back.
    #[error("Bulk insert-or-update of {record} failed")]
    UpsertFailed {
        record: String,
        #[source]
        source: Box<BulkError>,
    },

    /// A database call did not finish within the configured timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// SQL Server driver error
    #[error("SQL Server error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// PostgreSQL driver error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// IO error (file operations, sockets)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The caller's cancellation token fired.
    #[error("Operation cancelled")]
    Cancelled,
}

impl BulkError {
    /// Create a SchemaResolution error
    pub fn schema(record: impl Into<String>, reason: impl Into<String>) -> Self {
        BulkError::SchemaResolution {
            record: record.into(),
            reason: reason.into(),
        }
    }

    /// Create a StagingTable error wrapping its cause
    pub fn staging(table: impl Into<String>, source: BulkError) -> Self {
        BulkError::StagingTable {
            table: table.into(),
            source: Box::new(source),
        }
    }

    /// Create a BulkTransfer error without an underlying cause
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        BulkError::BulkTransfer {
            table: table.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a BulkTransfer error wrapping a driver failure
    pub fn transfer_caused(
        table: impl Into<String>,
        message: impl Into<String>,
        source: BulkError,
    ) -> Self {
        BulkError::BulkTransfer {
            table: table.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a MergeExecution error
    pub fn merge(table: impl Into<String>, statement: impl Into<String>, source: BulkError) -> Self {
        BulkError::MergeExecution {
            table: table.into(),
            statement: statement.into(),
            source: Box::new(source),
        }
    }

    /// True when this error, or anything it wraps, is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), BulkError::Cancelled)
    }

    /// Innermost `BulkError` in the wrapping chain.
    pub fn root_cause(&self) -> &BulkError {
        let mut current = self;
        loop {
            let next = match current {
                BulkError::StagingTable { source, .. }
                | BulkError::MergeExecution { source, .. }
                | BulkError::InsertFailed { source, .. }
                | BulkError::UpdateFailed { source, .. }
                | BulkError::UpsertFailed { source, .. } => source.as_ref(),
                BulkError::BulkTransfer {
                    source: Some(source),
                    ..
                } => source.as_ref(),
                _ => return current,
            };
            current = next;
        }
    }

    /// Process exit code for command-line callers.
    pub fn exit_code(&self) -> u8 {
        match self.root_cause() {
            BulkError::Config(_) | BulkError::Yaml(_) | BulkError::Json(_) => 2,
            BulkError::Mssql(_) | BulkError::Postgres(_) | BulkError::Io(_) => 3,
            BulkError::Timeout { .. } => 4,
            BulkError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for bulk operations.
pub type Result<T> = std::result::Result<T, BulkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_walks_wrappers() {
        let err = BulkError::UpsertFailed {
            record: "Tavern".into(),
            source: Box::new(BulkError::merge(
                "\"public\".\"taverns\"",
                "upsert",
                BulkError::Cancelled,
            )),
        };
        assert!(matches!(err.root_cause(), BulkError::Cancelled));
        assert!(err.is_cancelled());
        assert_eq!(err.exit_code(), 130);
    }

    #[test]
    fn test_transfer_without_cause_is_its_own_root() {
        let err = BulkError::transfer("[dbo].[users]", "row 3 has 2 values, expected 4");
        assert!(matches!(err.root_cause(), BulkError::BulkTransfer { .. }));
        assert!(!err.is_cancelled());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let err = BulkError::InsertFailed {
            record: "UserEntity".into(),
            source: Box::new(BulkError::staging(
                "#temp_users",
                BulkError::Config("boom".into()),
            )),
        };
        let text = err.format_detailed();
        assert!(text.starts_with("Error: Bulk insert of UserEntity failed"));
        assert!(text.contains("1: Staging table #temp_users could not be prepared"));
        assert!(text.contains("2: Configuration error: boom"));
        assert_eq!(err.exit_code(), 2);
    }
}
