//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::drivers::SslMode;
use crate::error::{BulkError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let target = &config.target;

    if target.host.is_empty() {
        return Err(BulkError::Config("target.host is required".into()));
    }
    if target.database.is_empty() {
        return Err(BulkError::Config("target.database is required".into()));
    }
    if target.user.is_empty() {
        return Err(BulkError::Config("target.user is required".into()));
    }
    if !matches!(target.r#type.as_str(), "postgres" | "mssql") {
        return Err(BulkError::Config(format!(
            "target.type must be 'postgres' or 'mssql', got '{}'",
            target.r#type
        )));
    }
    if target.port == Some(0) {
        return Err(BulkError::Config("target.port must be non-zero".into()));
    }
    SslMode::parse(&target.ssl_mode)?;
    if let Some(schema) = &target.schema {
        validate_identifier(schema)
            .map_err(|e| BulkError::Config(format!("target.schema: {}", e)))?;
    }

    if config.bulk.batch_size == 0 {
        return Err(BulkError::Config("bulk.batch_size must be at least 1".into()));
    }
    if let Some(0) = config.bulk.timeout_secs {
        return Err(BulkError::Config("bulk.timeout_secs must be at least 1".into()));
    }

    Ok(())
}
