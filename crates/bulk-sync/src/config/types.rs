//! Configuration type definitions.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::options::{BulkOptions, DEFAULT_BATCH_SIZE};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database the engine writes to.
    pub target: TargetConfig,

    /// Default options for bulk operations.
    #[serde(default)]
    pub bulk: BulkSettings,
}

/// Target database configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type: "postgres" or "mssql".
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432 for postgres, 1433 for mssql).
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema for models that don't name one (default: the dialect's).
    #[serde(default)]
    pub schema: Option<String>,

    /// SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,

    /// Trust the server certificate without validation (SQL Server only).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// TCP connect timeout in seconds (default: 30).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl TargetConfig {
    /// Port, falling back to the engine's well-known port.
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.r#type.as_str()) {
            (Some(port), _) => port,
            (None, "mssql") => 1433,
            (None, _) => 5432,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.effective_port())
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Default options for bulk operations, overridable per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSettings {
    /// Preserve explicit identity values on insert (default: false).
    #[serde(default)]
    pub keep_identity: bool,

    /// Rows per transfer chunk (default: 10000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Per-statement timeout in seconds (default: none).
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Progress log interval in rows (default: batch_size).
    #[serde(default)]
    pub notify_after: Option<usize>,
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self {
            keep_identity: false,
            batch_size: default_batch_size(),
            timeout_secs: None,
            notify_after: None,
        }
    }
}

impl BulkSettings {
    /// Options for one call, with a fresh cancellation token.
    pub fn to_options(&self) -> BulkOptions {
        let mut options = BulkOptions::new()
            .keep_identity(self.keep_identity)
            .batch_size(self.batch_size);
        if let Some(secs) = self.timeout_secs {
            options = options.timeout(Duration::from_secs(secs));
        }
        if let Some(rows) = self.notify_after {
            options = options.notify_after(rows);
        }
        options
    }
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_require() -> String {
    "require".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
