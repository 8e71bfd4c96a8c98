//! # bulk-sync
//!
//! Dialect-aware bulk insert, update and upsert for PostgreSQL and SQL Server.
//!
//! Records are loaded through each engine's native bulk channel (binary
//! `COPY` on PostgreSQL, TDS `INSERT BULK` on SQL Server), staged in a
//! temporary table when the operation needs one, and reconciled with the
//! target table by generated merge SQL:
//!
//! - **Bulk insert** streams straight into the target table
//! - **Bulk update** overwrites existing rows matched by primary key
//! - **Bulk insert-or-update** updates keyed records and inserts the ones
//!   whose key is null or its type's default (`0`, `''`, nil UUID)
//!
//! Each call runs in one transaction on its own connection and either
//! commits completely or rolls back.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use bulk_sync::{
//!     BulkEngine, Config, EntityModel, FieldDef, ModelRegistry, Record, SqlNullType, SqlValue,
//! };
//!
//! struct Order {
//!     id: i64,
//!     customer: String,
//! }
//!
//! impl Record for Order {
//!     fn fields() -> Vec<FieldDef> {
//!         vec![
//!             FieldDef::scalar("Id", SqlNullType::I64),
//!             FieldDef::scalar("Customer", SqlNullType::String),
//!         ]
//!     }
//!
//!     fn values(&self) -> Vec<SqlValue<'_>> {
//!         vec![SqlValue::I64(self.id), SqlValue::text_borrowed(&self.customer)]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> bulk_sync::Result<()> {
//!     let config = Config::load("bulk-sync.yaml")?;
//!     let registry = ModelRegistry::new().with::<Order>(
//!         EntityModel::new("orders")
//!             .column("Id", "id")
//!             .column("Customer", "customer")
//!             .identity_key("Id"),
//!     );
//!
//!     let engine = BulkEngine::from_config(&config, Arc::new(registry))?;
//!     let orders = vec![Order { id: 0, customer: "Ada".into() }];
//!     let report = engine
//!         .bulk_insert_or_update(&orders, &config.bulk.to_options())
//!         .await?;
//!     println!("{} rows affected", report.rows_affected());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod merge;
pub mod options;
pub mod orchestrator;
pub mod resolver;
pub mod staging;
pub mod streamer;

#[cfg(test)]
mod test_support;

// Re-exports for convenient access
pub use crate::config::{BulkSettings, Config, TargetConfig};
pub use crate::core::{
    Backend, Dialect, EntityModel, FieldDef, MetadataProvider, ModelRegistry, Record, Session,
    SqlNullType, SqlValue, TableDescriptor,
};
pub use crate::drivers::{BackendImpl, MssqlBackend, PostgresBackend};
pub use crate::error::{BulkError, Result};
pub use crate::options::BulkOptions;
pub use crate::orchestrator::{BulkEngine, BulkReport, Operation};
pub use tokio_util::sync::CancellationToken;
