//! Core abstractions for dialect-aware bulk synchronization.
//!
//! This module provides the foundational types and traits used throughout
//! the engine:
//!
//! - [`value`]: SQL value representation read from records
//! - [`record`]: Registration-time field layout of a record type
//! - [`metadata`]: Entity metadata lookup (table, columns, keys, identity)
//! - [`schema`]: The resolved [`TableDescriptor`] for one operation
//! - [`traits`]: Dialect, backend and session seams
//! - [`identifier`]: Identifier validation and quoting
//!
//! # Architecture
//!
//! The core module defines engine-agnostic abstractions that are implemented
//! by driver modules (`drivers/mssql`, `drivers/postgres`). The orchestrator is
//! written against these traits only, which also lets it run against an
//! in-memory session in tests.

pub mod identifier;
pub mod metadata;
pub mod record;
pub mod schema;
pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use metadata::{EntityModel, MetadataProvider, ModelRegistry};
pub use record::{FieldDef, FieldKind, Record};
pub use schema::{ColumnMapping, KeyKind, StagingScope, TableDescriptor};
pub use traits::{
    Backend, CopyDestination, CopyRequest, Dialect, InsertStrategy, MergeQueryPair, Session,
};
pub use value::{Row, SqlNullType, SqlValue};
