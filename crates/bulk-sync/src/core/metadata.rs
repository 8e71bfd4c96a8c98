//! Entity metadata supplied by the surrounding data-access layer.
//!
//! The engine only needs a thin slice of what an ORM knows about a type:
//! table and schema, explicit column names, the ordered primary key and which
//! fields the server generates. [`MetadataProvider`] is that slice;
//! [`ModelRegistry`] is an in-memory implementation for callers without an ORM.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use tracing::debug;

/// Table mapping for one record type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityModel {
    /// Physical table name.
    pub table: String,
    /// Schema; `None` defers to the engine or dialect default.
    pub schema: Option<String>,
    /// Explicit field -> column overrides. Unlisted fields map to their own name.
    pub columns: HashMap<String, String>,
    /// Primary-key fields in declared order.
    pub primary_key: Vec<String>,
    /// Fields whose values the server assigns (identity/serial).
    pub generated: HashSet<String>,
}

impl EntityModel {
    /// Start a model for `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Place the table in an explicit schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Map `field` to a differently named column.
    pub fn column(mut self, field: impl Into<String>, column: impl Into<String>) -> Self {
        self.columns.insert(field.into(), column.into());
        self
    }

    /// Append `field` to the primary key.
    pub fn key(mut self, field: impl Into<String>) -> Self {
        self.primary_key.push(field.into());
        self
    }

    /// Mark `field` as server-generated.
    pub fn generated(mut self, field: impl Into<String>) -> Self {
        self.generated.insert(field.into());
        self
    }

    /// Shorthand for a single server-generated primary key.
    pub fn identity_key(self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.key(field.clone()).generated(field)
    }
}

/// Metadata lookup by record type.
pub trait MetadataProvider: Send + Sync {
    /// Model for the record type, or `None` if the type is not mapped.
    fn entity(&self, record: TypeId) -> Option<EntityModel>;
}

/// In-memory [`MetadataProvider`] keyed by `TypeId`.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<TypeId, EntityModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the model for `R`.
    pub fn register<R: 'static>(&self, model: EntityModel) -> &Self {
        debug!(
            "Registered {} -> {}",
            std::any::type_name::<R>(),
            model.table
        );
        // Models are replaced whole, so a poisoned map is still consistent
        self.models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<R>(), model);
        self
    }

    /// Builder-style registration.
    pub fn with<R: 'static>(self, model: EntityModel) -> Self {
        self.register::<R>(model);
        self
    }

    pub fn len(&self) -> usize {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataProvider for ModelRegistry {
    fn entity(&self, record: TypeId) -> Option<EntityModel> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&record)
            .cloned()
    }
}
