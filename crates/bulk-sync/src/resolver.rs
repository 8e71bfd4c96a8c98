//! Schema resolution: record type + entity metadata -> [`TableDescriptor`].

use std::any::{type_name, TypeId};
use std::collections::HashSet;

use tracing::debug;

use crate::core::identifier::validate_identifier;
use crate::core::metadata::MetadataProvider;
use crate::core::record::{FieldKind, Record};
use crate::core::schema::{ColumnMapping, KeyKind, TableDescriptor};
use crate::core::traits::Dialect;
use crate::error::{BulkError, Result};

/// Resolves record types against a metadata provider for one dialect.
pub struct SchemaResolver<'a, D: Dialect + ?Sized> {
    provider: &'a dyn MetadataProvider,
    dialect: &'a D,
    default_schema: Option<&'a str>,
}

impl<'a, D: Dialect + ?Sized> SchemaResolver<'a, D> {
    pub fn new(provider: &'a dyn MetadataProvider, dialect: &'a D) -> Self {
        Self {
            provider,
            dialect,
            default_schema: None,
        }
    }

    /// Schema for models that do not name one (before the dialect default).
    pub fn with_default_schema(mut self, schema: Option<&'a str>) -> Self {
        self.default_schema = schema;
        self
    }

    /// Build the descriptor for `R`.
    ///
    /// # Errors
    ///
    /// `BulkError::SchemaResolution` if `R` is not mapped or its metadata does
    /// not line up with the record's declared fields.
    pub fn resolve<R: Record + 'static>(&self) -> Result<TableDescriptor> {
        let record = type_name::<R>();
        let model = self
            .provider
            .entity(TypeId::of::<R>())
            .ok_or_else(|| BulkError::schema(record, "type is not mapped to a table"))?;

        let schema = model
            .schema
            .as_deref()
            .or(self.default_schema)
            .unwrap_or_else(|| self.dialect.default_schema())
            .to_string();

        check_identifier(record, &schema)?;
        check_identifier(record, &model.table)?;

        let fields = R::fields();
        let scalar_names: HashSet<&str> = fields
            .iter()
            .filter(|f| matches!(f.kind, FieldKind::Scalar(_)))
            .map(|f| f.name.as_str())
            .collect();

        for field in model.columns.keys() {
            if !scalar_names.contains(field.as_str()) {
                return Err(BulkError::schema(
                    record,
                    format!("column override for unknown field '{}'", field),
                ));
            }
        }
        for field in &model.primary_key {
            if !scalar_names.contains(field.as_str()) {
                return Err(BulkError::schema(
                    record,
                    format!("primary key field '{}' is not a scalar field", field),
                ));
            }
        }
        for field in &model.generated {
            if !scalar_names.contains(field.as_str()) {
                return Err(BulkError::schema(
                    record,
                    format!("generated field '{}' is not a scalar field", field),
                ));
            }
        }

        let mut columns = Vec::with_capacity(scalar_names.len());
        let mut seen_columns = HashSet::new();
        let mut value_index = 0;

        for field in &fields {
            let FieldKind::Scalar(value_type) = field.kind else {
                continue;
            };

            let column = model
                .columns
                .get(&field.name)
                .cloned()
                .unwrap_or_else(|| field.name.clone());
            check_identifier(record, &column)?;

            if !seen_columns.insert(column.clone()) {
                return Err(BulkError::schema(
                    record,
                    format!("column '{}' is mapped by more than one field", column),
                ));
            }

            columns.push(ColumnMapping {
                field: field.name.clone(),
                column,
                value_type,
                value_index,
                is_primary_key: model.primary_key.contains(&field.name),
                is_identity: model.generated.contains(&field.name),
                key_kind: KeyKind::from_type(value_type),
            });
            value_index += 1;
        }

        if columns.is_empty() {
            return Err(BulkError::schema(record, "record declares no scalar fields"));
        }

        let identity_fields = columns
            .iter()
            .filter(|c| c.is_identity)
            .map(|c| c.field.clone())
            .collect();

        let staging_table = self.dialect.staging_table_name(&model.table);
        check_identifier(record, &staging_table)?;

        let descriptor = TableDescriptor {
            record: record.to_string(),
            qualified_name: self.dialect.qualify(&schema, &model.table),
            qualified_staging: self.dialect.qualify_staging(&staging_table),
            staging_scope: self.dialect.staging_scope(),
            schema,
            table: model.table,
            staging_table,
            columns,
            primary_key: model.primary_key,
            identity_fields,
        };

        debug!(
            "Resolved {} -> {} ({} columns, key {:?}, staging {})",
            record,
            descriptor.qualified_name,
            descriptor.columns.len(),
            descriptor.primary_key,
            descriptor.staging_table
        );

        Ok(descriptor)
    }
}

fn check_identifier(record: &str, name: &str) -> Result<()> {
    validate_identifier(name).map_err(|e| BulkError::schema(record, e.to_string()))
}
