//! Shared fixtures for unit tests.

use crate::core::metadata::{EntityModel, ModelRegistry};
use crate::core::record::{FieldDef, Record};
use crate::core::schema::TableDescriptor;
use crate::core::traits::Dialect;
use crate::core::value::{SqlNullType, SqlValue};
use crate::resolver::SchemaResolver;

/// Identity-keyed table with snake_case columns.
pub struct Tavern {
    pub id: i64,
    pub tavern_name: String,
    pub rating: i32,
}

impl Record for Tavern {
    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::scalar("Id", SqlNullType::I64),
            FieldDef::scalar("TavernName", SqlNullType::String),
            FieldDef::scalar("Rating", SqlNullType::I32),
            FieldDef::collection("Visits"),
        ]
    }

    fn values(&self) -> Vec<SqlValue<'_>> {
        vec![
            SqlValue::I64(self.id),
            SqlValue::text_borrowed(&self.tavern_name),
            SqlValue::I32(self.rating),
        ]
    }
}

/// Composite natural key (text + uuid), no identity.
pub struct Ledger {
    pub region: String,
    pub entry: uuid::Uuid,
    pub amount: rust_decimal::Decimal,
}

impl Record for Ledger {
    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::scalar("Region", SqlNullType::String),
            FieldDef::scalar("Entry", SqlNullType::Uuid),
            FieldDef::scalar("Amount", SqlNullType::Decimal),
        ]
    }

    fn values(&self) -> Vec<SqlValue<'_>> {
        vec![
            SqlValue::text_borrowed(&self.region),
            SqlValue::Uuid(self.entry),
            SqlValue::Decimal(self.amount),
        ]
    }
}

/// Key-only table.
pub struct Tag {
    pub name: String,
}

impl Record for Tag {
    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::scalar("Name", SqlNullType::String)]
    }

    fn values(&self) -> Vec<SqlValue<'_>> {
        vec![SqlValue::text_borrowed(&self.name)]
    }
}

pub fn registry() -> ModelRegistry {
    ModelRegistry::new()
        .with::<Tavern>(
            EntityModel::new("taverns")
                .column("Id", "id")
                .column("TavernName", "tavern_name")
                .column("Rating", "rating")
                .identity_key("Id"),
        )
        .with::<Ledger>(
            EntityModel::new("ledger")
                .key("Region")
                .key("Entry"),
        )
        .with::<Tag>(EntityModel::new("tags").key("Name"))
}

pub fn descriptor<R: Record + 'static, D: Dialect>(dialect: &D) -> TableDescriptor {
    let registry = registry();
    match SchemaResolver::new(&registry, dialect).resolve::<R>() {
        Ok(desc) => desc,
        Err(e) => panic!("fixture failed to resolve: {e}"),
    }
}
