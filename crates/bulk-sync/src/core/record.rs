//! Record layout descriptors.
//!
//! A [`Record`] declares its field layout once, at the type level, and reads
//! its values positionally. The engine never inspects a record reflectively:
//! the resolver joins the layout with entity metadata into a
//! [`TableDescriptor`](super::schema::TableDescriptor) whose columns point at
//! value positions.

use super::value::{SqlNullType, SqlValue};

/// Shape of a single record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A column-backed value of the given type.
    Scalar(SqlNullType),
    /// A navigation collection (e.g. child rows). Never mapped to a column.
    Collection,
}

/// A named field in a record's declared layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDef {
    /// A column-backed field.
    pub fn scalar(name: impl Into<String>, ty: SqlNullType) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar(ty),
        }
    }

    /// A navigation collection, excluded from the column set.
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Collection,
        }
    }

    /// Declared SQL type, if this is a scalar field.
    pub fn scalar_type(&self) -> Option<SqlNullType> {
        match self.kind {
            FieldKind::Scalar(ty) => Some(ty),
            FieldKind::Collection => None,
        }
    }
}

/// A structured value that can be bulk-written.
///
/// # Contract
///
/// - [`fields`](Record::fields) returns the same layout on every call.
/// - [`values`](Record::values) returns exactly one value per *scalar*
///   field, in the order those fields appear in the layout. Collection
///   fields contribute no value.
///
/// # Example
///
/// ```rust
/// use bulk_sync::core::{FieldDef, Record, SqlNullType, SqlValue};
///
/// struct User {
///     id: i32,
///     name: String,
///     email: Option<String>,
/// }
///
/// impl Record for User {
///     fn fields() -> Vec<FieldDef> {
///         vec![
///             FieldDef::scalar("Id", SqlNullType::I32),
///             FieldDef::scalar("Name", SqlNullType::String),
///             FieldDef::scalar("Email", SqlNullType::String),
///         ]
///     }
///
///     fn values(&self) -> Vec<SqlValue<'_>> {
///         vec![
///             SqlValue::I32(self.id),
///             SqlValue::text_borrowed(&self.name),
///             self.email
///                 .as_deref()
///                 .map_or(SqlValue::Null(SqlNullType::String), SqlValue::text_borrowed),
///         ]
///     }
/// }
/// ```
pub trait Record: Send + Sync {
    /// Declared field layout, in declaration order.
    fn fields() -> Vec<FieldDef>
    where
        Self: Sized;

    /// Scalar field values, in declaration order.
    fn values(&self) -> Vec<SqlValue<'_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_def_scalar_type() {
        assert_eq!(
            FieldDef::scalar("Id", SqlNullType::I64).scalar_type(),
            Some(SqlNullType::I64)
        );
        assert_eq!(FieldDef::collection("Orders").scalar_type(), None);
    }
}
