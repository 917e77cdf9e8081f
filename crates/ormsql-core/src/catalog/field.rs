//! Field definitions for entities.

use super::types::{ScalarType, SortOrder};
use crate::value::Value;

/// How primary key values come into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScheme {
    /// Assigned by the store on insert (auto-increment); not settable by the caller.
    Identity,
    /// GUID generated on insert when the caller leaves the key null.
    Guid,
    /// Supplied by the caller.
    Natural,
}

/// Default value policy for a field.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// A constant value.
    Value(Value),
    /// Current timestamp (evaluated by the store at insert time).
    CurrentTimestamp,
}

/// A field definition, supplied at registration time.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name as used by the Rust type.
    pub name: String,
    /// Column name in the store, when it differs from `name`.
    pub store_name: Option<String>,
    /// Portable type tag.
    pub scalar: ScalarType,
    /// Whether the column accepts null.
    pub nullable: bool,
    /// Default value if none is provided on insert.
    pub default: Option<DefaultValue>,
    /// Index this field with the given sort order.
    pub search_order: Option<SortOrder>,
    /// Values must be unique across the table.
    pub unique: bool,
    /// Primary key scheme, if this field is the primary key.
    pub primary_key: Option<KeyScheme>,
    /// Target `(entity, field)` if this field is a foreign key.
    pub foreign_key: Option<(String, String)>,
    /// Field carries an optimistic-concurrency row version.
    pub row_version: bool,
    /// Maximum length for string and binary columns.
    pub max_length: Option<u32>,
}

impl FieldDef {
    /// Create a new required (non-nullable) field.
    pub fn new(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            store_name: None,
            scalar,
            nullable: false,
            default: None,
            search_order: None,
            unique: false,
            primary_key: None,
            foreign_key: None,
            row_version: false,
            max_length: None,
        }
    }

    /// Create a nullable field.
    pub fn optional(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::new(name, scalar).nullable()
    }

    /// Map the field onto a differently named column.
    pub fn store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = Some(store_name.into());
        self
    }

    /// Allow null values.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark as indexed in ascending order.
    pub fn indexed(mut self) -> Self {
        self.search_order.get_or_insert(SortOrder::Asc);
        self
    }

    /// Mark as indexed with an explicit sort order.
    pub fn search_order(mut self, order: SortOrder) -> Self {
        self.search_order = Some(order);
        self
    }

    /// Require unique values (implies an index).
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Make this field the primary key.
    pub fn primary_key(mut self, scheme: KeyScheme) -> Self {
        self.primary_key = Some(scheme);
        self
    }

    /// Declare a foreign key to `entity.field`.
    pub fn foreign_key(mut self, entity: impl Into<String>, field: impl Into<String>) -> Self {
        self.foreign_key = Some((entity.into(), field.into()));
        self
    }

    /// Use this field as the row version.
    pub fn row_version(mut self) -> Self {
        self.row_version = true;
        self
    }

    /// Limit string or binary length.
    pub fn max_length(mut self, length: u32) -> Self {
        self.max_length = Some(length);
        self
    }

    /// Column name in the store.
    pub fn column_name(&self) -> &str {
        self.store_name.as_deref().unwrap_or(&self.name)
    }
}

/// Compiled metadata for one field, owned by its entity descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Field name as used by the Rust type.
    pub name: String,
    /// Column name in the store.
    pub store_name: String,
    /// Fully qualified `table.field` name.
    pub qualified_name: String,
    /// Alias used when the column is projected in a joined select.
    pub alias: String,
    /// Portable type tag.
    pub scalar: ScalarType,
    /// Whether the column accepts null.
    pub nullable: bool,
    /// Default value policy.
    pub default: Option<DefaultValue>,
    /// Whether the caller may assign this field.
    pub settable: bool,
    /// Field is (part of) the primary key.
    pub primary_key: bool,
    /// Field is the row version.
    pub row_version: bool,
    /// Maximum length for string and binary columns.
    pub max_length: Option<u32>,
}

impl FieldDescriptor {
    pub(crate) fn compile(table: &str, def: &FieldDef) -> Self {
        let store_name = def.column_name().to_string();
        Self {
            qualified_name: format!("{}.{}", table, store_name),
            alias: format!("{}_{}", table, store_name),
            name: def.name.clone(),
            scalar: def.scalar,
            nullable: def.nullable,
            default: def.default.clone(),
            settable: def.primary_key != Some(KeyScheme::Identity),
            primary_key: def.primary_key.is_some(),
            row_version: def.row_version,
            max_length: def.max_length,
            store_name,
        }
    }

    /// Check whether `name` refers to this field, by field or column name.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.store_name.eq_ignore_ascii_case(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_def_builder() {
        let field = FieldDef::new("id", ScalarType::Int64)
            .store_name("Id")
            .primary_key(KeyScheme::Identity);

        assert_eq!(field.name, "id");
        assert_eq!(field.column_name(), "Id");
        assert!(!field.nullable);
        assert_eq!(field.primary_key, Some(KeyScheme::Identity));
    }

    #[test]
    fn test_optional_field() {
        let field = FieldDef::optional("age", ScalarType::Int32).search_order(SortOrder::Desc);

        assert!(field.nullable);
        assert_eq!(field.search_order, Some(SortOrder::Desc));
        assert!(field.default.is_none());
    }

    #[test]
    fn test_identity_key_not_settable() {
        let identity = FieldDescriptor::compile(
            "Author",
            &FieldDef::new("Id", ScalarType::Int64).primary_key(KeyScheme::Identity),
        );
        let natural = FieldDescriptor::compile(
            "Author",
            &FieldDef::new("Code", ScalarType::String).primary_key(KeyScheme::Natural),
        );

        assert!(!identity.settable);
        assert!(natural.settable);
        assert_eq!(identity.qualified_name, "Author.Id");
        assert_eq!(identity.alias, "Author_Id");
    }
}
