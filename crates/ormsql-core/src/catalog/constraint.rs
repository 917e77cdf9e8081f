//! Key and index descriptors.

use super::field::KeyScheme;
use super::types::SortOrder;

/// Compiled primary key of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeyDescriptor {
    /// Constraint name.
    pub name: String,
    /// Key field name.
    pub field: String,
    /// Key column name in the store.
    pub column: String,
    /// How key values are produced.
    pub scheme: KeyScheme,
}

impl PrimaryKeyDescriptor {
    /// Whether the store assigns key values on insert.
    pub fn is_identity(&self) -> bool {
        self.scheme == KeyScheme::Identity
    }
}

/// Compiled foreign key of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDescriptor {
    /// Constraint name.
    pub name: String,
    /// Local column name.
    pub column: String,
    /// Referenced entity name.
    pub target_entity: String,
    /// Referenced field name.
    pub target_field: String,
}

/// A composite index definition, supplied at registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    /// Explicit index name.
    pub name: Option<String>,
    /// Indexed fields and their sort order.
    pub fields: Vec<(String, SortOrder)>,
    /// Whether values must be unique.
    pub unique: bool,
}

impl IndexDef {
    /// Create an index over the given fields in ascending order.
    pub fn on<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            fields: fields
                .into_iter()
                .map(|f| (f.into(), SortOrder::Asc))
                .collect(),
            unique: false,
        }
    }

    /// Name the index.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Require unique values.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Change the sort order of one indexed field.
    pub fn order(mut self, field: &str, order: SortOrder) -> Self {
        if let Some(entry) = self.fields.iter_mut().find(|(f, _)| f == field) {
            entry.1 = order;
        }
        self
    }
}

/// Compiled index of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    /// Index name.
    pub name: String,
    /// Indexed columns and their sort order.
    pub columns: Vec<(String, SortOrder)>,
    /// Whether values must be unique.
    pub unique: bool,
}

impl IndexDescriptor {
    /// Default index name for a set of columns.
    pub fn default_name(table: &str, columns: &[(String, SortOrder)], unique: bool) -> String {
        let prefix = if unique { "UX" } else { "IX" };
        let joined: Vec<&str> = columns.iter().map(|(c, _)| c.as_str()).collect();
        format!("{}_{}_{}", prefix, table, joined.join("_"))
    }
}
