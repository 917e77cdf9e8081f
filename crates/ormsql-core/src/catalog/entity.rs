//! Entity definitions and their compiled descriptors.

use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::constraint::{
    ForeignKeyDescriptor, IndexDef, IndexDescriptor, PrimaryKeyDescriptor,
};
use super::field::{FieldDef, FieldDescriptor, KeyScheme};
use super::relation::{ReferenceDef, ReferenceDescriptor, ReferenceDirection};
use super::reserved::is_reserved;
use super::types::ScalarType;
use crate::error::Error;
use crate::model::EntityFactory;

/// An entity definition (table mapping), supplied at registration time.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDef {
    /// Entity name (unique within the registry).
    pub name: String,
    /// Table name, when it differs from `name`.
    pub store_name: Option<String>,
    /// Field definitions in column order.
    pub fields: Vec<FieldDef>,
    /// References to other entities.
    pub references: Vec<ReferenceDef>,
    /// Composite indexes.
    pub indexes: Vec<IndexDef>,
}

impl EntityDef {
    /// Create a new entity definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store_name: None,
            fields: Vec::new(),
            references: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Map the entity onto a differently named table.
    pub fn store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = Some(store_name.into());
        self
    }

    /// Add a field to the entity.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add multiple fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Add a reference to another entity.
    pub fn with_reference(mut self, reference: ReferenceDef) -> Self {
        self.references.push(reference);
        self
    }

    /// Add a composite index.
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Table name in the store.
    pub fn table_name(&self) -> &str {
        self.store_name.as_deref().unwrap_or(&self.name)
    }
}

/// The registry's compiled metadata for one mapped type.
///
/// Immutable once built; the only late mutation is binding reference
/// targets, which each reference performs at most once.
pub struct EntityDescriptor {
    /// Entity name.
    pub name: String,
    /// Table name in the store.
    pub store_name: String,
    /// Rust type this descriptor was registered for, if any.
    pub type_id: Option<TypeId>,
    /// Fields in column order (never empty).
    pub fields: Vec<FieldDescriptor>,
    /// Primary key, if declared.
    pub primary_key: Option<PrimaryKeyDescriptor>,
    /// Foreign keys.
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    /// References to other entities.
    pub references: Vec<ReferenceDescriptor>,
    /// Indexes.
    pub indexes: Vec<IndexDescriptor>,
    row_version: Option<usize>,
    factory: Option<Arc<dyn EntityFactory>>,
}

impl EntityDescriptor {
    /// Compile and validate a definition.
    pub(crate) fn compile(
        def: &EntityDef,
        type_id: Option<TypeId>,
        factory: Option<Arc<dyn EntityFactory>>,
    ) -> Result<Self, Error> {
        let entity = def.name.clone();
        let table = def.table_name().to_string();

        if def.fields.is_empty() {
            return Err(Error::definition(&entity, "entity declares no fields"));
        }
        if is_reserved(&table) {
            return Err(Error::ReservedWord { entity, name: table });
        }

        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(def.fields.len());
        let mut primary_key = None;
        let mut row_version = None;

        for (position, field_def) in def.fields.iter().enumerate() {
            let column = field_def.column_name();
            if is_reserved(column) {
                return Err(Error::ReservedWord {
                    entity,
                    name: column.to_string(),
                });
            }
            if !seen.insert(column.to_ascii_lowercase()) {
                return Err(Error::definition(
                    &entity,
                    format!("duplicate column '{}'", column),
                ));
            }

            if let Some(scheme) = field_def.primary_key {
                if primary_key.is_some() {
                    return Err(Error::definition(
                        &entity,
                        "composite primary keys are not supported",
                    ));
                }
                Self::validate_key_scheme(&entity, field_def, scheme)?;
                primary_key = Some(PrimaryKeyDescriptor {
                    name: format!("PK_{}", table),
                    field: field_def.name.clone(),
                    column: column.to_string(),
                    scheme,
                });
            }

            if field_def.row_version {
                if row_version.is_some() {
                    return Err(Error::definition(&entity, "more than one row version field"));
                }
                if field_def.scalar != ScalarType::Int64 {
                    return Err(Error::definition(
                        &entity,
                        format!("row version field '{}' must be 64 bits wide", field_def.name),
                    ));
                }
                row_version = Some(position);
            }

            fields.push(FieldDescriptor::compile(&table, field_def));
        }

        let lookup = |name: &str| fields.iter().find(|f: &&FieldDescriptor| f.matches(name));

        let mut references = Vec::with_capacity(def.references.len());
        let mut reference_names = HashSet::new();
        for reference in &def.references {
            if !reference_names.insert(reference.name.as_str()) {
                return Err(Error::definition(
                    &entity,
                    format!("duplicate reference '{}'", reference.name),
                ));
            }
            if lookup(&reference.local_field).is_none() {
                return Err(Error::UnknownField {
                    entity,
                    field: reference.local_field.clone(),
                });
            }
            references.push(ReferenceDescriptor::compile(&def.name, reference));
        }

        let mut foreign_keys: Vec<ForeignKeyDescriptor> = Vec::new();
        let declared = def
            .fields
            .iter()
            .filter_map(|f| f.foreign_key.as_ref().map(|(e, t)| (f.column_name(), e, t)));
        let implied = def
            .references
            .iter()
            .filter(|r| r.direction == ReferenceDirection::ManyToOne)
            .filter_map(|r| {
                lookup(&r.local_field).map(|f| (f.store_name.as_str(), &r.target, &r.foreign_field))
            });
        for (column, target_entity, target_field) in declared.chain(implied) {
            if foreign_keys.iter().any(|fk| fk.column == column) {
                continue;
            }
            foreign_keys.push(ForeignKeyDescriptor {
                name: format!("FK_{}_{}", table, column),
                column: column.to_string(),
                target_entity: target_entity.clone(),
                target_field: target_field.clone(),
            });
        }

        let mut indexes = Vec::new();
        for field_def in &def.fields {
            if field_def.search_order.is_none() && !field_def.unique {
                continue;
            }
            let columns = vec![(
                field_def.column_name().to_string(),
                field_def.search_order.unwrap_or_default(),
            )];
            indexes.push(IndexDescriptor {
                name: IndexDescriptor::default_name(&table, &columns, field_def.unique),
                columns,
                unique: field_def.unique,
            });
        }
        for index in &def.indexes {
            let mut columns = Vec::with_capacity(index.fields.len());
            for (name, order) in &index.fields {
                let field = lookup(name).ok_or_else(|| Error::UnknownField {
                    entity: entity.clone(),
                    field: name.clone(),
                })?;
                columns.push((field.store_name.clone(), *order));
            }
            if columns.is_empty() {
                return Err(Error::definition(&entity, "index declares no fields"));
            }
            let name = index
                .name
                .clone()
                .unwrap_or_else(|| IndexDescriptor::default_name(&table, &columns, index.unique));
            indexes.push(IndexDescriptor {
                name,
                columns,
                unique: index.unique,
            });
        }

        Ok(Self {
            name: entity,
            store_name: table,
            type_id,
            fields,
            primary_key,
            foreign_keys,
            references,
            indexes,
            row_version,
            factory,
        })
    }

    fn validate_key_scheme(entity: &str, field: &FieldDef, scheme: KeyScheme) -> Result<(), Error> {
        let valid = match scheme {
            KeyScheme::Identity => field.scalar.is_integer(),
            KeyScheme::Guid => field.scalar == ScalarType::Guid,
            KeyScheme::Natural => true,
        };
        if valid {
            Ok(())
        } else {
            Err(Error::definition(
                entity,
                format!(
                    "{:?} key '{}' cannot have type {:?}",
                    scheme, field.name, field.scalar
                ),
            ))
        }
    }

    /// Check whether `name` refers to this entity, by entity or table name.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.store_name.eq_ignore_ascii_case(name)
    }

    /// Get a field by field or column name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.matches(name))
    }

    /// Get a field by name, failing with `UnknownField`.
    pub fn require_field(&self, name: &str) -> Result<&FieldDescriptor, Error> {
        self.field(name).ok_or_else(|| Error::UnknownField {
            entity: self.name.clone(),
            field: name.to_string(),
        })
    }

    /// Position of a field in column order.
    pub fn field_position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.matches(name))
    }

    /// The primary key field.
    pub fn primary_key_field(&self) -> Option<&FieldDescriptor> {
        self.primary_key.as_ref().and_then(|pk| self.field(&pk.field))
    }

    /// The row version field.
    pub fn row_version_field(&self) -> Option<&FieldDescriptor> {
        self.row_version.map(|i| &self.fields[i])
    }

    /// Get a reference by name.
    pub fn reference(&self, name: &str) -> Option<&ReferenceDescriptor> {
        self.references.iter().find(|r| r.name == name)
    }

    /// References declared on this entity that point at `target`.
    pub fn references_to<'a>(
        &'a self,
        target: &'a EntityDescriptor,
    ) -> impl Iterator<Item = &'a ReferenceDescriptor> + 'a {
        self.references.iter().filter(move |r| r.targets(target))
    }

    pub(crate) fn factory(&self) -> Result<&Arc<dyn EntityFactory>, Error> {
        self.factory.as_ref().ok_or_else(|| {
            Error::definition(&self.name, "registered without a Rust type to materialize")
        })
    }
}

impl fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("name", &self.name)
            .field("store_name", &self.store_name)
            .field("fields", &self.fields)
            .field("primary_key", &self.primary_key)
            .field("foreign_keys", &self.foreign_keys)
            .field("references", &self.references)
            .field("indexes", &self.indexes)
            .finish()
    }
}
