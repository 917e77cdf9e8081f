//! Reference definitions between entities.

use std::sync::{Arc, OnceLock, Weak};

use super::entity::EntityDescriptor;

/// Direction of a reference, seen from the entity declaring it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceDirection {
    /// The declaring entity holds the foreign key and points at one target.
    ManyToOne,
    /// The target holds the foreign key; the declaring entity collects many targets.
    OneToMany,
}

/// A reference definition, supplied at registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDef {
    /// Reference name, unique within the declaring entity.
    pub name: String,
    /// Reference direction.
    pub direction: ReferenceDirection,
    /// Field on the declaring entity.
    pub local_field: String,
    /// Target entity name or store name.
    pub target: String,
    /// Field on the target entity.
    pub foreign_field: String,
}

impl ReferenceDef {
    /// Create a many-to-one reference (`local_field` is the foreign key).
    pub fn many_to_one(
        name: impl Into<String>,
        local_field: impl Into<String>,
        target: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            direction: ReferenceDirection::ManyToOne,
            local_field: local_field.into(),
            target: target.into(),
            foreign_field: foreign_field.into(),
        }
    }

    /// Create a one-to-many reference (`foreign_field` on the target is the foreign key).
    pub fn one_to_many(
        name: impl Into<String>,
        local_field: impl Into<String>,
        target: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            direction: ReferenceDirection::OneToMany,
            local_field: local_field.into(),
            target: target.into(),
            foreign_field: foreign_field.into(),
        }
    }
}

/// Compiled metadata for a reference.
///
/// The target descriptor is bound lazily: a reference to a type that is not
/// yet registered stays unresolved until that type registers, and once bound
/// it never changes.
#[derive(Debug)]
pub struct ReferenceDescriptor {
    /// Reference name.
    pub name: String,
    /// Reference direction.
    pub direction: ReferenceDirection,
    /// Name of the declaring entity.
    pub owner: String,
    /// Field on the declaring entity.
    pub local_field: String,
    /// Target entity name as declared.
    pub target_name: String,
    /// Field on the target entity.
    pub foreign_field: String,
    target: OnceLock<Weak<EntityDescriptor>>,
}

impl ReferenceDescriptor {
    pub(crate) fn compile(owner: &str, def: &ReferenceDef) -> Self {
        Self {
            name: def.name.clone(),
            direction: def.direction,
            owner: owner.to_string(),
            local_field: def.local_field.clone(),
            target_name: def.target.clone(),
            foreign_field: def.foreign_field.clone(),
            target: OnceLock::new(),
        }
    }

    /// The resolved target descriptor, if its type has registered.
    pub fn target(&self) -> Option<Arc<EntityDescriptor>> {
        self.target.get().and_then(Weak::upgrade)
    }

    /// Whether the target has been bound.
    pub fn is_resolved(&self) -> bool {
        self.target.get().is_some()
    }

    /// Check whether this reference points at `descriptor`.
    pub fn targets(&self, descriptor: &EntityDescriptor) -> bool {
        descriptor.answers_to(&self.target_name)
    }

    /// Bind the target if it matches and is still unbound.
    ///
    /// Returns `true` when this call performed the binding.
    pub(crate) fn resolve(&self, candidate: &Arc<EntityDescriptor>) -> bool {
        if self.is_resolved() || !self.targets(candidate) {
            return false;
        }
        self.target.set(Arc::downgrade(candidate)).is_ok()
    }
}
