//! Registry of compiled entity descriptors.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::entity::{EntityDef, EntityDescriptor};
use crate::error::Error;
use crate::model::{Entity, TypedFactory};

#[derive(Default)]
struct RegistryState {
    by_type: HashMap<TypeId, Arc<EntityDescriptor>>,
    /// Keyed by lowercased entity name and lowercased store name.
    by_name: HashMap<String, Arc<EntityDescriptor>>,
    ordered: Vec<Arc<EntityDescriptor>>,
    /// Subtype to base type.
    lineage: HashMap<TypeId, TypeId>,
}

/// Holds one descriptor per mapped type.
///
/// Registration is rare and lookups must stay linearizable with it, so both
/// go through a single registry-wide lock.
#[derive(Default)]
pub struct MetadataRegistry {
    state: Mutex<RegistryState>,
}

impl MetadataRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapped type, returning its descriptor.
    ///
    /// Idempotent: registering the same type again returns the existing
    /// descriptor instance.
    pub fn register<T: Entity>(&self) -> Result<Arc<EntityDescriptor>, Error> {
        let mut state = self.state.lock();
        if let Some(existing) = state.by_type.get(&TypeId::of::<T>()) {
            return Ok(Arc::clone(existing));
        }

        let def = T::definition();
        let descriptor = EntityDescriptor::compile(
            &def,
            Some(TypeId::of::<T>()),
            Some(Arc::new(TypedFactory::<T>::new())),
        )?;
        Self::insert(&mut state, descriptor)
    }

    /// Register a definition that has no Rust type behind it.
    ///
    /// Untyped descriptors take part in schema reconciliation and joins by
    /// name but cannot be materialized. Registering the same name twice
    /// returns the existing descriptor.
    pub fn register_def(&self, def: EntityDef) -> Result<Arc<EntityDescriptor>, Error> {
        let mut state = self.state.lock();
        if let Some(existing) = state.by_name.get(&def.name.to_ascii_lowercase()) {
            if existing.type_id.is_none() && existing.name == def.name {
                return Ok(Arc::clone(existing));
            }
        }

        let descriptor = EntityDescriptor::compile(&def, None, None)?;
        Self::insert(&mut state, descriptor)
    }

    fn insert(
        state: &mut RegistryState,
        descriptor: EntityDescriptor,
    ) -> Result<Arc<EntityDescriptor>, Error> {
        for key in [&descriptor.name, &descriptor.store_name] {
            if let Some(existing) = state.by_name.get(&key.to_ascii_lowercase()) {
                return Err(Error::definition(
                    &descriptor.name,
                    format!("name '{}' is already used by entity {}", key, existing.name),
                ));
            }
        }

        let descriptor = Arc::new(descriptor);
        if let Some(type_id) = descriptor.type_id {
            state.by_type.insert(type_id, Arc::clone(&descriptor));
        }
        state
            .by_name
            .insert(descriptor.name.to_ascii_lowercase(), Arc::clone(&descriptor));
        state
            .by_name
            .insert(descriptor.store_name.to_ascii_lowercase(), Arc::clone(&descriptor));
        state.ordered.push(Arc::clone(&descriptor));

        // Forward references: bind anything that was waiting for this entity,
        // then bind this entity's own references to what is already known.
        let mut patched = 0usize;
        for existing in &state.ordered {
            for reference in &existing.references {
                if reference.resolve(&descriptor) {
                    patched += 1;
                }
            }
            for reference in &descriptor.references {
                if reference.resolve(existing) {
                    patched += 1;
                }
            }
        }

        debug!(
            entity = %descriptor.name,
            table = %descriptor.store_name,
            fields = descriptor.fields.len(),
            references_patched = patched,
            "Registered entity"
        );
        Ok(descriptor)
    }

    /// Descriptor registered for `T`, if any.
    pub fn get<T: 'static>(&self) -> Option<Arc<EntityDescriptor>> {
        self.state.lock().by_type.get(&TypeId::of::<T>()).cloned()
    }

    /// Descriptor for an entity or store name (case-insensitive).
    pub fn lookup(&self, name: &str) -> Result<Arc<EntityDescriptor>, Error> {
        self.state
            .lock()
            .by_name
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| Error::EntityNotFound(name.to_string()))
    }

    /// Record that `Sub` is stored the way its base type `Base` is.
    pub fn declare_subtype<Sub: 'static, Base: 'static>(&self) {
        self.state
            .lock()
            .lineage
            .insert(TypeId::of::<Sub>(), TypeId::of::<Base>());
    }

    /// Descriptor for `T`, walking up declared base types when `T` itself
    /// is not registered.
    pub fn resolve<T: 'static>(&self) -> Result<Arc<EntityDescriptor>, Error> {
        let state = self.state.lock();
        Self::walk_lineage(&state, TypeId::of::<T>())
            .ok_or_else(|| Error::EntityNotFound(type_name::<T>().to_string()))
    }

    /// Descriptor that materializes `T` itself.
    ///
    /// A declared subtype that was never registered gets a descriptor of its
    /// own, compiled from its definition and stored in its base type's table.
    /// It is cached by type but stays out of name lookup and reconciliation,
    /// which keep seeing the base.
    pub fn resolve_entity<T: Entity>(&self) -> Result<Arc<EntityDescriptor>, Error> {
        let mut state = self.state.lock();
        let type_id = TypeId::of::<T>();
        if let Some(existing) = state.by_type.get(&type_id) {
            return Ok(Arc::clone(existing));
        }
        let base = state
            .lineage
            .get(&type_id)
            .and_then(|base| Self::walk_lineage(&state, *base))
            .ok_or_else(|| Error::EntityNotFound(type_name::<T>().to_string()))?;

        let def = T::definition().store_name(base.store_name.clone());
        let descriptor = Arc::new(EntityDescriptor::compile(
            &def,
            Some(type_id),
            Some(Arc::new(TypedFactory::<T>::new())),
        )?);
        for existing in &state.ordered {
            for reference in &descriptor.references {
                reference.resolve(existing);
            }
        }
        state.by_type.insert(type_id, Arc::clone(&descriptor));

        debug!(
            entity = %descriptor.name,
            base = %base.name,
            table = %descriptor.store_name,
            "Bound subtype to base table"
        );
        Ok(descriptor)
    }

    fn walk_lineage(state: &RegistryState, start: TypeId) -> Option<Arc<EntityDescriptor>> {
        let mut current = start;
        // Bounded by the number of lineage links, so a cycle cannot spin.
        for _ in 0..=state.lineage.len() {
            if let Some(descriptor) = state.by_type.get(&current) {
                return Some(Arc::clone(descriptor));
            }
            current = *state.lineage.get(&current)?;
        }
        None
    }

    /// Store name for `T`, walking up declared base types.
    pub fn resolve_store_name<T: 'static>(&self) -> Result<String, Error> {
        self.resolve::<T>().map(|d| d.store_name.clone())
    }

    /// All descriptors in registration order.
    pub fn descriptors(&self) -> Vec<Arc<EntityDescriptor>> {
        self.state.lock().ordered.clone()
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.state.lock().ordered.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.state.lock().ordered.is_empty()
    }
}
