//! Mapped entity types and the slots joined queries populate.
//!
//! A mapped type implements [`Entity`] by hand (or through a code generator):
//! it hands the registry an [`EntityDef`], builds itself from a
//! [`FieldReader`] and flattens itself back into named values. Foreign-key
//! scalars remain ordinary fields; [`Reference`] and [`Collection`] are a
//! derived view filled in only by joined queries.

use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::catalog::{EntityDef, EntityDescriptor};
use crate::error::Error;
use crate::value::{FromValue, Value};

/// A materialized entity with its concrete type erased.
pub type AnyEntity = Arc<dyn Any + Send + Sync>;

/// A Rust type mapped onto a table.
pub trait Entity: Send + Sync + Sized + 'static {
    /// Mapping metadata for this type.
    fn definition() -> EntityDef;

    /// Build an instance from one row segment.
    fn from_fields(fields: &FieldReader<'_>) -> Result<Self, Error>;

    /// Field values keyed by field name.
    fn to_fields(&self) -> Vec<(&'static str, Value)>;

    /// Slot backing the named reference, if this type exposes one.
    fn reference(&self, _name: &str) -> Option<&dyn ReferenceSlot> {
        None
    }
}

/// A reference slot the materializer can attach targets to.
pub trait ReferenceSlot: Send + Sync {
    /// Attach one target entity.
    fn attach(&self, target: &AnyEntity) -> Result<(), Error>;
}

fn downcast<T: Entity>(target: &AnyEntity) -> Result<Arc<T>, Error> {
    Arc::clone(target)
        .downcast::<T>()
        .map_err(|_| Error::Materialize {
            entity: type_name::<T>().to_string(),
            field: String::new(),
            reason: "reference target has a different type".to_string(),
        })
}

/// Many-to-one slot holding at most one shared target.
pub struct Reference<T> {
    target: OnceLock<Arc<T>>,
}

impl<T> Reference<T> {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            target: OnceLock::new(),
        }
    }

    /// The attached target, if a joined query populated it.
    pub fn get(&self) -> Option<&Arc<T>> {
        self.target.get()
    }

    /// Whether a target is attached.
    pub fn is_set(&self) -> bool {
        self.target.get().is_some()
    }
}

impl<T> Default for Reference<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_set() {
            write!(f, "Reference(<{}>)", type_name::<T>())
        } else {
            write!(f, "Reference(None)")
        }
    }
}

impl<T: Entity> ReferenceSlot for Reference<T> {
    fn attach(&self, target: &AnyEntity) -> Result<(), Error> {
        let target = downcast::<T>(target)?;
        let current = self.target.get_or_init(|| Arc::clone(&target));
        if Arc::ptr_eq(current, &target) {
            Ok(())
        } else {
            Err(Error::Materialize {
                entity: type_name::<T>().to_string(),
                field: String::new(),
                reason: "many-to-one reference already holds another instance".to_string(),
            })
        }
    }
}

/// One-to-many slot accumulating shared targets.
pub struct Collection<T> {
    items: RwLock<Vec<Arc<T>>>,
}

impl<T> Collection<T> {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of the attached targets, in attachment order.
    pub fn items(&self) -> Vec<Arc<T>> {
        self.items.read().clone()
    }

    /// Number of attached targets.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether nothing is attached.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Collection(<{}> x {})", type_name::<T>(), self.len())
    }
}

impl<T: Entity> ReferenceSlot for Collection<T> {
    fn attach(&self, target: &AnyEntity) -> Result<(), Error> {
        let target = downcast::<T>(target)?;
        self.items.write().push(target);
        Ok(())
    }
}

static NULL: Value = Value::Null;

/// Read access to one entity's segment of a result row.
pub struct FieldReader<'a> {
    descriptor: &'a EntityDescriptor,
    values: &'a [Value],
}

impl<'a> FieldReader<'a> {
    /// Wrap values laid out in the descriptor's field order.
    pub fn new(descriptor: &'a EntityDescriptor, values: &'a [Value]) -> Self {
        Self { descriptor, values }
    }

    /// Raw value of a field.
    pub fn value(&self, name: &str) -> Result<&'a Value, Error> {
        let position = self
            .descriptor
            .field_position(name)
            .ok_or_else(|| Error::UnknownField {
                entity: self.descriptor.name.clone(),
                field: name.to_string(),
            })?;
        Ok(self.values.get(position).unwrap_or(&NULL))
    }

    /// Typed value of a field.
    pub fn get<V: FromValue>(&self, name: &str) -> Result<V, Error> {
        let value = self.value(name)?;
        V::from_value(value).map_err(|reason| Error::Materialize {
            entity: self.descriptor.name.clone(),
            field: name.to_string(),
            reason,
        })
    }
}

/// Type-erased construction and reference wiring for one mapped type.
pub(crate) trait EntityFactory: Send + Sync {
    fn build(&self, reader: &FieldReader<'_>) -> Result<AnyEntity, Error>;

    fn attach(&self, owner: &AnyEntity, reference: &str, target: &AnyEntity)
        -> Result<(), Error>;
}

pub(crate) struct TypedFactory<T>(PhantomData<fn() -> T>);

impl<T> TypedFactory<T> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Entity> EntityFactory for TypedFactory<T> {
    fn build(&self, reader: &FieldReader<'_>) -> Result<AnyEntity, Error> {
        let entity: AnyEntity = Arc::new(T::from_fields(reader)?);
        Ok(entity)
    }

    fn attach(
        &self,
        owner: &AnyEntity,
        reference: &str,
        target: &AnyEntity,
    ) -> Result<(), Error> {
        let owner = owner
            .downcast_ref::<T>()
            .ok_or_else(|| Error::definition(type_name::<T>(), "owner has a different type"))?;
        let slot = owner.reference(reference).ok_or_else(|| {
            Error::definition(
                type_name::<T>(),
                format!("no slot exposed for reference '{}'", reference),
            )
        })?;
        slot.attach(target)
    }
}
