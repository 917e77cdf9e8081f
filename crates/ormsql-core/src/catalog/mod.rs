//! Entity metadata for ormsql.
//!
//! Definitions (`*Def`) are supplied at registration time; the registry
//! compiles them into immutable descriptors shared by the statement builder,
//! the materializer and schema reconciliation.

mod constraint;
mod entity;
mod field;
mod registry;
mod relation;
mod reserved;
mod types;

pub use constraint::{ForeignKeyDescriptor, IndexDef, IndexDescriptor, PrimaryKeyDescriptor};
pub use entity::{EntityDef, EntityDescriptor};
pub use field::{DefaultValue, FieldDef, FieldDescriptor, KeyScheme};
pub use registry::MetadataRegistry;
pub use relation::{ReferenceDef, ReferenceDescriptor, ReferenceDirection};
pub use reserved::is_reserved;
pub use types::{ScalarType, SortOrder};
