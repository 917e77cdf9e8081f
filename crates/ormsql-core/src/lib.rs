//! ORMSQL Core - Metadata registry, statement compiler, and execution engine.
//!
//! This crate maps Rust record types onto relational tables, compiles typed
//! filter expressions into parameterized SQL, executes statements through a
//! pooled connection layer, and rebuilds rows into shared object graphs.

pub mod catalog;
pub mod dialect;
pub mod error;
pub mod migration;
pub mod model;
pub mod query;
pub mod storage;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{
    is_reserved, DefaultValue, EntityDef, EntityDescriptor, FieldDef, FieldDescriptor,
    ForeignKeyDescriptor, IndexDef, IndexDescriptor, KeyScheme, MetadataRegistry,
    PrimaryKeyDescriptor, ReferenceDef, ReferenceDescriptor, ReferenceDirection, ScalarType,
    SortOrder,
};
pub use dialect::{
    AnsiDialect, Dialect, IsolationLevel, LiveColumn, Parameter, Parameters, SchemaChecker,
};
pub use error::Error;
pub use migration::{LiveTable, ReconcileReport, SchemaChange, SchemaReconciler};
pub use model::{AnyEntity, Collection, Entity, FieldReader, Reference, ReferenceSlot};
pub use query::{
    call, field, field_in, field_of, value, BinaryOp, ColumnRef, Condition, EntityRef, Expr,
    FieldRef, GroupRow, IntoExpr, JoinKind, Query, QueryIter, RenderedStatement, UnaryOp, Update,
};
pub use storage::{
    Connection, ConnectionPool, Engine, EngineConfig, PoolConfig, PooledConnection, Row, RowSet,
    StorageAdapter, Transaction,
};
pub use value::{FromValue, IdentityKey, Value};
