//! Query layer: filter expressions, their compilation to conditions,
//! statement rendering and row materialization.

mod builder;
mod compiler;
pub(crate) mod condition;
mod expr;
pub(crate) mod materialize;
pub(crate) mod statement;

pub use builder::{GroupRow, Query, QueryIter, Update};
pub use condition::{BinaryOp, ColumnRef, Condition, UnaryOp};
pub use expr::{call, field, field_in, field_of, value, EntityRef, Expr, FieldRef, IntoExpr};
pub use statement::{JoinKind, RenderedStatement};

pub(crate) use statement::{DeleteStatement, InsertStatement, SelectStatement, UpdateStatement};
