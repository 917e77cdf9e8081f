//! Typed filter expressions.
//!
//! Expressions are plain trees built with combinators:
//!
//! ```ignore
//! use ormsql_core::{field, field_of};
//!
//! let adults = field("Age").ge(18).and(field("Name").starts_with("A"));
//! let by_author = field_of::<Author>("Name").eq("Ann");
//! ```
//!
//! Nothing is resolved until the owning query renders: field names are
//! looked up against the entities in scope and constant sub-trees are folded.

use std::any::{type_name, TypeId};
use std::ops;

use chrono::NaiveDateTime;
use uuid::Uuid;

use super::condition::{BinaryOp, UnaryOp};
use crate::value::Value;

/// Which entity a field reference belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    /// The query's root entity.
    Root,
    /// A mapped Rust type.
    Type {
        /// Type identity.
        id: TypeId,
        /// Type name, for diagnostics.
        name: &'static str,
    },
    /// An entity or table name.
    Named(String),
}

/// A reference to one field of an entity in scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    /// Owning entity.
    pub entity: EntityRef,
    /// Field or column name.
    pub name: String,
}

/// A filter, ordering or assignment expression.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A field of an entity in scope.
    Field(FieldRef),
    /// A constant.
    Value(Value),
    /// A list of expressions, the right side of a membership test.
    List(Vec<Expr>),
    /// A unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// A binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// A named function call.
    Call {
        /// Function name.
        function: String,
        /// Arguments, receiver first.
        args: Vec<Expr>,
    },
}

/// A field of the query's root entity.
pub fn field(name: impl Into<String>) -> Expr {
    Expr::Field(FieldRef {
        entity: EntityRef::Root,
        name: name.into(),
    })
}

/// A field of the entity mapped by `E`.
pub fn field_of<E: 'static>(name: impl Into<String>) -> Expr {
    Expr::Field(FieldRef {
        entity: EntityRef::Type {
            id: TypeId::of::<E>(),
            name: type_name::<E>(),
        },
        name: name.into(),
    })
}

/// A field of the entity with the given entity or table name.
pub fn field_in(entity: impl Into<String>, name: impl Into<String>) -> Expr {
    Expr::Field(FieldRef {
        entity: EntityRef::Named(entity.into()),
        name: name.into(),
    })
}

/// A constant.
pub fn value(value: impl Into<Value>) -> Expr {
    Expr::Value(value.into())
}

/// A call to a named function; only the string predicates compile.
pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Expr {
    Expr::Call {
        function: function.into(),
        args,
    }
}

/// Conversion into an expression operand.
///
/// Rust scalars become constants; an [`Expr`] passes through.
pub trait IntoExpr {
    /// Convert.
    fn into_expr(self) -> Expr;
}

impl IntoExpr for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl IntoExpr for Value {
    fn into_expr(self) -> Expr {
        Expr::Value(self)
    }
}

impl IntoExpr for FieldRef {
    fn into_expr(self) -> Expr {
        Expr::Field(self)
    }
}

macro_rules! impl_into_expr {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoExpr for $ty {
                fn into_expr(self) -> Expr {
                    Expr::Value(Value::from(self))
                }
            }
        )*
    };
}

impl_into_expr!(bool, i32, i64, f64, String, &str, &String, Vec<u8>, NaiveDateTime, Uuid);

impl<T: Into<Value>> IntoExpr for Option<T> {
    fn into_expr(self) -> Expr {
        Expr::Value(self.map(Into::into).unwrap_or(Value::Null))
    }
}

impl Expr {
    fn binary(self, op: BinaryOp, right: impl IntoExpr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right.into_expr()),
        }
    }

    /// `self = other`; against null this tests `IS NULL`.
    pub fn eq(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::Equal, other)
    }

    /// `self <> other`; against null this tests `IS NOT NULL`.
    pub fn ne(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::NotEqual, other)
    }

    /// `self < other`.
    pub fn lt(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::Less, other)
    }

    /// `self <= other`.
    pub fn le(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::LessOrEqual, other)
    }

    /// `self > other`.
    pub fn gt(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::Greater, other)
    }

    /// `self >= other`.
    pub fn ge(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::GreaterOrEqual, other)
    }

    /// `self AND other`.
    pub fn and(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::And, other)
    }

    /// `self OR other`.
    pub fn or(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::Or, other)
    }

    /// `self IS NULL`.
    pub fn is_null(self) -> Expr {
        self.eq(Value::Null)
    }

    /// `self IS NOT NULL`.
    pub fn is_not_null(self) -> Expr {
        self.ne(Value::Null)
    }

    /// Membership in a list of constants, one placeholder per element.
    pub fn is_in<I, V>(self, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list = Expr::List(values.into_iter().map(|v| Expr::Value(v.into())).collect());
        self.binary(BinaryOp::In, list)
    }

    /// Negated membership.
    pub fn not_in<I, V>(self, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list = Expr::List(values.into_iter().map(|v| Expr::Value(v.into())).collect());
        self.binary(BinaryOp::NotIn, list)
    }

    /// `self LIKE pattern`, pattern passed through as given.
    pub fn like(self, pattern: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::Like, pattern)
    }

    /// Prefix match.
    pub fn starts_with(self, prefix: impl IntoExpr) -> Expr {
        call("starts_with", vec![self, prefix.into_expr()])
    }

    /// Suffix match.
    pub fn ends_with(self, suffix: impl IntoExpr) -> Expr {
        call("ends_with", vec![self, suffix.into_expr()])
    }

    /// Substring match.
    pub fn contains(self, needle: impl IntoExpr) -> Expr {
        call("contains", vec![self, needle.into_expr()])
    }
}

macro_rules! impl_binary_op {
    ($($trait:ident :: $method:ident => $op:ident),* $(,)?) => {
        $(
            impl<R: IntoExpr> ops::$trait<R> for Expr {
                type Output = Expr;

                fn $method(self, rhs: R) -> Expr {
                    self.binary(BinaryOp::$op, rhs)
                }
            }
        )*
    };
}

impl_binary_op! {
    Add::add => Add,
    Sub::sub => Subtract,
    Mul::mul => Multiply,
    Div::div => Divide,
    Rem::rem => Modulo,
    BitAnd::bitand => And,
    BitOr::bitor => Or,
}

impl ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(self),
        }
    }
}

impl ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }
}
