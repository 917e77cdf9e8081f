//! Lowers [`Expr`] trees into [`Condition`] trees.
//!
//! One case per expression kind. Field references resolve against the
//! entities in scope; sub-trees made only of constants are evaluated here so
//! the store only ever sees a single parameter for them. Shapes that cannot
//! be lowered fail with `UnsupportedExpression`.

use std::cmp::Ordering;
use std::sync::Arc;

use super::condition::{BinaryOp, Condition, UnaryOp};
use super::expr::{EntityRef, Expr, FieldRef};
use crate::catalog::EntityDescriptor;
use crate::error::Error;
use crate::value::Value;

/// Entities a query can reference: the root first, then joins in order.
pub(crate) struct Scope<'a> {
    entities: &'a [Arc<EntityDescriptor>],
}

impl<'a> Scope<'a> {
    pub(crate) fn new(entities: &'a [Arc<EntityDescriptor>]) -> Self {
        Self { entities }
    }

    fn entity(&self, entity: &EntityRef) -> Result<&'a EntityDescriptor, Error> {
        let found = match entity {
            EntityRef::Root => self.entities.first(),
            EntityRef::Type { id, .. } => self.entities.iter().find(|d| d.type_id == Some(*id)),
            EntityRef::Named(name) => self.entities.iter().find(|d| d.answers_to(name)),
        };
        found.map(|d| d.as_ref()).ok_or_else(|| {
            let name = match entity {
                EntityRef::Root => "<root>",
                EntityRef::Type { name, .. } => *name,
                EntityRef::Named(name) => name.as_str(),
            };
            Error::UnsupportedExpression(format!("entity {} is not part of this query", name))
        })
    }

    /// Resolve a field reference to its column.
    pub(crate) fn column(&self, field: &FieldRef) -> Result<Condition, Error> {
        let entity = self.entity(&field.entity)?;
        let descriptor = entity.require_field(&field.name)?;
        Ok(Condition::column(&entity.store_name, &descriptor.store_name))
    }
}

/// Compile an expression within `scope`.
pub(crate) fn compile(expr: &Expr, scope: &Scope<'_>) -> Result<Condition, Error> {
    match expr {
        Expr::Field(field) => scope.column(field),
        Expr::Value(value) => Ok(Condition::Literal(value.clone())),
        Expr::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match compile(item, scope)? {
                    Condition::Literal(value) => values.push(value),
                    _ => {
                        return Err(Error::UnsupportedExpression(
                            "list elements must be constants".to_string(),
                        ))
                    }
                }
            }
            Ok(Condition::List(values.into()))
        }
        Expr::Unary { op, operand } => {
            let operand = compile(operand, scope)?;
            match operand {
                Condition::Literal(value) => fold_unary(*op, value).map(Condition::Literal),
                operand => Ok(Condition::unary(*op, operand)),
            }
        }
        Expr::Binary { op, left, right } => {
            let left = compile(left, scope)?;
            let right = compile(right, scope)?;
            if let Some(folded) = fold_binary(*op, &left, &right)? {
                return Ok(Condition::Literal(folded));
            }
            Ok(Condition::binary(*op, left, right))
        }
        Expr::Call { function, args } => compile_call(function, args, scope),
    }
}

fn compile_call(function: &str, args: &[Expr], scope: &Scope<'_>) -> Result<Condition, Error> {
    if !matches!(function, "starts_with" | "ends_with" | "contains") {
        return Err(Error::UnsupportedExpression(format!(
            "call to '{}' cannot be lowered to SQL",
            function
        )));
    }
    let [target, pattern] = args else {
        return Err(Error::UnsupportedExpression(format!(
            "'{}' takes exactly two arguments",
            function
        )));
    };

    let target = compile(target, scope)?;
    let pattern = match compile(pattern, scope)? {
        Condition::Literal(Value::String(pattern)) => pattern,
        _ => {
            return Err(Error::UnsupportedExpression(format!(
                "'{}' needs a constant string pattern",
                function
            )))
        }
    };

    if let Condition::Literal(Value::String(text)) = &target {
        let matched = match function {
            "starts_with" => text.starts_with(&pattern),
            "ends_with" => text.ends_with(&pattern),
            _ => text.contains(&pattern),
        };
        return Ok(Condition::Literal(Value::Bool(matched)));
    }

    let pattern = match function {
        "starts_with" => format!("{}%", pattern),
        "ends_with" => format!("%{}", pattern),
        _ => format!("%{}%", pattern),
    };
    Ok(Condition::binary(
        BinaryOp::Like,
        target,
        Condition::Literal(Value::String(pattern)),
    ))
}

fn unsupported(op: impl std::fmt::Debug, operand: &Value) -> Error {
    Error::UnsupportedExpression(format!("{:?} of a {} constant", op, operand.type_name()))
}

fn fold_unary(op: UnaryOp, value: Value) -> Result<Value, Error> {
    match (op, &value) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Negate, Value::Int32(i)) => i
            .checked_neg()
            .map(Value::Int32)
            .ok_or_else(|| unsupported(op, &value)),
        (UnaryOp::Negate, Value::Int64(i)) => i
            .checked_neg()
            .map(Value::Int64)
            .ok_or_else(|| unsupported(op, &value)),
        (UnaryOp::Negate, Value::Float64(f)) => Ok(Value::Float64(-f)),
        _ => Err(unsupported(op, &value)),
    }
}

/// Evaluate a binary node whose operands are both constants.
///
/// Returns `None` when the node should be left for the store to evaluate.
fn fold_binary(op: BinaryOp, left: &Condition, right: &Condition) -> Result<Option<Value>, Error> {
    let (Condition::Literal(l), Condition::Literal(r)) = (left, right) else {
        if let (BinaryOp::In | BinaryOp::NotIn, Condition::Literal(l), Condition::List(items)) =
            (op, left, right)
        {
            if l.is_null() {
                return Ok(None);
            }
            let found = items.iter().any(|item| compare(l, item) == Some(Ordering::Equal));
            return Ok(Some(Value::Bool(found == (op == BinaryOp::In))));
        }
        return Ok(None);
    };

    if matches!(op, BinaryOp::Like | BinaryOp::In | BinaryOp::NotIn) {
        return Ok(None);
    }
    if l.is_null() || r.is_null() {
        // Null comparisons keep their IS NULL rendering; null arithmetic is null.
        return Ok(if op.is_arithmetic() { Some(Value::Null) } else { None });
    }

    if op.is_arithmetic() {
        return fold_arithmetic(op, l, r).map(Some);
    }
    if op.is_comparison() {
        let ordering = compare(l, r).ok_or_else(|| {
            Error::UnsupportedExpression(format!(
                "cannot compare {} with {}",
                l.type_name(),
                r.type_name()
            ))
        })?;
        let result = match op {
            BinaryOp::Equal => ordering == Ordering::Equal,
            BinaryOp::NotEqual => ordering != Ordering::Equal,
            BinaryOp::Less => ordering == Ordering::Less,
            BinaryOp::LessOrEqual => ordering != Ordering::Greater,
            BinaryOp::Greater => ordering == Ordering::Greater,
            _ => ordering != Ordering::Less,
        };
        return Ok(Some(Value::Bool(result)));
    }

    match (op, l.as_bool(), r.as_bool()) {
        (BinaryOp::And, Some(a), Some(b)) => Ok(Some(Value::Bool(a && b))),
        (BinaryOp::Or, Some(a), Some(b)) => Ok(Some(Value::Bool(a || b))),
        _ => Err(Error::UnsupportedExpression(format!(
            "{:?} of {} and {} constants",
            op,
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn fold_arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, Error> {
    let overflow = || {
        Error::UnsupportedExpression(format!("constant {:?} of {} and {} overflows", op, l, r))
    };

    match (l, r) {
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        (Value::Int32(a), Value::Int32(b)) => {
            integer_op(op, i64::from(*a), i64::from(*b))
                .and_then(|v| i32::try_from(v).ok())
                .map(Value::Int32)
                .ok_or_else(overflow)
        }
        (Value::Int32(_) | Value::Int64(_), Value::Int32(_) | Value::Int64(_)) => {
            let (a, b) = (l.as_i64(), r.as_i64());
            a.zip(b)
                .and_then(|(a, b)| integer_op(op, a, b))
                .map(Value::Int64)
                .ok_or_else(overflow)
        }
        _ if l.is_numeric() && r.is_numeric() => {
            let (a, b) = (l.as_f64().unwrap_or_default(), r.as_f64().unwrap_or_default());
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Subtract => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide => a / b,
                _ => a % b,
            };
            Ok(Value::Float64(result))
        }
        _ => Err(Error::UnsupportedExpression(format!(
            "{:?} of {} and {} constants",
            op,
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn integer_op(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Subtract => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Divide => a.checked_div(b),
        BinaryOp::Modulo => a.checked_rem(b),
        _ => None,
    }
}

fn compare(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::Guid(a), Value::Guid(b)) => Some(a.cmp(b)),
        _ if l.is_numeric() && r.is_numeric() => match (l.as_i64(), r.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => l.as_f64()?.partial_cmp(&r.as_f64()?),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MetadataRegistry;
    use crate::dialect::{AnsiDialect, Parameters};
    use crate::query::expr::{call, field, field_in, field_of, value};
    use crate::testing::{Author, Book};
    use pretty_assertions::assert_eq;

    fn entities() -> Vec<Arc<EntityDescriptor>> {
        let registry = MetadataRegistry::new();
        vec![
            registry.register::<Author>().unwrap(),
            registry.register::<Book>().unwrap(),
        ]
    }

    fn render(expr: Expr) -> Result<(String, Parameters), Error> {
        let entities = entities();
        let condition = compile(&expr, &Scope::new(&entities))?;
        let mut params = Parameters::new();
        let sql = condition.to_statement(&AnsiDialect, &mut params);
        Ok((sql, params))
    }

    #[test]
    fn test_field_equality() {
        let (sql, params) = render(field("Age").eq(5)).unwrap();

        assert_eq!(sql, "[Author].[Age] = @p0");
        assert_eq!(params.values(), vec![&Value::Int32(5)]);
    }

    #[test]
    fn test_or_of_captured_values() {
        let id = 7i64;
        let name = String::from("n");
        let (sql, params) = render(field("Id").eq(id).or(field("Name").eq(&name))).unwrap();

        assert_eq!(sql, "([Author].[Id] = @p0 OR [Author].[Name] = @p1)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_constant_subtrees_fold() {
        let base = 40;
        let (sql, params) = render(field("Age").gt(value(base) + 2)).unwrap();

        assert_eq!(sql, "[Author].[Age] > @p0");
        assert_eq!(params.get("@p0"), Some(&Value::Int32(42)));

        let (sql, _) = render(field("Age").lt(value(10i64) * 2 - 1)).unwrap();
        assert_eq!(sql, "[Author].[Age] < @p0");

        let (_, params) = render(field("Name").eq(value("a") + "b")).unwrap();
        assert_eq!(params.get("@p0"), Some(&Value::String("ab".into())));
    }

    #[test]
    fn test_column_arithmetic_is_not_folded() {
        let (sql, _) = render((field("Age") + 1).ge(18)).unwrap();
        assert_eq!(sql, "([Author].[Age] + @p0) >= @p1");
    }

    #[test]
    fn test_null_literal_renders_is_null() {
        let (sql, params) = render(field("Age").eq(Option::<i32>::None)).unwrap();
        assert_eq!(sql, "[Author].[Age] IS NULL");
        assert!(params.is_empty());

        let (sql, _) = render(field("Age").is_not_null()).unwrap();
        assert_eq!(sql, "[Author].[Age] IS NOT NULL");
    }

    #[test]
    fn test_membership() {
        let (sql, params) = render(field("Id").is_in(vec![3i64, 4])).unwrap();
        assert_eq!(sql, "[Author].[Id] IN (@p0, @p1)");
        assert_eq!(params.get("@p1"), Some(&Value::Int64(4)));

        let (sql, _) = render(field("Id").not_in(Vec::<i64>::new())).unwrap();
        assert_eq!(sql, "1 = 1");
    }

    #[test]
    fn test_string_predicates_lower_to_like() {
        let (sql, params) = render(field("Name").starts_with("An")).unwrap();
        assert_eq!(sql, "[Author].[Name] LIKE @p0");
        assert_eq!(params.get("@p0"), Some(&Value::String("An%".into())));

        let (_, params) = render(field("Name").contains("n")).unwrap();
        assert_eq!(params.get("@p0"), Some(&Value::String("%n%".into())));
    }

    #[test]
    fn test_joined_entity_fields() {
        let (sql, _) = render(field_of::<Book>("Title").eq("T").and(field_in("author", "Name").eq("A")))
            .unwrap();
        assert_eq!(sql, "[Book].[Title] = @p0 AND [Author].[Name] = @p1");
    }

    #[test]
    fn test_unsupported_shapes() {
        assert!(matches!(
            render(call("upper", vec![field("Name")])),
            Err(Error::UnsupportedExpression(_))
        ));
        assert!(matches!(
            render(field("Name").starts_with(field("Name"))),
            Err(Error::UnsupportedExpression(_))
        ));
        assert!(matches!(
            render(value(i32::MAX) + 1),
            Err(Error::UnsupportedExpression(_))
        ));
        assert!(matches!(
            render(value(1) / 0),
            Err(Error::UnsupportedExpression(_))
        ));

        struct Outsider;
        assert!(matches!(
            render(field_of::<Outsider>("Id").eq(1)),
            Err(Error::UnsupportedExpression(_))
        ));
    }

    #[test]
    fn test_unknown_field() {
        assert!(matches!(
            render(field("Salary").eq(1)),
            Err(Error::UnknownField { .. })
        ));
    }
}
