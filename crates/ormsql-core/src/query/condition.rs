//! Condition AST and its SQL rendering.
//!
//! Nodes are immutable values with shared children, so compiled filters can
//! be cloned and combined freely. Rendering threads one [`Parameters`] list
//! through the tree; every literal becomes a positional placeholder in the
//! order it is written out.

use std::sync::Arc;

use crate::dialect::{Dialect, Parameters};
use crate::value::Value;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Negate,
    /// Boolean negation.
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
    /// `=`
    Equal,
    /// `<>`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `IN`
    In,
    /// `NOT IN`
    NotIn,
    /// `LIKE`
    Like,
}

impl BinaryOp {
    /// SQL spelling of the operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "<>",
            BinaryOp::Less => "<",
            BinaryOp::LessOrEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterOrEqual => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::In => "IN",
            BinaryOp::NotIn => "NOT IN",
            BinaryOp::Like => "LIKE",
        }
    }

    /// Whether the operator is arithmetic.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Subtract
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulo
        )
    }

    /// Whether the operator compares its operands.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessOrEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterOrEqual
        )
    }
}

/// A resolved, table-qualified column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// Table name in the store.
    pub table: String,
    /// Column name in the store.
    pub column: String,
}

impl ColumnRef {
    /// Create a column reference.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// `[table].[column]`
    pub fn qualified(&self, dialect: &dyn Dialect) -> String {
        format!("{}.{}", dialect.quote(&self.table), dialect.quote(&self.column))
    }
}

/// A compiled condition node.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A column.
    Column(ColumnRef),
    /// A constant, rendered as a parameter.
    Literal(Value),
    /// A list of constants, one parameter per element.
    List(Arc<[Value]>),
    /// A unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Arc<Condition>,
    },
    /// A binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Arc<Condition>,
        /// Right operand.
        right: Arc<Condition>,
    },
    /// Equality of two columns in a join.
    JoinOn {
        /// Column of the entity already in the query.
        left: ColumnRef,
        /// Column of the entity being joined.
        right: ColumnRef,
    },
}

impl Condition {
    /// A column node.
    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Condition::Column(ColumnRef::new(table, column))
    }

    /// A literal node.
    pub fn literal(value: impl Into<Value>) -> Self {
        Condition::Literal(value.into())
    }

    /// A binary node.
    pub fn binary(op: BinaryOp, left: Condition, right: Condition) -> Self {
        Condition::Binary {
            op,
            left: Arc::new(left),
            right: Arc::new(right),
        }
    }

    /// A unary node.
    pub fn unary(op: UnaryOp, operand: Condition) -> Self {
        Condition::Unary {
            op,
            operand: Arc::new(operand),
        }
    }

    /// `self AND other`.
    pub fn and(self, other: Condition) -> Self {
        Condition::binary(BinaryOp::And, self, other)
    }

    /// `self OR other`.
    pub fn or(self, other: Condition) -> Self {
        Condition::binary(BinaryOp::Or, self, other)
    }

    /// The constant held by a literal node.
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Condition::Literal(value) => Some(value),
            _ => None,
        }
    }

    fn is_null_literal(&self) -> bool {
        matches!(self, Condition::Literal(Value::Null))
    }

    /// Render as SQL, appending parameters to `params`.
    pub fn to_statement(&self, dialect: &dyn Dialect, params: &mut Parameters) -> String {
        match self {
            Condition::Column(column) => column.qualified(dialect),
            Condition::Literal(value) => dialect.add_param(value.clone(), params),
            Condition::List(values) => render_list(values, dialect, params),
            Condition::Unary { op, operand } => {
                let inner = operand.to_statement(dialect, params);
                match (op, operand.as_ref()) {
                    (UnaryOp::Negate, Condition::Column(_) | Condition::Literal(_)) => {
                        format!("-{}", inner)
                    }
                    (UnaryOp::Negate, _) => format!("-({})", inner),
                    (UnaryOp::Not, _) => format!("NOT ({})", inner),
                }
            }
            Condition::Binary { op, left, right } => {
                render_binary(*op, left, right, dialect, params)
            }
            Condition::JoinOn { left, right } => {
                format!("{} = {}", left.qualified(dialect), right.qualified(dialect))
            }
        }
    }
}

fn render_list(values: &[Value], dialect: &dyn Dialect, params: &mut Parameters) -> String {
    let placeholders: Vec<String> = values
        .iter()
        .map(|v| dialect.add_param(v.clone(), params))
        .collect();
    format!("({})", placeholders.join(", "))
}

fn render_binary(
    op: BinaryOp,
    left: &Condition,
    right: &Condition,
    dialect: &dyn Dialect,
    params: &mut Parameters,
) -> String {
    match op {
        BinaryOp::Equal | BinaryOp::NotEqual if left.is_null_literal() || right.is_null_literal() => {
            let subject = if right.is_null_literal() { left } else { right };
            let keyword = if op == BinaryOp::Equal { "IS NULL" } else { "IS NOT NULL" };
            format!("{} {}", subject.to_statement(dialect, params), keyword)
        }
        BinaryOp::In | BinaryOp::NotIn => match right {
            // Nothing is in an empty list.
            Condition::List(values) if values.is_empty() => {
                String::from(if op == BinaryOp::In { "1 = 0" } else { "1 = 1" })
            }
            Condition::List(values) => {
                let subject = left.to_statement(dialect, params);
                format!("{} {} {}", subject, op.symbol(), render_list(values, dialect, params))
            }
            other => {
                let subject = left.to_statement(dialect, params);
                format!("{} {} ({})", subject, op.symbol(), other.to_statement(dialect, params))
            }
        },
        BinaryOp::Or => format!(
            "({} OR {})",
            left.to_statement(dialect, params),
            right.to_statement(dialect, params)
        ),
        _ if op.is_arithmetic() => format!(
            "({} {} {})",
            left.to_statement(dialect, params),
            op.symbol(),
            right.to_statement(dialect, params)
        ),
        _ => format!(
            "{} {} {}",
            left.to_statement(dialect, params),
            op.symbol(),
            right.to_statement(dialect, params)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::AnsiDialect;
    use pretty_assertions::assert_eq;

    fn render(condition: &Condition) -> (String, Parameters) {
        let mut params = Parameters::new();
        let sql = condition.to_statement(&AnsiDialect, &mut params);
        (sql, params)
    }

    fn age() -> Condition {
        Condition::column("Author", "Age")
    }

    #[test]
    fn test_equality_renders_parameter() {
        let (sql, params) = render(&Condition::binary(BinaryOp::Equal, age(), Condition::literal(5)));

        assert_eq!(sql, "[Author].[Age] = @p0");
        assert_eq!(params.get("@p0"), Some(&Value::Int32(5)));
    }

    #[test]
    fn test_or_is_parenthesized() {
        let condition = Condition::binary(
            BinaryOp::Equal,
            Condition::column("Author", "Id"),
            Condition::literal(1i64),
        )
        .or(Condition::binary(
            BinaryOp::Equal,
            Condition::column("Author", "Name"),
            Condition::literal("n"),
        ));
        let (sql, params) = render(&condition);

        assert_eq!(sql, "([Author].[Id] = @p0 OR [Author].[Name] = @p1)");
        assert_eq!(params.values(), vec![&Value::Int64(1), &Value::String("n".into())]);
    }

    #[test]
    fn test_null_comparisons() {
        let is_null = Condition::binary(BinaryOp::Equal, age(), Condition::Literal(Value::Null));
        let not_null = Condition::binary(BinaryOp::NotEqual, Condition::Literal(Value::Null), age());

        assert_eq!(render(&is_null).0, "[Author].[Age] IS NULL");
        assert_eq!(render(&not_null).0, "[Author].[Age] IS NOT NULL");
        assert!(render(&is_null).1.is_empty());
    }

    #[test]
    fn test_in_list_expands_in_order() {
        let list: Arc<[Value]> = vec![Value::Int32(3), Value::Int32(1), Value::Int32(2)].into();
        let condition = Condition::binary(BinaryOp::In, age(), Condition::List(list));
        let (sql, params) = render(&condition);

        assert_eq!(sql, "[Author].[Age] IN (@p0, @p1, @p2)");
        assert_eq!(params.get("@p0"), Some(&Value::Int32(3)));
        assert_eq!(params.get("@p2"), Some(&Value::Int32(2)));
    }

    #[test]
    fn test_empty_in_lists() {
        let empty: Arc<[Value]> = Vec::new().into();
        let in_empty = Condition::binary(BinaryOp::In, age(), Condition::List(empty.clone()));
        let not_in_empty = Condition::binary(BinaryOp::NotIn, age(), Condition::List(empty));

        assert_eq!(render(&in_empty).0, "1 = 0");
        assert_eq!(render(&not_in_empty).0, "1 = 1");
    }

    #[test]
    fn test_arithmetic_and_unary() {
        let sum = Condition::binary(BinaryOp::Add, age(), Condition::literal(1));
        let condition = Condition::binary(BinaryOp::Greater, sum, Condition::literal(30));
        assert_eq!(render(&condition).0, "([Author].[Age] + @p0) > @p1");

        let negated = Condition::unary(UnaryOp::Not, condition);
        assert_eq!(render(&negated).0, "NOT (([Author].[Age] + @p0) > @p1)");

        assert_eq!(render(&Condition::unary(UnaryOp::Negate, age())).0, "-[Author].[Age]");
    }

    #[test]
    fn test_join_on() {
        let on = Condition::JoinOn {
            left: ColumnRef::new("Book", "AuthorId"),
            right: ColumnRef::new("Author", "Id"),
        };
        assert_eq!(render(&on).0, "[Book].[AuthorId] = [Author].[Id]");
    }
}
