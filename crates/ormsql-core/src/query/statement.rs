//! Statement assembly and rendering.

use std::sync::Arc;

use super::condition::{ColumnRef, Condition};
use crate::catalog::{EntityDescriptor, SortOrder};
use crate::dialect::{Dialect, Parameters};
use crate::error::Error;
use crate::value::Value;

/// Kind of join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    /// Rows must match on both sides.
    #[default]
    Inner,
    /// Rows of the left side survive without a match.
    Left,
}

impl JoinKind {
    fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

/// Which reference slot a join fills during materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JoinLink {
    /// Position of the owning entity (0 is the root).
    pub owner: usize,
    /// Position of the attached entity.
    pub target: usize,
    /// Reference name on the owner.
    pub reference: String,
}

#[derive(Debug, Clone)]
pub(crate) struct JoinClause {
    pub kind: JoinKind,
    pub entity: Arc<EntityDescriptor>,
    pub on: Condition,
    pub link: Option<JoinLink>,
}

/// What a select returns.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Projection {
    /// Every field of every entity in scope, aliased.
    Entities,
    /// `COUNT(*)`
    Count,
    /// `SUM(expr)`
    Sum(Condition),
}

#[derive(Debug, Clone)]
pub(crate) struct SelectStatement {
    pub root: Arc<EntityDescriptor>,
    pub joins: Vec<JoinClause>,
    pub filter: Option<Condition>,
    pub order: Vec<(Condition, SortOrder)>,
    pub group: Vec<Condition>,
    pub projection: Projection,
    pub limit: Option<usize>,
}

/// SQL text plus its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedStatement {
    /// SQL text, terminated by `;`.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Parameters,
}

impl SelectStatement {
    pub(crate) fn new(root: Arc<EntityDescriptor>) -> Self {
        Self {
            root,
            joins: Vec::new(),
            filter: None,
            order: Vec::new(),
            group: Vec::new(),
            projection: Projection::Entities,
            limit: None,
        }
    }

    /// Entities in projection order: the root, then joins.
    pub(crate) fn entities(&self) -> impl Iterator<Item = &Arc<EntityDescriptor>> {
        std::iter::once(&self.root).chain(self.joins.iter().map(|j| &j.entity))
    }

    pub(crate) fn render(&self, dialect: &dyn Dialect) -> Result<RenderedStatement, Error> {
        if !self.group.is_empty() && self.projection == Projection::Entities {
            return Err(Error::InvalidStatement(format!(
                "grouping {} requires an aggregate",
                self.root.name
            )));
        }
        for (i, join) in self.joins.iter().enumerate() {
            let duplicate = self
                .entities()
                .take(i + 1)
                .any(|e| e.store_name.eq_ignore_ascii_case(&join.entity.store_name));
            if duplicate {
                return Err(Error::InvalidStatement(format!(
                    "entity {} appears twice in one query",
                    join.entity.name
                )));
            }
        }

        let mut params = Parameters::new();
        let mut sql = String::from("SELECT ");
        if let Some(top) = self.limit.and_then(|n| dialect.top_prefix(n)) {
            sql.push_str(&top);
            sql.push(' ');
        }

        let mut columns = Vec::new();
        columns.extend(self.group.iter().map(|g| g.to_statement(dialect, &mut params)));
        match &self.projection {
            Projection::Entities => {
                for entity in self.entities() {
                    let table = dialect.quote(&entity.store_name);
                    for field in &entity.fields {
                        columns.push(format!(
                            "{}.{} AS {}",
                            table,
                            dialect.quote(&field.store_name),
                            dialect.quote(&field.alias)
                        ));
                    }
                }
            }
            Projection::Count => columns.push("COUNT(*)".to_string()),
            Projection::Sum(expr) => {
                columns.push(format!("SUM({})", expr.to_statement(dialect, &mut params)))
            }
        }
        sql.push_str(&columns.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(&dialect.quote(&self.root.store_name));

        for join in &self.joins {
            sql.push_str(&format!(
                " {} {} ON {}",
                join.kind.keyword(),
                dialect.quote(&join.entity.store_name),
                join.on.to_statement(dialect, &mut params)
            ));
        }

        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.to_statement(dialect, &mut params));
        }

        if !self.group.is_empty() {
            let mut group_params = Parameters::new();
            let keys: Vec<String> = self
                .group
                .iter()
                .map(|g| g.to_statement(dialect, &mut group_params))
                .collect();
            if !group_params.is_empty() {
                return Err(Error::InvalidStatement(
                    "group keys must not contain constants".to_string(),
                ));
            }
            sql.push_str(" GROUP BY ");
            sql.push_str(&keys.join(", "));
        }

        // Ordering an ungrouped aggregate has no effect; leave it out.
        let ordered = self.projection == Projection::Entities || !self.group.is_empty();
        if ordered && !self.order.is_empty() {
            let keys: Vec<String> = self
                .order
                .iter()
                .map(|(key, order)| {
                    format!("{} {}", key.to_statement(dialect, &mut params), order.keyword())
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        if let Some(limit) = self.limit.and_then(|n| dialect.limit_suffix(n)) {
            sql.push(' ');
            sql.push_str(&limit);
        }
        sql.push(';');

        Ok(RenderedStatement { sql, params })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct UpdateStatement {
    pub entity: Arc<EntityDescriptor>,
    pub assignments: Vec<(ColumnRef, Condition)>,
    pub filter: Option<Condition>,
}

impl UpdateStatement {
    pub(crate) fn render(&self, dialect: &dyn Dialect) -> Result<RenderedStatement, Error> {
        if self.assignments.is_empty() {
            return Err(Error::NoSetClause(self.entity.name.clone()));
        }

        let mut params = Parameters::new();
        let sets: Vec<String> = self
            .assignments
            .iter()
            .map(|(target, value)| {
                let target = if dialect.qualify_update_targets() {
                    target.qualified(dialect)
                } else {
                    dialect.quote(&target.column)
                };
                format!("{} = {}", target, value.to_statement(dialect, &mut params))
            })
            .collect();

        let mut sql = format!(
            "UPDATE {} SET {}",
            dialect.quote(&self.entity.store_name),
            sets.join(", ")
        );
        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.to_statement(dialect, &mut params));
        }
        sql.push(';');

        Ok(RenderedStatement { sql, params })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DeleteStatement {
    pub entity: Arc<EntityDescriptor>,
    pub filter: Option<Condition>,
}

impl DeleteStatement {
    pub(crate) fn render(&self, dialect: &dyn Dialect) -> RenderedStatement {
        let mut params = Parameters::new();
        let mut sql = format!("DELETE FROM {}", dialect.quote(&self.entity.store_name));
        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.to_statement(dialect, &mut params));
        }
        sql.push(';');
        RenderedStatement { sql, params }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct InsertStatement {
    pub entity: Arc<EntityDescriptor>,
    /// Column names and values, in field order.
    pub values: Vec<(String, Value)>,
}

impl InsertStatement {
    pub(crate) fn render(&self, dialect: &dyn Dialect) -> RenderedStatement {
        let mut params = Parameters::new();
        let table = dialect.quote(&self.entity.store_name);
        if self.values.is_empty() {
            return RenderedStatement {
                sql: format!("INSERT INTO {} DEFAULT VALUES;", table),
                params,
            };
        }

        let columns: Vec<String> = self.values.iter().map(|(c, _)| dialect.quote(c)).collect();
        let placeholders: Vec<String> = self
            .values
            .iter()
            .map(|(_, v)| dialect.add_param(v.clone(), &mut params))
            .collect();
        RenderedStatement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({});",
                table,
                columns.join(", "),
                placeholders.join(", ")
            ),
            params,
        }
    }
}
