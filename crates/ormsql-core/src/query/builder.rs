//! Typed query and update builders.
//!
//! Builders only record what the caller asked for. Field names, joins and
//! constants are resolved when a terminal method runs, against the full set
//! of entities in the query, so a filter may mention an entity joined later
//! in the chain. The first builder error is kept and returned by the
//! terminal.

use std::marker::PhantomData;
use std::sync::Arc;
use std::vec;

use tracing::debug;

use super::compiler::{compile, Scope};
use super::condition::{ColumnRef, Condition};
use super::expr::{Expr, IntoExpr};
use super::materialize::{MaterializePlan, Materializer};
use super::statement::{
    DeleteStatement, JoinClause, JoinKind, JoinLink, Projection, RenderedStatement,
    SelectStatement, UpdateStatement,
};
use crate::catalog::{EntityDescriptor, SortOrder};
use crate::error::Error;
use crate::model::{AnyEntity, Entity};
use crate::storage::{Engine, PooledConnection};
use crate::value::Value;

struct PendingJoin {
    kind: JoinKind,
    left: Arc<EntityDescriptor>,
    right: Arc<EntityDescriptor>,
    on: Option<Expr>,
}

/// One row of a grouped aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    /// Values of the group keys, in `group_by` order.
    pub keys: Vec<Value>,
    /// The aggregate.
    pub value: Value,
}

/// A select over entity `T`, optionally joined to other entities.
pub struct Query<'e, T: Entity> {
    engine: &'e Engine,
    root: Option<Arc<EntityDescriptor>>,
    error: Option<Error>,
    joins: Vec<PendingJoin>,
    filters: Vec<Expr>,
    order: Vec<(Expr, SortOrder)>,
    group: Vec<Expr>,
    limit: Option<usize>,
    _marker: PhantomData<fn() -> T>,
}

impl<'e, T: Entity> Query<'e, T> {
    pub(crate) fn new(engine: &'e Engine) -> Self {
        let (root, error) = match engine.descriptor::<T>() {
            Ok(root) => (Some(root), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            engine,
            root,
            error,
            joins: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
            group: Vec::new(),
            limit: None,
            _marker: PhantomData,
        }
    }

    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn push_join(
        &mut self,
        kind: JoinKind,
        left: Result<Arc<EntityDescriptor>, Error>,
        right: Result<Arc<EntityDescriptor>, Error>,
        on: Option<Expr>,
    ) {
        match (left, right) {
            (Ok(left), Ok(right)) => self.joins.push(PendingJoin {
                kind,
                left,
                right,
                on,
            }),
            (Err(e), _) | (_, Err(e)) => self.fail(e),
        }
    }

    /// Inner join `R` to `L`, which must already be in the query, over the
    /// single reference linking them.
    pub fn join<L: Entity, R: Entity>(mut self) -> Self {
        let (left, right) = (self.engine.descriptor::<L>(), self.engine.descriptor::<R>());
        self.push_join(JoinKind::Inner, left, right, None);
        self
    }

    /// Left join `R` to `L`; rows of `L` without a match are kept.
    pub fn left_join<L: Entity, R: Entity>(mut self) -> Self {
        let (left, right) = (self.engine.descriptor::<L>(), self.engine.descriptor::<R>());
        self.push_join(JoinKind::Left, left, right, None);
        self
    }

    /// Join `R` on an explicit condition. Joined rows are filterable but
    /// no reference slot is populated.
    pub fn join_on<R: Entity>(mut self, kind: JoinKind, on: Expr) -> Self {
        let left = self
            .root
            .clone()
            .ok_or_else(|| Error::EntityNotFound(std::any::type_name::<T>().to_string()));
        let right = self.engine.descriptor::<R>();
        self.push_join(kind, left, right, Some(on));
        self
    }

    /// Restrict rows; repeated calls are combined with `AND`.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filters.push(predicate);
        self
    }

    /// Order by an ascending key, after any keys already given.
    pub fn order_by(mut self, key: Expr) -> Self {
        self.order.push((key, SortOrder::Asc));
        self
    }

    /// Order by a descending key, after any keys already given.
    pub fn order_by_desc(mut self, key: Expr) -> Self {
        self.order.push((key, SortOrder::Desc));
        self
    }

    /// Add an ascending tie-breaker.
    pub fn then_by(mut self, key: Expr) -> Self {
        self.order.push((key, SortOrder::Asc));
        self
    }

    /// Add a descending tie-breaker.
    pub fn then_by_desc(mut self, key: Expr) -> Self {
        self.order.push((key, SortOrder::Desc));
        self
    }

    /// Add a grouping key for `count_by` and `sum_by`.
    pub fn group_by(mut self, key: Expr) -> Self {
        self.group.push(key);
        self
    }

    fn build(self, projection: Projection) -> Result<(SelectStatement, &'e Engine), Error> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let root = self
            .root
            .ok_or_else(|| Error::EntityNotFound(std::any::type_name::<T>().to_string()))?;

        let mut scope = vec![Arc::clone(&root)];
        let mut joins = Vec::with_capacity(self.joins.len());
        for pending in &self.joins {
            let clause = resolve_join(&scope, pending)?;
            scope.push(Arc::clone(&pending.right));
            joins.push(clause);
        }
        let resolver = Scope::new(&scope);

        let mut filter: Option<Condition> = None;
        for predicate in &self.filters {
            let compiled = compile(predicate, &resolver)?;
            filter = Some(match filter {
                Some(existing) => existing.and(compiled),
                None => compiled,
            });
        }
        let order = self
            .order
            .iter()
            .map(|(key, order)| Ok((compile(key, &resolver)?, *order)))
            .collect::<Result<Vec<_>, Error>>()?;
        let group = self
            .group
            .iter()
            .map(|key| compile(key, &resolver))
            .collect::<Result<Vec<_>, Error>>()?;

        let mut select = SelectStatement::new(root);
        select.joins = joins;
        select.filter = filter;
        select.order = order;
        select.group = group;
        select.projection = projection;
        select.limit = self.limit;
        Ok((select, self.engine))
    }

    /// Render the entity select without executing it.
    pub fn render(self) -> Result<RenderedStatement, Error> {
        let (select, engine) = self.build(Projection::Entities)?;
        select.render(engine.dialect())
    }

    /// Execute and iterate the distinct root entities.
    ///
    /// The connection stays checked out until the iterator is exhausted or
    /// dropped.
    pub fn iter(self) -> Result<QueryIter<T>, Error> {
        let (select, engine) = self.build(Projection::Entities)?;
        let plan = MaterializePlan::for_select(&select)?;
        let rendered = select.render(engine.dialect())?;
        let (rows, lease) = engine.fetch(&rendered)?;
        debug!(
            entity = %select.root.name,
            rows = rows.len(),
            "Query fetched"
        );
        Ok(QueryIter {
            rows: rows.rows.into_iter(),
            materializer: Materializer::new(plan),
            lease,
            _marker: PhantomData,
        })
    }

    /// Execute and collect every root entity.
    pub fn all(self) -> Result<Vec<Arc<T>>, Error> {
        self.iter()?.collect()
    }

    /// Execute with a row limit and collect.
    ///
    /// The limit counts joined rows, so a one-to-many join may yield fewer
    /// than `n` roots.
    pub fn top(mut self, n: usize) -> Result<Vec<Arc<T>>, Error> {
        self.limit = Some(n);
        self.all()
    }

    /// The first root entity, if any.
    pub fn first(self) -> Result<Option<Arc<T>>, Error> {
        Ok(self.top(1)?.into_iter().next())
    }

    /// Number of rows matching the query.
    pub fn count(self) -> Result<u64, Error> {
        let (select, engine) = self.build(Projection::Count)?;
        let rendered = select.render(engine.dialect())?;
        let count = engine.scalar(&rendered)?;
        count
            .as_i64()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| Error::InvalidStatement(format!("COUNT returned {}", count)))
    }

    /// Sum of an expression over matching rows; null when nothing matched.
    pub fn sum(self, expr: Expr) -> Result<Value, Error> {
        let (select, engine) = self.sum_select(expr)?;
        let rendered = select.render(engine.dialect())?;
        engine.scalar(&rendered)
    }

    fn sum_select(self, expr: Expr) -> Result<(SelectStatement, &'e Engine), Error> {
        let (mut select, engine) = self.build(Projection::Count)?;
        let scope: Vec<Arc<EntityDescriptor>> = select.entities().cloned().collect();
        select.projection = Projection::Sum(compile(&expr, &Scope::new(&scope))?);
        Ok((select, engine))
    }

    /// Row count per group.
    pub fn count_by(self) -> Result<Vec<GroupRow>, Error> {
        let (select, engine) = self.build(Projection::Count)?;
        grouped(engine, &select)
    }

    /// Sum of an expression per group.
    pub fn sum_by(self, expr: Expr) -> Result<Vec<GroupRow>, Error> {
        let (select, engine) = self.sum_select(expr)?;
        grouped(engine, &select)
    }

    /// Delete every row matching the filter.
    pub fn delete(self) -> Result<u64, Error> {
        if !self.joins.is_empty() {
            return Err(Error::InvalidStatement(
                "delete cannot be combined with joins".to_string(),
            ));
        }
        let (select, engine) = self.build(Projection::Count)?;
        let delete = DeleteStatement {
            entity: select.root,
            filter: select.filter,
        };
        engine.run(&delete.render(engine.dialect()))
    }
}

fn grouped(engine: &Engine, select: &SelectStatement) -> Result<Vec<GroupRow>, Error> {
    let rendered = select.render(engine.dialect())?;
    let keys = select.group.len();
    let rows = engine.rows(&rendered)?;
    Ok(rows
        .rows
        .into_iter()
        .map(|mut row| {
            let value = if row.len() > keys { row.remove(keys) } else { Value::Null };
            row.truncate(keys);
            GroupRow { keys: row, value }
        })
        .collect())
}

/// Resolve one join against the entities already in scope.
fn resolve_join(scope: &[Arc<EntityDescriptor>], pending: &PendingJoin) -> Result<JoinClause, Error> {
    let right = &pending.right;
    let target = scope.len();

    if let Some(on) = &pending.on {
        let mut extended = scope.to_vec();
        extended.push(Arc::clone(right));
        return Ok(JoinClause {
            kind: pending.kind,
            entity: Arc::clone(right),
            on: compile(on, &Scope::new(&extended))?,
            link: None,
        });
    }

    let left = &pending.left;
    let resolution_error = |reason: String| Error::JoinResolution {
        left: left.name.clone(),
        right: right.name.clone(),
        reason,
    };
    let owner = scope
        .iter()
        .position(|d| Arc::ptr_eq(d, left))
        .ok_or_else(|| resolution_error("left entity is not part of the query".to_string()))?;

    // Each candidate is (left column, right column, link).
    let mut candidates: Vec<(String, String, JoinLink)> = Vec::new();
    for reference in left.references_to(right) {
        let local = left.require_field(&reference.local_field)?;
        let foreign = right.require_field(&reference.foreign_field)?;
        candidates.push((
            local.store_name.clone(),
            foreign.store_name.clone(),
            JoinLink {
                owner,
                target,
                reference: reference.name.clone(),
            },
        ));
    }
    for reference in right.references_to(left) {
        let local = right.require_field(&reference.local_field)?;
        let foreign = left.require_field(&reference.foreign_field)?;
        let pair = (foreign.store_name.clone(), local.store_name.clone());
        // The same link seen from the other side; keep the left's slot.
        if candidates.iter().any(|(l, r, _)| (l, r) == (&pair.0, &pair.1)) {
            continue;
        }
        candidates.push((
            pair.0,
            pair.1,
            JoinLink {
                owner: target,
                target: owner,
                reference: reference.name.clone(),
            },
        ));
    }

    let (left_column, right_column, link) = match candidates.len() {
        1 => candidates.remove(0),
        0 => return Err(resolution_error("no reference links them".to_string())),
        n => {
            return Err(resolution_error(format!(
                "{} references link them; use an explicit join condition",
                n
            )))
        }
    };

    Ok(JoinClause {
        kind: pending.kind,
        entity: Arc::clone(right),
        on: Condition::JoinOn {
            left: ColumnRef::new(&left.store_name, left_column),
            right: ColumnRef::new(&right.store_name, right_column),
        },
        link: Some(link),
    })
}

/// Lazily materialized results of one query.
pub struct QueryIter<T> {
    rows: vec::IntoIter<Vec<Value>>,
    materializer: Materializer,
    lease: Option<PooledConnection>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> QueryIter<T> {
    /// Whether a pooled connection is still checked out for this iterator.
    pub fn holds_connection(&self) -> bool {
        self.lease.is_some()
    }
}

fn downcast<T: Entity>(entity: AnyEntity) -> Result<Arc<T>, Error> {
    entity.downcast::<T>().map_err(|_| Error::Materialize {
        entity: std::any::type_name::<T>().to_string(),
        field: String::new(),
        reason: "root entity has a different type".to_string(),
    })
}

impl<T: Entity> Iterator for QueryIter<T> {
    type Item = Result<Arc<T>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        for row in self.rows.by_ref() {
            match self.materializer.process_row(&row) {
                Ok(Some(entity)) => return Some(downcast(entity)),
                Ok(None) => continue,
                Err(e) => {
                    self.lease = None;
                    return Some(Err(e));
                }
            }
        }
        self.lease = None;
        None
    }
}

/// A bulk update of entity `T`.
pub struct Update<'e, T: Entity> {
    engine: &'e Engine,
    root: Result<Arc<EntityDescriptor>, Error>,
    assignments: Vec<(String, Expr)>,
    filters: Vec<Expr>,
    _marker: PhantomData<fn() -> T>,
}

impl<'e, T: Entity> Update<'e, T> {
    pub(crate) fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            root: engine.descriptor::<T>(),
            assignments: Vec::new(),
            filters: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Assign a field; the value may reference the row's current fields.
    pub fn set(mut self, field: impl Into<String>, value: impl IntoExpr) -> Self {
        self.assignments.push((field.into(), value.into_expr()));
        self
    }

    /// Restrict the rows updated; repeated calls are combined with `AND`.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filters.push(predicate);
        self
    }

    fn build(self) -> Result<(UpdateStatement, &'e Engine), Error> {
        let root = self.root?;
        if self.assignments.is_empty() {
            return Err(Error::NoSetClause(root.name.clone()));
        }
        let scope = [Arc::clone(&root)];
        let resolver = Scope::new(&scope);

        let mut assignments = Vec::with_capacity(self.assignments.len());
        for (name, value) in &self.assignments {
            let field = root.require_field(name)?;
            if !field.settable {
                return Err(Error::FieldNotSettable {
                    entity: root.name.clone(),
                    field: field.name.clone(),
                });
            }
            assignments.push((
                ColumnRef::new(&root.store_name, &field.store_name),
                compile(value, &resolver)?,
            ));
        }

        let mut filter: Option<Condition> = None;
        for predicate in &self.filters {
            let compiled = compile(predicate, &resolver)?;
            filter = Some(match filter {
                Some(existing) => existing.and(compiled),
                None => compiled,
            });
        }

        Ok((
            UpdateStatement {
                entity: root,
                assignments,
                filter,
            },
            self.engine,
        ))
    }

    /// Render without executing.
    pub fn render(self) -> Result<RenderedStatement, Error> {
        let (update, engine) = self.build()?;
        update.render(engine.dialect())
    }

    /// Execute, returning the number of rows changed.
    pub fn execute(self) -> Result<u64, Error> {
        let (update, engine) = self.build()?;
        let rendered = update.render(engine.dialect())?;
        engine.run(&rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::{field, field_of, value};
    use crate::storage::{Engine, RowSet};
    use crate::testing::{Author, Book, MockAdapter};
    use pretty_assertions::assert_eq;

    fn engine() -> (Engine, MockAdapter) {
        let adapter = MockAdapter::new();
        (Engine::new(Arc::new(adapter.clone())), adapter)
    }

    #[test]
    fn test_render_filter_before_join() {
        let (engine, _) = engine();
        let rendered = engine
            .query::<Book>()
            .filter(field_of::<Author>("Name").eq("Ann"))
            .join::<Book, Author>()
            .render()
            .unwrap();

        assert_eq!(
            rendered.sql,
            "SELECT [Book].[Id] AS [Book_Id], [Book].[Title] AS [Book_Title], \
             [Book].[AuthorId] AS [Book_AuthorId], [Author].[Id] AS [Author_Id], \
             [Author].[Name] AS [Author_Name], [Author].[Age] AS [Author_Age] \
             FROM [Book] INNER JOIN [Author] ON [Book].[AuthorId] = [Author].[Id] \
             WHERE [Author].[Name] = @p0;"
        );
    }

    #[test]
    fn test_filters_are_combined() {
        let (engine, _) = engine();
        let rendered = engine
            .query::<Author>()
            .filter(field("Age").gt(18))
            .filter(field("Name").ne("Bob"))
            .order_by(field("Name"))
            .then_by_desc(field("Age"))
            .render()
            .unwrap();

        assert!(rendered.sql.ends_with(
            "WHERE [Author].[Age] > @p0 AND [Author].[Name] <> @p1 \
             ORDER BY [Author].[Name] ASC, [Author].[Age] DESC;"
        ));
    }

    #[test]
    fn test_repeated_order_by_appends() {
        let (engine, _) = engine();
        let rendered = engine
            .query::<Author>()
            .order_by_desc(field("Age"))
            .order_by(field("Name"))
            .render()
            .unwrap();

        assert!(rendered
            .sql
            .ends_with("ORDER BY [Author].[Age] DESC, [Author].[Name] ASC;"));
    }

    #[test]
    fn test_join_from_one_side() {
        let (engine, _) = engine();
        let rendered = engine.query::<Author>().left_join::<Author, Book>().render().unwrap();
        assert!(rendered
            .sql
            .contains("FROM [Author] LEFT JOIN [Book] ON [Author].[Id] = [Book].[AuthorId]"));
    }

    #[test]
    fn test_join_errors() {
        let (engine, _) = engine();

        // Book is not in scope yet.
        let result = engine.query::<Author>().join::<Book, Author>().render();
        assert!(matches!(result, Err(Error::JoinResolution { .. })));

        let result = engine
            .query::<Author>()
            .join::<Author, Book>()
            .join::<Book, Author>()
            .render();
        assert!(matches!(result, Err(Error::InvalidStatement(_))));
    }

    #[test]
    fn test_explicit_join_condition() {
        let (engine, _) = engine();
        let rendered = engine
            .query::<Author>()
            .join_on::<Book>(JoinKind::Inner, field_of::<Book>("AuthorId").eq(field("Id")))
            .render()
            .unwrap();
        assert!(rendered
            .sql
            .contains("INNER JOIN [Book] ON [Book].[AuthorId] = [Author].[Id]"));
    }

    #[test]
    fn test_iter_materializes_and_releases() {
        let (engine, adapter) = engine();
        adapter.push_rows(RowSet::new(
            vec![],
            vec![
                vec![Value::Int64(1), Value::from("Ann"), Value::Int32(40)],
                vec![Value::Int64(2), Value::from("Bob"), Value::Null],
            ],
        ));

        let mut iter = engine.query::<Author>().iter().unwrap();
        assert!(iter.holds_connection());
        let first = iter.next().unwrap().unwrap();
        assert_eq!(first.name, "Ann");
        assert_eq!(first.age, Some(40));
        assert_eq!(iter.next().unwrap().unwrap().age, None);
        assert!(iter.next().is_none());
        assert!(!iter.holds_connection());
    }

    #[test]
    fn test_count_and_top() {
        let (engine, adapter) = engine();
        adapter.push_rows(RowSet::new(vec![], vec![vec![Value::Int64(7)]]));

        let count = engine.query::<Author>().filter(field("Age").ge(18)).count().unwrap();
        assert_eq!(count, 7);

        engine.query::<Author>().top(2).unwrap();
        let log = adapter.statements();
        assert_eq!(
            log[0].0,
            "SELECT COUNT(*) FROM [Author] WHERE [Author].[Age] >= @p0;"
        );
        assert!(log[1].0.starts_with("SELECT TOP 2 "));
    }

    #[test]
    fn test_grouped_sum() {
        let (engine, adapter) = engine();
        adapter.push_rows(RowSet::new(
            vec![],
            vec![
                vec![Value::from("Ann"), Value::Int64(3)],
                vec![Value::from("Bob"), Value::Int64(5)],
            ],
        ));

        let groups = engine
            .query::<Author>()
            .group_by(field("Name"))
            .sum_by(field("Age"))
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].keys, vec![Value::from("Bob")]);
        assert_eq!(groups[1].value, Value::Int64(5));
    }

    #[test]
    fn test_bulk_delete() {
        let (engine, adapter) = engine();
        adapter.push_affected(4);

        let deleted = engine.query::<Author>().filter(field("Age").lt(value(10) + 8)).delete().unwrap();
        assert_eq!(deleted, 4);
        assert_eq!(
            adapter.statements()[0].0,
            "DELETE FROM [Author] WHERE [Author].[Age] < @p0;"
        );
    }

    #[test]
    fn test_update_statement_rendering() {
        let (engine, adapter) = engine();
        engine
            .update::<Author>()
            .set("Age", field("Age") + 1)
            .filter(field("Name").eq("Ann"))
            .execute()
            .unwrap();

        assert_eq!(
            adapter.statements()[0].0,
            "UPDATE [Author] SET [Author].[Age] = ([Author].[Age] + @p0) WHERE [Author].[Name] = @p1;"
        );
    }

    #[test]
    fn test_update_errors_before_touching_store() {
        let (engine, adapter) = engine();

        let result = engine.update::<Author>().filter(field("Id").eq(1i64)).execute();
        assert!(matches!(result, Err(Error::NoSetClause(_))));

        let result = engine.update::<Author>().set("Id", 5i64).execute();
        assert!(matches!(result, Err(Error::FieldNotSettable { .. })));

        let result = engine.update::<Author>().set("Salary", 5).execute();
        assert!(matches!(result, Err(Error::UnknownField { .. })));

        assert!(adapter.statements().is_empty());
    }
}
