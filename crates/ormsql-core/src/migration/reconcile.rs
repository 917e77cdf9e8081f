//! Applies additive schema changes for every registered entity.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::diff::{plan_table, LiveTable, SchemaChange};
use crate::catalog::{EntityDescriptor, MetadataRegistry};
use crate::dialect::Parameters;
use crate::error::Error;
use crate::storage::{Access, Connection, Engine};

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Whether the store itself had to be created.
    pub created_store: bool,
    /// Changes applied, in execution order.
    pub changes: Vec<SchemaChange>,
    /// Drift that was detected but left alone.
    pub warnings: Vec<String>,
}

impl ReconcileReport {
    /// Whether the run changed nothing and found no drift.
    pub fn is_empty(&self) -> bool {
        !self.created_store && self.changes.is_empty() && self.warnings.is_empty()
    }
}

/// Brings the live store in line with the registry.
///
/// Only additive changes are made: missing tables, columns, keys and
/// indexes are created. Type and nullability drift is reported in the
/// [`ReconcileReport`] and logged, never altered.
pub struct SchemaReconciler<'e> {
    engine: &'e Engine,
}

impl<'e> SchemaReconciler<'e> {
    /// Create a reconciler for an engine.
    pub fn new(engine: &'e Engine) -> Self {
        Self { engine }
    }

    /// Run reconciliation.
    pub fn run(&self) -> Result<ReconcileReport, Error> {
        let mut report = ReconcileReport::default();
        if !self.engine.store_exists()? {
            self.engine.create_store()?;
            report.created_store = true;
        }

        let registry = self.engine.registry();
        let entities = creation_order(registry);
        debug!(entities = entities.len(), "Reconciling schema");

        self.engine.with_connection(Access::Write, |conn| {
            for entity in &entities {
                self.reconcile_table(conn, registry, entity, &mut report)?;
            }
            Ok(())
        })?;

        info!(
            changes = report.changes.len(),
            warnings = report.warnings.len(),
            "Schema reconciled"
        );
        Ok(report)
    }

    fn reconcile_table(
        &self,
        conn: &mut dyn Connection,
        registry: &MetadataRegistry,
        entity: &EntityDescriptor,
        report: &mut ReconcileReport,
    ) -> Result<(), Error> {
        let dialect = self.engine.dialect();
        let checker = dialect.schema_checker();
        let live = if checker.table_exists(conn, &entity.store_name)? {
            Some(LiveTable::read(checker.as_ref(), conn, &entity.store_name)?)
        } else {
            None
        };

        let plan = plan_table(dialect, registry, entity, live.as_ref());
        for planned in plan.changes {
            debug!(sql = %planned.sql, "Executing statement");
            conn.execute(&planned.sql, &Parameters::new())?;
            info!(
                table = planned.change.table(),
                change = %planned.change,
                "Applied schema change"
            );
            report.changes.push(planned.change);
        }
        for warning in plan.warnings {
            warn!(table = %entity.store_name, "{}", warning);
            report.warnings.push(warning);
        }
        Ok(())
    }
}

/// Registered entities ordered so foreign key targets come first.
fn creation_order(registry: &MetadataRegistry) -> Vec<Arc<EntityDescriptor>> {
    let mut entities = registry.descriptors();
    entities.sort_by(|a, b| a.name.cmp(&b.name));

    let mut ordered = Vec::with_capacity(entities.len());
    let mut visited = HashSet::new();
    for entity in &entities {
        visit(registry, entity, &mut visited, &mut ordered);
    }
    ordered
}

fn visit(
    registry: &MetadataRegistry,
    entity: &Arc<EntityDescriptor>,
    visited: &mut HashSet<String>,
    ordered: &mut Vec<Arc<EntityDescriptor>>,
) {
    if !visited.insert(entity.name.clone()) {
        return;
    }
    for fk in &entity.foreign_keys {
        if let Ok(target) = registry.lookup(&fk.target_entity) {
            visit(registry, &target, visited, ordered);
        }
    }
    ordered.push(Arc::clone(entity));
}
