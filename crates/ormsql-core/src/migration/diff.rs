//! Comparison of registered entities against the live schema.
//!
//! Planning is pure: it reads a [`LiveTable`] snapshot and returns the
//! additive statements to run plus warnings for drift it will not touch.

use std::fmt;

use super::ddl;
use crate::catalog::{EntityDescriptor, MetadataRegistry};
use crate::dialect::{Dialect, LiveColumn, SchemaChecker};
use crate::error::Error;
use crate::storage::Connection;

/// Snapshot of one existing table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveTable {
    /// Columns in ordinal order.
    pub columns: Vec<LiveColumn>,
    /// Primary key columns.
    pub primary_key: Vec<String>,
    /// Local columns covered by foreign keys.
    pub foreign_keys: Vec<String>,
    /// Index names.
    pub indexes: Vec<String>,
}

impl LiveTable {
    /// Read a table through a schema checker.
    pub fn read(
        checker: &dyn SchemaChecker,
        conn: &mut dyn Connection,
        table: &str,
    ) -> Result<Self, Error> {
        Ok(Self {
            columns: checker.columns(conn, table)?,
            primary_key: checker.primary_key(conn, table)?,
            foreign_keys: checker.foreign_keys(conn, table)?,
            indexes: checker.indexes(conn, table)?,
        })
    }

    fn column(&self, name: &str) -> Option<&LiveColumn> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn has_foreign_key(&self, column: &str) -> bool {
        self.foreign_keys.iter().any(|c| c.eq_ignore_ascii_case(column))
    }

    fn has_index(&self, name: &str) -> bool {
        self.indexes.iter().any(|i| i.eq_ignore_ascii_case(name))
    }
}

/// One additive change applied by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    /// A missing table was created.
    CreateTable {
        /// Table name.
        table: String,
    },
    /// A missing column was added.
    AddColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// A missing index was created.
    CreateIndex {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },
    /// A missing primary key was added.
    AddPrimaryKey {
        /// Table name.
        table: String,
        /// Constraint name.
        constraint: String,
    },
    /// A missing foreign key was added.
    AddForeignKey {
        /// Table name.
        table: String,
        /// Constraint name.
        constraint: String,
    },
}

impl SchemaChange {
    /// Table the change applies to.
    pub fn table(&self) -> &str {
        match self {
            SchemaChange::CreateTable { table }
            | SchemaChange::AddColumn { table, .. }
            | SchemaChange::CreateIndex { table, .. }
            | SchemaChange::AddPrimaryKey { table, .. }
            | SchemaChange::AddForeignKey { table, .. } => table,
        }
    }
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaChange::CreateTable { table } => write!(f, "create table {}", table),
            SchemaChange::AddColumn { table, column } => {
                write!(f, "add column {}.{}", table, column)
            }
            SchemaChange::CreateIndex { table, index } => {
                write!(f, "create index {} on {}", index, table)
            }
            SchemaChange::AddPrimaryKey { table, constraint } => {
                write!(f, "add primary key {} to {}", constraint, table)
            }
            SchemaChange::AddForeignKey { table, constraint } => {
                write!(f, "add foreign key {} to {}", constraint, table)
            }
        }
    }
}

/// A change together with the statement that applies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedChange {
    pub change: SchemaChange,
    pub sql: String,
}

/// Everything needed to bring one table in line with its entity.
#[derive(Debug, Default)]
pub(crate) struct TablePlan {
    pub changes: Vec<PlannedChange>,
    pub warnings: Vec<String>,
}

fn base_type(declared: &str) -> String {
    declared
        .split('(')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_uppercase()
}

/// Plan the changes for one entity. `live` is `None` when the table does
/// not exist.
pub(crate) fn plan_table(
    dialect: &dyn Dialect,
    registry: &MetadataRegistry,
    entity: &EntityDescriptor,
    live: Option<&LiveTable>,
) -> TablePlan {
    let table = &entity.store_name;
    let mut plan = TablePlan::default();
    let index_change = |index: &crate::catalog::IndexDescriptor| PlannedChange {
        change: SchemaChange::CreateIndex {
            table: table.clone(),
            index: index.name.clone(),
        },
        sql: ddl::create_index_sql(dialect, table, index),
    };

    let Some(live) = live else {
        plan.changes.push(PlannedChange {
            change: SchemaChange::CreateTable {
                table: table.clone(),
            },
            sql: ddl::create_table_sql(dialect, registry, entity),
        });
        plan.changes.extend(entity.indexes.iter().map(index_change));
        return plan;
    };

    for field in &entity.fields {
        let Some(column) = live.column(&field.store_name) else {
            plan.changes.push(PlannedChange {
                change: SchemaChange::AddColumn {
                    table: table.clone(),
                    column: field.store_name.clone(),
                },
                sql: ddl::add_column_sql(dialect, table, field),
            });
            continue;
        };

        let expected = base_type(&dialect.column_type(field));
        let actual = base_type(&column.declared_type);
        if !actual.is_empty() && expected != actual {
            plan.warnings.push(format!(
                "column {}.{} is {} but the entity expects {}",
                table, column.name, column.declared_type, expected
            ));
        }
        // Stores report key columns inconsistently; only check the rest.
        if !field.primary_key && column.nullable != field.nullable {
            plan.warnings.push(format!(
                "column {}.{} nullability differs (store: {}, entity: {})",
                table,
                column.name,
                nullability(column.nullable),
                nullability(field.nullable)
            ));
        }
    }

    if let Some(pk) = &entity.primary_key {
        if live.primary_key.is_empty() {
            match ddl::add_primary_key_sql(dialect, entity) {
                Some(sql) if dialect.supports_alter_constraints() => {
                    plan.changes.push(PlannedChange {
                        change: SchemaChange::AddPrimaryKey {
                            table: table.clone(),
                            constraint: pk.name.clone(),
                        },
                        sql,
                    })
                }
                _ => plan.warnings.push(format!(
                    "table {} has no primary key and {} cannot add one",
                    table,
                    dialect.name()
                )),
            }
        }
    }

    for fk in &entity.foreign_keys {
        if live.has_foreign_key(&fk.column) {
            continue;
        }
        if dialect.supports_alter_constraints() {
            plan.changes.push(PlannedChange {
                change: SchemaChange::AddForeignKey {
                    table: table.clone(),
                    constraint: fk.name.clone(),
                },
                sql: ddl::add_foreign_key_sql(dialect, registry, table, fk),
            });
        } else {
            plan.warnings.push(format!(
                "foreign key {} is missing and {} cannot add it",
                fk.name,
                dialect.name()
            ));
        }
    }

    plan.changes.extend(
        entity
            .indexes
            .iter()
            .filter(|index| !live.has_index(&index.name))
            .map(index_change),
    );
    plan
}

fn nullability(nullable: bool) -> &'static str {
    if nullable {
        "NULL"
    } else {
        "NOT NULL"
    }
}
