//! DDL rendering for tables, columns, keys and indexes.

use crate::catalog::{
    EntityDescriptor, FieldDescriptor, ForeignKeyDescriptor, IndexDescriptor, MetadataRegistry,
};
use crate::dialect::Dialect;

/// Column definition as used inside `CREATE TABLE`.
fn column_definition(
    dialect: &dyn Dialect,
    entity: &EntityDescriptor,
    field: &FieldDescriptor,
) -> String {
    let mut sql = format!("{} {}", dialect.quote(&field.store_name), dialect.column_type(field));
    let identity = field.primary_key
        && entity.primary_key.as_ref().is_some_and(|pk| pk.is_identity());
    if identity {
        sql.push(' ');
        sql.push_str(dialect.identity_clause());
        if dialect.inline_identity_primary_key() {
            return sql;
        }
    }
    if !field.nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &field.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&dialect.default_literal(default));
    }
    sql
}

/// Target table and column of a foreign key, by registered names when the
/// target is known.
fn foreign_key_target(registry: &MetadataRegistry, fk: &ForeignKeyDescriptor) -> (String, String) {
    match registry.lookup(&fk.target_entity) {
        Ok(target) => {
            let column = target
                .field(&fk.target_field)
                .map(|f| f.store_name.clone())
                .unwrap_or_else(|| fk.target_field.clone());
            (target.store_name.clone(), column)
        }
        Err(_) => (fk.target_entity.clone(), fk.target_field.clone()),
    }
}

fn foreign_key_clause(
    dialect: &dyn Dialect,
    registry: &MetadataRegistry,
    fk: &ForeignKeyDescriptor,
) -> String {
    let (table, column) = foreign_key_target(registry, fk);
    format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        dialect.quote(&fk.name),
        dialect.quote(&fk.column),
        dialect.quote(&table),
        dialect.quote(&column)
    )
}

/// `CREATE TABLE` with columns, primary key and foreign keys.
pub(crate) fn create_table_sql(
    dialect: &dyn Dialect,
    registry: &MetadataRegistry,
    entity: &EntityDescriptor,
) -> String {
    let mut items: Vec<String> = entity
        .fields
        .iter()
        .map(|f| column_definition(dialect, entity, f))
        .collect();

    if let Some(pk) = &entity.primary_key {
        if !(pk.is_identity() && dialect.inline_identity_primary_key()) {
            items.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                dialect.quote(&pk.name),
                dialect.quote(&pk.column)
            ));
        }
    }
    items.extend(
        entity
            .foreign_keys
            .iter()
            .map(|fk| foreign_key_clause(dialect, registry, fk)),
    );

    format!(
        "CREATE TABLE {} ({});",
        dialect.quote(&entity.store_name),
        items.join(", ")
    )
}

/// `CREATE INDEX` for one index.
pub(crate) fn create_index_sql(
    dialect: &dyn Dialect,
    table: &str,
    index: &IndexDescriptor,
) -> String {
    let columns: Vec<String> = index
        .columns
        .iter()
        .map(|(column, order)| format!("{} {}", dialect.quote(column), order.keyword()))
        .collect();
    format!(
        "CREATE {}INDEX {} ON {} ({});",
        if index.unique { "UNIQUE " } else { "" },
        dialect.quote(&index.name),
        dialect.quote(table),
        columns.join(", ")
    )
}

/// `ALTER TABLE` adding one column. Required columns carry a default so
/// existing rows can be backfilled.
pub(crate) fn add_column_sql(
    dialect: &dyn Dialect,
    table: &str,
    field: &FieldDescriptor,
) -> String {
    let mut sql = format!(
        "ALTER TABLE {} {} {} {}",
        dialect.quote(table),
        dialect.add_column_keyword(),
        dialect.quote(&field.store_name),
        dialect.column_type(field)
    );
    if !field.nullable {
        sql.push_str(" NOT NULL DEFAULT ");
        sql.push_str(&dialect.backfill_literal(field));
    } else if let Some(default) = &field.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&dialect.default_literal(default));
    }
    sql.push(';');
    sql
}

/// `ALTER TABLE` adding the primary key.
pub(crate) fn add_primary_key_sql(
    dialect: &dyn Dialect,
    entity: &EntityDescriptor,
) -> Option<String> {
    entity.primary_key.as_ref().map(|pk| {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({});",
            dialect.quote(&entity.store_name),
            dialect.quote(&pk.name),
            dialect.quote(&pk.column)
        )
    })
}

/// `ALTER TABLE` adding one foreign key.
pub(crate) fn add_foreign_key_sql(
    dialect: &dyn Dialect,
    registry: &MetadataRegistry,
    table: &str,
    fk: &ForeignKeyDescriptor,
) -> String {
    format!(
        "ALTER TABLE {} ADD {};",
        dialect.quote(table),
        foreign_key_clause(dialect, registry, fk)
    )
}
