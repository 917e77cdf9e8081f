//! Integration tests for schema reconciliation on SQLite.

mod common;

use pretty_assertions::assert_eq;

use common::{Author, Book, TestContext};
use ormsql_core::{
    EntityDef, Error, FieldDef, Parameter, Parameters, ScalarType, SchemaChange, Value,
};

fn create_table(ctx: &TestContext, sql: &str) {
    ctx.engine.execute(sql, &Parameters::new()).unwrap();
}

#[test]
fn test_fresh_store_is_created() {
    let ctx = TestContext::new();
    ctx.engine.register::<Author>().unwrap();
    ctx.engine.register::<Book>().unwrap();
    assert!(!ctx.engine.store_exists().unwrap());

    let report = ctx.engine.ensure_compatibility().unwrap();
    assert!(report.created_store);
    assert_eq!(
        report.changes,
        vec![
            SchemaChange::CreateTable {
                table: "Author".into()
            },
            SchemaChange::CreateTable {
                table: "Book".into()
            },
            SchemaChange::CreateIndex {
                table: "Book".into(),
                index: "IX_Book_AuthorId".into()
            },
        ]
    );
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
}

#[test]
fn test_reconcile_is_idempotent() {
    let ctx = TestContext::library();
    let report = ctx.engine.ensure_compatibility().unwrap();
    assert!(report.is_empty(), "{:?}", report);
}

#[test]
fn test_missing_column_is_added() {
    let ctx = TestContext::new();
    ctx.engine.create_store().unwrap();
    create_table(
        &ctx,
        "CREATE TABLE [Author] ([Id] INTEGER PRIMARY KEY AUTOINCREMENT, [Name] TEXT NOT NULL);",
    );
    let mut params = Parameters::new();
    params.push(Parameter::new("@p0", Value::from("Existing")));
    ctx.engine
        .execute("INSERT INTO [Author] ([Name]) VALUES (@p0);", &params)
        .unwrap();

    ctx.engine.register::<Author>().unwrap();
    let report = ctx.engine.ensure_compatibility().unwrap();
    assert_eq!(
        report.changes,
        vec![SchemaChange::AddColumn {
            table: "Author".into(),
            column: "Age".into()
        }]
    );

    let existing = ctx.engine.get::<Author>(1i64).unwrap();
    assert_eq!(existing.name, "Existing");
    assert_eq!(existing.age, None);

    let id = ctx.add_author("New", Some(30));
    assert_eq!(ctx.engine.get::<Author>(id).unwrap().age, Some(30));
}

#[test]
fn test_drift_is_reported_not_repaired() {
    let ctx = TestContext::new();
    ctx.engine.create_store().unwrap();
    create_table(
        &ctx,
        "CREATE TABLE [Book] ([Id] INTEGER PRIMARY KEY AUTOINCREMENT, \
         [Title] INTEGER NOT NULL, [AuthorId] INTEGER NOT NULL);",
    );
    ctx.engine.register::<Author>().unwrap();
    ctx.engine.register::<Book>().unwrap();

    let report = ctx.engine.ensure_compatibility().unwrap();
    assert_eq!(
        report.changes,
        vec![
            SchemaChange::CreateTable {
                table: "Author".into()
            },
            SchemaChange::CreateIndex {
                table: "Book".into(),
                index: "IX_Book_AuthorId".into()
            },
        ]
    );
    assert_eq!(report.warnings.len(), 2, "{:?}", report.warnings);
    assert!(report.warnings.iter().any(|w| w.contains("Title")));
    assert!(report.warnings.iter().any(|w| w.contains("FK_Book_AuthorId")));

    // Warnings repeat, changes do not.
    let again = ctx.engine.ensure_compatibility().unwrap();
    assert!(again.changes.is_empty());
    assert_eq!(again.warnings.len(), 2);
}

#[test]
fn test_reserved_names_fail_registration() {
    let ctx = TestContext::new();
    let err = ctx
        .engine
        .registry()
        .register_def(EntityDef::new("Order").with_field(FieldDef::new("Id", ScalarType::Int64)))
        .unwrap_err();
    assert!(matches!(err, Error::ReservedWord { .. }));

    let err = ctx
        .engine
        .registry()
        .register_def(
            EntityDef::new("Invoice").with_field(FieldDef::new("Select", ScalarType::Int64)),
        )
        .unwrap_err();
    assert!(matches!(err, Error::ReservedWord { .. }));
}

#[test]
fn test_delete_store() {
    let ctx = TestContext::library();
    assert!(ctx.engine.store_exists().unwrap());
    ctx.engine.delete_store().unwrap();
    assert!(!ctx.engine.store_exists().unwrap());
}
