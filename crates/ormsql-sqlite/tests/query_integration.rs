//! Integration tests for the statement builder and materializer on SQLite.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{Author, Book, TestContext};
use ormsql_core::{field, field_of, Error, JoinKind, Value};

/// Two authors; Ada has two books, Grace has one, Edsger has none.
fn seeded() -> (TestContext, i64, i64, i64) {
    let ctx = TestContext::library();
    let ada = ctx.add_author("Ada", Some(36));
    let grace = ctx.add_author("Grace", Some(85));
    let edsger = ctx.add_author("Edsger", None);
    ctx.add_book("Notes on the Engine", ada);
    ctx.add_book("Sketch of the Analytical Engine", ada);
    ctx.add_book("Compiler Notes", grace);
    (ctx, ada, grace, edsger)
}

fn titles(books: &[Arc<Book>]) -> Vec<&str> {
    books.iter().map(|b| b.title.as_str()).collect()
}

#[test]
fn test_filter_and_order() {
    let (ctx, ..) = seeded();
    let books = ctx
        .engine
        .query::<Book>()
        .filter(field("Title").contains("Engine"))
        .order_by_desc(field("Title"))
        .all()
        .unwrap();
    assert_eq!(
        titles(&books),
        vec!["Sketch of the Analytical Engine", "Notes on the Engine"]
    );
}

#[test]
fn test_or_and_null_comparisons() {
    let (ctx, ada, ..) = seeded();
    let authors = ctx
        .engine
        .query::<Author>()
        .filter(field("Id").eq(ada).or(field("Age").eq(Value::Null)))
        .order_by(field("Name"))
        .all()
        .unwrap();
    let names: Vec<&str> = authors.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Ada", "Edsger"]);

    let aged = ctx
        .engine
        .query::<Author>()
        .filter(field("Age").ne(Value::Null))
        .count()
        .unwrap();
    assert_eq!(aged, 2);
}

#[test]
fn test_membership_and_arithmetic() {
    let (ctx, ada, grace, _) = seeded();
    let count = ctx
        .engine
        .query::<Author>()
        .filter(field("Id").is_in([ada, grace]))
        .filter((field("Age") + 10).gt(50))
        .count()
        .unwrap();
    assert_eq!(count, 1);

    let none = ctx
        .engine
        .query::<Author>()
        .filter(field("Id").is_in(Vec::<i64>::new()))
        .all()
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_join_shares_parent_instance() {
    let (ctx, ada, ..) = seeded();
    let books = ctx
        .engine
        .query::<Book>()
        .join::<Book, Author>()
        .filter(field_of::<Author>("Id").eq(ada))
        .order_by(field("Id"))
        .all()
        .unwrap();

    assert_eq!(books.len(), 2);
    let first = books[0].author.get().unwrap();
    let second = books[1].author.get().unwrap();
    assert!(Arc::ptr_eq(first, second));
    assert_eq!(first.name, "Ada");
}

#[test]
fn test_left_join_without_children() {
    let (ctx, _, _, edsger) = seeded();
    let authors = ctx
        .engine
        .query::<Author>()
        .left_join::<Author, Book>()
        .order_by(field("Name"))
        .all()
        .unwrap();

    let names: Vec<&str> = authors.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Ada", "Edsger", "Grace"]);
    assert_eq!(authors[0].books.len(), 2);
    assert_eq!(authors[2].books.len(), 1);

    let lonely = &authors[1];
    assert_eq!(lonely.id, Some(edsger));
    assert!(lonely.books.is_empty());
}

#[test]
fn test_one_to_many_accumulates_across_rows() {
    let (ctx, ada, ..) = seeded();
    let authors = ctx
        .engine
        .query::<Author>()
        .join::<Author, Book>()
        .filter(field("Id").eq(ada))
        .then_by(field_of::<Book>("Title"))
        .all()
        .unwrap();

    assert_eq!(authors.len(), 1);
    let books = authors[0].books.items();
    assert_eq!(
        titles(&books),
        vec!["Notes on the Engine", "Sketch of the Analytical Engine"]
    );
}

#[test]
fn test_explicit_join_condition() {
    let (ctx, ..) = seeded();
    let books = ctx
        .engine
        .query::<Book>()
        .join_on::<Author>(
            JoinKind::Inner,
            field_of::<Book>("AuthorId").eq(field_of::<Author>("Id")),
        )
        .filter(field_of::<Author>("Age").gt(80))
        .all()
        .unwrap();
    assert_eq!(titles(&books), vec!["Compiler Notes"]);
    assert!(!books[0].author.is_set());
}

#[test]
fn test_top_and_first() {
    let (ctx, ..) = seeded();
    let top = ctx
        .engine
        .query::<Book>()
        .order_by(field("Title"))
        .top(2)
        .unwrap();
    assert_eq!(titles(&top), vec!["Compiler Notes", "Notes on the Engine"]);

    let missing = ctx
        .engine
        .query::<Book>()
        .filter(field("Title").starts_with("Zzz"))
        .first()
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_aggregates() {
    let (ctx, ada, grace, _) = seeded();
    let total = ctx.engine.query::<Author>().sum(field("Age")).unwrap();
    assert_eq!(total.as_i64(), Some(121));

    let per_author = ctx
        .engine
        .query::<Book>()
        .group_by(field("AuthorId"))
        .order_by(field("AuthorId"))
        .count_by()
        .unwrap();
    let counts: Vec<(Option<i64>, Option<i64>)> = per_author
        .iter()
        .map(|row| (row.keys[0].as_i64(), row.value.as_i64()))
        .collect();
    assert_eq!(counts, vec![(Some(ada), Some(2)), (Some(grace), Some(1))]);
}

#[test]
fn test_iteration_releases_connection() {
    let (ctx, ..) = seeded();
    let mut iter = ctx.engine.query::<Book>().iter().unwrap();
    assert!(iter.holds_connection());

    let first = iter.next().unwrap().unwrap();
    assert!(!first.title.is_empty());
    drop(iter);

    // The single-slot write pool is untouched and the read lease is back.
    assert_eq!(ctx.engine.read_pool().in_use(), 0);
    let drained: Vec<_> = ctx.engine.query::<Book>().iter().unwrap().collect();
    assert_eq!(drained.len(), 3);
    assert_eq!(ctx.engine.read_pool().in_use(), 0);
}

#[test]
fn test_bulk_update_and_delete() {
    let (ctx, ..) = seeded();
    let changed = ctx
        .engine
        .update::<Author>()
        .set("Age", field("Age") + 1)
        .filter(field("Age").is_not_null())
        .execute()
        .unwrap();
    assert_eq!(changed, 2);
    let total = ctx.engine.query::<Author>().sum(field("Age")).unwrap();
    assert_eq!(total.as_i64(), Some(123));

    let removed = ctx
        .engine
        .query::<Book>()
        .filter(field("Title").ends_with("Engine"))
        .delete()
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(ctx.engine.query::<Book>().count().unwrap(), 1);
}

#[test]
fn test_update_without_set_touches_nothing() {
    let (ctx, ..) = seeded();
    let err = ctx
        .engine
        .update::<Author>()
        .filter(field("Name").eq("Ada"))
        .execute()
        .unwrap_err();
    assert!(matches!(err, Error::NoSetClause(_)));
}

#[test]
fn test_unsupported_call() {
    let (ctx, ..) = seeded();
    let err = ctx
        .engine
        .query::<Author>()
        .filter(ormsql_core::call("soundex", vec![field("Name")]))
        .all()
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedExpression(_)));
}
