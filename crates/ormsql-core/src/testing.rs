//! Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::catalog::{EntityDef, FieldDef, KeyScheme, ReferenceDef, ScalarType};
use crate::dialect::{AnsiDialect, Dialect, Parameters};
use crate::error::Error;
use crate::model::{Collection, Entity, FieldReader, Reference, ReferenceSlot};
use crate::storage::{Connection, RowSet, StorageAdapter};
use crate::value::Value;

#[derive(Debug, Default)]
pub(crate) struct Author {
    pub id: Option<i64>,
    pub name: String,
    pub age: Option<i32>,
    pub books: Collection<Book>,
}

impl Author {
    pub(crate) fn new(id: i64, name: &str) -> Self {
        Self {
            id: Some(id),
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl Entity for Author {
    fn definition() -> EntityDef {
        EntityDef::new("Author")
            .with_field(FieldDef::new("Id", ScalarType::Int64).primary_key(KeyScheme::Identity))
            .with_field(FieldDef::new("Name", ScalarType::String))
            .with_field(FieldDef::optional("Age", ScalarType::Int32))
            .with_reference(ReferenceDef::one_to_many("books", "Id", "Book", "AuthorId"))
    }

    fn from_fields(fields: &FieldReader<'_>) -> Result<Self, Error> {
        Ok(Self {
            id: fields.get("Id")?,
            name: fields.get("Name")?,
            age: fields.get("Age")?,
            books: Collection::new(),
        })
    }

    fn to_fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("Id", self.id.into()),
            ("Name", self.name.as_str().into()),
            ("Age", self.age.into()),
        ]
    }

    fn reference(&self, name: &str) -> Option<&dyn ReferenceSlot> {
        match name {
            "books" => Some(&self.books),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Book {
    pub id: Option<i64>,
    pub title: String,
    pub author_id: i64,
    pub author: Reference<Author>,
}

impl Book {
    pub(crate) fn new(id: i64, title: &str, author_id: i64) -> Self {
        Self {
            id: Some(id),
            title: title.to_string(),
            author_id,
            author: Reference::new(),
        }
    }
}

impl Entity for Book {
    fn definition() -> EntityDef {
        EntityDef::new("Book")
            .with_field(FieldDef::new("Id", ScalarType::Int64).primary_key(KeyScheme::Identity))
            .with_field(FieldDef::new("Title", ScalarType::String))
            .with_field(FieldDef::new("AuthorId", ScalarType::Int64).indexed())
            .with_reference(ReferenceDef::many_to_one("author", "AuthorId", "Author", "Id"))
    }

    fn from_fields(fields: &FieldReader<'_>) -> Result<Self, Error> {
        Ok(Self {
            id: fields.get("Id")?,
            title: fields.get("Title")?,
            author_id: fields.get("AuthorId")?,
            author: Reference::new(),
        })
    }

    fn to_fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("Id", self.id.into()),
            ("Title", self.title.as_str().into()),
            ("AuthorId", self.author_id.into()),
        ]
    }

    fn reference(&self, name: &str) -> Option<&dyn ReferenceSlot> {
        match name {
            "author" => Some(&self.author),
            _ => None,
        }
    }
}

/// Stored in `Author`'s table once declared a subtype of it.
#[derive(Debug)]
pub(crate) struct GuestAuthor {
    pub id: i64,
    pub name: String,
}

impl Entity for GuestAuthor {
    fn definition() -> EntityDef {
        EntityDef::new("GuestAuthor")
            .with_field(FieldDef::new("Id", ScalarType::Int64).primary_key(KeyScheme::Identity))
            .with_field(FieldDef::new("Name", ScalarType::String))
    }

    fn from_fields(fields: &FieldReader<'_>) -> Result<Self, Error> {
        Ok(Self {
            id: fields.get("Id")?,
            name: fields.get("Name")?,
        })
    }

    fn to_fields(&self) -> Vec<(&'static str, Value)> {
        vec![("Id", self.id.into()), ("Name", self.name.as_str().into())]
    }
}

#[derive(Default)]
struct MockState {
    statements: Mutex<Vec<(String, Parameters)>>,
    rows: Mutex<VecDeque<RowSet>>,
    affected: Mutex<VecDeque<u64>>,
    opened: AtomicUsize,
    failing_opens: AtomicUsize,
    generation: AtomicU64,
    exists: AtomicBool,
}

/// Adapter whose connections record SQL and replay canned results.
///
/// Queries pop the next queued row set (empty when none is queued);
/// statements pop the next queued affected count (1 when none is queued).
#[derive(Clone, Default)]
pub(crate) struct MockAdapter {
    state: Arc<MockState>,
}

impl MockAdapter {
    pub(crate) fn new() -> Self {
        let adapter = Self::default();
        adapter.state.exists.store(true, Ordering::SeqCst);
        adapter
    }

    pub(crate) fn push_rows(&self, rows: RowSet) {
        self.state.rows.lock().push_back(rows);
    }

    pub(crate) fn push_affected(&self, count: u64) {
        self.state.affected.lock().push_back(count);
    }

    pub(crate) fn statements(&self) -> Vec<(String, Parameters)> {
        self.state.statements.lock().clone()
    }

    pub(crate) fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_next_opens(&self, count: usize) {
        self.state.failing_opens.store(count, Ordering::SeqCst);
    }

    /// Make every connection opened so far report itself invalid.
    pub(crate) fn invalidate_connections(&self) {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn set_exists(&self, exists: bool) {
        self.state.exists.store(exists, Ordering::SeqCst);
    }
}

struct MockConnection {
    state: Arc<MockState>,
    generation: u64,
}

impl MockConnection {
    fn record(&self, sql: &str, params: &Parameters) {
        self.state
            .statements
            .lock()
            .push((sql.to_string(), params.clone()));
    }
}

impl Connection for MockConnection {
    fn execute(&mut self, sql: &str, params: &Parameters) -> Result<u64, Error> {
        self.record(sql, params);
        Ok(self.state.affected.lock().pop_front().unwrap_or(1))
    }

    fn query(&mut self, sql: &str, params: &Parameters) -> Result<RowSet, Error> {
        self.record(sql, params);
        Ok(self.state.rows.lock().pop_front().unwrap_or_default())
    }

    fn is_valid(&mut self) -> bool {
        self.generation == self.state.generation.load(Ordering::SeqCst)
    }
}

impl StorageAdapter for MockAdapter {
    fn database_exists(&self) -> Result<bool, Error> {
        Ok(self.state.exists.load(Ordering::SeqCst))
    }

    fn create_database(&self) -> Result<(), Error> {
        self.set_exists(true);
        Ok(())
    }

    fn delete_database(&self) -> Result<(), Error> {
        self.set_exists(false);
        Ok(())
    }

    fn new_connection(&self) -> Result<Box<dyn Connection>, Error> {
        let failing = self.state.failing_opens.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.failing_opens.store(failing - 1, Ordering::SeqCst);
            return Err(Error::storage("connection refused"));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
            generation: self.state.generation.load(Ordering::SeqCst),
        }))
    }

    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::new(AnsiDialect)
    }
}
