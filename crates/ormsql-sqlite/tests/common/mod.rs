//! Shared fixtures for the SQLite integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use chrono::NaiveDateTime;
use tempfile::TempDir;
use uuid::Uuid;

use ormsql_core::{
    Collection, Engine, EngineConfig, Entity, EntityDef, Error, FieldDef, FieldReader, KeyScheme,
    Reference, ReferenceDef, ReferenceSlot, ScalarType, Value,
};
use ormsql_sqlite::{SqliteAdapter, SqliteConfig};

static TRACING: Once = Once::new();

/// Install a test subscriber once per test binary. `RUST_LOG` controls it.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// An engine over a fresh database file in a temporary directory.
pub struct TestContext {
    pub engine: Engine,
    pub adapter: SqliteAdapter,
    _dir: TempDir,
}

impl TestContext {
    /// Empty store, nothing registered.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let adapter = SqliteAdapter::new(SqliteConfig::new(dir.path().join("store.db")));
        let engine = Engine::with_config(Arc::new(adapter.clone()), config);
        Self {
            engine,
            adapter,
            _dir: dir,
        }
    }

    /// Store with the library schema created.
    pub fn library() -> Self {
        let ctx = Self::new();
        ctx.engine.register::<Author>().unwrap();
        ctx.engine.register::<Book>().unwrap();
        ctx.engine.ensure_compatibility().unwrap();
        ctx
    }

    /// Insert an author and return its assigned key.
    pub fn add_author(&self, name: &str, age: Option<i32>) -> i64 {
        let author = Author {
            name: name.to_string(),
            age,
            ..Default::default()
        };
        self.engine.insert(&author).unwrap().as_i64().unwrap()
    }

    /// Insert a book and return its assigned key.
    pub fn add_book(&self, title: &str, author_id: i64) -> i64 {
        let book = Book {
            title: title.to_string(),
            author_id,
            ..Default::default()
        };
        self.engine.insert(&book).unwrap().as_i64().unwrap()
    }
}

#[derive(Debug, Default)]
pub struct Author {
    pub id: Option<i64>,
    pub name: String,
    pub age: Option<i32>,
    pub books: Collection<Book>,
}

impl Entity for Author {
    fn definition() -> EntityDef {
        EntityDef::new("Author")
            .with_field(FieldDef::new("Id", ScalarType::Int64).primary_key(KeyScheme::Identity))
            .with_field(FieldDef::new("Name", ScalarType::String).max_length(100))
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
pub struct Book {
    pub id: Option<i64>,
    pub title: String,
    pub author_id: i64,
    pub author: Reference<Author>,
}

impl Entity for Book {
    fn definition() -> EntityDef {
        EntityDef::new("Book")
            .with_field(FieldDef::new("Id", ScalarType::Int64).primary_key(KeyScheme::Identity))
            .with_field(FieldDef::new("Title", ScalarType::String))
            .with_field(
                FieldDef::new("AuthorId", ScalarType::Int64)
                    .foreign_key("Author", "Id")
                    .indexed(),
            )
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

/// One field of every portable type.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub id: Option<Uuid>,
    pub flag: bool,
    pub small: i32,
    pub large: i64,
    pub ratio: f64,
    pub label: String,
    pub payload: Vec<u8>,
    pub stamped: NaiveDateTime,
    pub token: Uuid,
    pub score: Option<i32>,
    pub note: Option<String>,
}

impl Entity for Sample {
    fn definition() -> EntityDef {
        EntityDef::new("Sample")
            .with_field(FieldDef::new("Id", ScalarType::Guid).primary_key(KeyScheme::Guid))
            .with_field(FieldDef::new("Flag", ScalarType::Bool))
            .with_field(FieldDef::new("Small", ScalarType::Int32))
            .with_field(FieldDef::new("Large", ScalarType::Int64))
            .with_field(FieldDef::new("Ratio", ScalarType::Float64))
            .with_field(FieldDef::new("Label", ScalarType::String))
            .with_field(FieldDef::new("Payload", ScalarType::Bytes))
            .with_field(FieldDef::new("Stamped", ScalarType::DateTime))
            .with_field(FieldDef::new("Token", ScalarType::Guid))
            .with_field(FieldDef::optional("Score", ScalarType::Int32))
            .with_field(FieldDef::optional("Note", ScalarType::String))
    }

    fn from_fields(fields: &FieldReader<'_>) -> Result<Self, Error> {
        Ok(Self {
            id: fields.get("Id")?,
            flag: fields.get("Flag")?,
            small: fields.get("Small")?,
            large: fields.get("Large")?,
            ratio: fields.get("Ratio")?,
            label: fields.get("Label")?,
            payload: fields.get("Payload")?,
            stamped: fields.get("Stamped")?,
            token: fields.get("Token")?,
            score: fields.get("Score")?,
            note: fields.get("Note")?,
        })
    }

    fn to_fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("Id", self.id.into()),
            ("Flag", self.flag.into()),
            ("Small", self.small.into()),
            ("Large", self.large.into()),
            ("Ratio", self.ratio.into()),
            ("Label", self.label.as_str().into()),
            ("Payload", self.payload.clone().into()),
            ("Stamped", self.stamped.into()),
            ("Token", self.token.into()),
            ("Score", self.score.into()),
            ("Note", self.note.clone().into()),
        ]
    }
}

/// A document guarded by a row version.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub id: i64,
    pub body: String,
    pub version: i64,
}

impl Entity for Document {
    fn definition() -> EntityDef {
        EntityDef::new("Document")
            .with_field(FieldDef::new("Id", ScalarType::Int64).primary_key(KeyScheme::Natural))
            .with_field(FieldDef::new("Body", ScalarType::String))
            .with_field(FieldDef::new("Version", ScalarType::Int64).row_version())
    }

    fn from_fields(fields: &FieldReader<'_>) -> Result<Self, Error> {
        Ok(Self {
            id: fields.get("Id")?,
            body: fields.get("Body")?,
            version: fields.get("Version")?,
        })
    }

    fn to_fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("Id", self.id.into()),
            ("Body", self.body.as_str().into()),
            ("Version", self.version.into()),
        ]
    }
}
