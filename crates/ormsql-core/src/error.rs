//! Core error types.

use std::time::Duration;

use thiserror::Error;

/// Boxed error raised by a storage engine adapter.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Core ORM errors.
///
/// Metadata and statement-building errors are programmer errors: they are
/// returned immediately and never retried.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed entity metadata.
    #[error("invalid definition for entity {entity}: {reason}")]
    Definition {
        /// Entity whose definition was rejected.
        entity: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A table or field name collides with a reserved SQL keyword.
    #[error("entity {entity}: '{name}' is a reserved SQL keyword")]
    ReservedWord {
        /// Entity declaring the name.
        entity: String,
        /// The offending store name.
        name: String,
    },

    /// Operation on an unregistered type or name.
    #[error("entity not registered: {0}")]
    EntityNotFound(String),

    /// A field name that the entity does not declare.
    #[error("entity {entity} has no field '{field}'")]
    UnknownField {
        /// Entity that was searched.
        entity: String,
        /// The missing field name.
        field: String,
    },

    /// Delete or update attempted without a usable primary key.
    #[error("entity {0} requires a primary key for this operation")]
    PrimaryKeyRequired(String),

    /// Seek by key found nothing.
    #[error("no {entity} record with key {key}")]
    RecordNotFound {
        /// Entity that was searched.
        entity: String,
        /// Display form of the key.
        key: String,
    },

    /// The expression compiler hit a shape it cannot lower to SQL.
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// A transaction is already open on this store.
    #[error("a transaction is already active on this store")]
    TransactionConflict,

    /// An update statement was executed with zero set clauses.
    #[error("update of {0} has no set clause")]
    NoSetClause(String),

    /// The backing store already exists.
    #[error("store already exists")]
    StoreAlreadyExists,

    /// An implicit join could not be resolved to exactly one reference.
    #[error("cannot join {left} to {right}: {reason}")]
    JoinResolution {
        /// Left entity of the join.
        left: String,
        /// Right entity of the join.
        right: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A statement that cannot be rendered as requested.
    #[error("invalid statement: {0}")]
    InvalidStatement(String),

    /// Attempt to assign a field the caller may not set.
    #[error("field {entity}.{field} is not settable")]
    FieldNotSettable {
        /// Entity owning the field.
        entity: String,
        /// The field name.
        field: String,
    },

    /// Row version did not match on save.
    #[error("{entity} record {key} was modified concurrently")]
    ConcurrencyConflict {
        /// Entity being saved.
        entity: String,
        /// Display form of the key.
        key: String,
    },

    /// A row value could not be converted into the declared field type.
    #[error("cannot materialize {entity}.{field}: {reason}")]
    Materialize {
        /// Entity being built.
        entity: String,
        /// Field being read.
        field: String,
        /// Conversion failure.
        reason: String,
    },

    /// No pooled connection became free within the configured timeout.
    #[error("timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(Duration),

    /// Opening a new connection failed after all retries.
    #[error("connection error: {0}")]
    Connection(#[source] BoxError),

    /// Backend error surfaced by the storage engine adapter.
    #[error("storage error: {0}")]
    Storage(#[source] BoxError),

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a backend error.
    pub fn storage(err: impl Into<BoxError>) -> Self {
        Error::Storage(err.into())
    }

    /// Build a definition error.
    pub fn definition(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Definition {
            entity: entity.into(),
            reason: reason.into(),
        }
    }
}
