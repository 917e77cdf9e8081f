//! Execution engine: pooled statement execution, CRUD and transactions.

use std::any::type_name;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::adapter::{Connection, RowSet, StorageAdapter};
use super::config::EngineConfig;
use super::pool::{ConnectionPool, PooledConnection};
use super::transaction::Transaction;
use crate::catalog::{EntityDescriptor, KeyScheme, MetadataRegistry, ScalarType};
use crate::dialect::{Dialect, IsolationLevel, Parameters};
use crate::error::Error;
use crate::migration::{ReconcileReport, SchemaReconciler};
use crate::model::Entity;
use crate::query::materialize::{MaterializePlan, Materializer};
use crate::query::statement::Projection;
use crate::query::{
    BinaryOp, ColumnRef, Condition, DeleteStatement, InsertStatement, Query, RenderedStatement,
    SelectStatement, Update, UpdateStatement,
};
use crate::value::Value;

/// Which pool a statement runs on outside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
}

struct EngineInner {
    config: EngineConfig,
    adapter: Arc<dyn StorageAdapter>,
    dialect: Arc<dyn Dialect>,
    registry: MetadataRegistry,
    read_pool: ConnectionPool,
    write_pool: ConnectionPool,
    /// Connection pinned by the open transaction, if any.
    transaction: Mutex<Option<PooledConnection>>,
}

/// Entry point for one store.
///
/// Cheap to clone; clones share the registry, the pools and the
/// transaction state. Safe to use from several threads at once.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine with the default configuration.
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self::with_config(adapter, EngineConfig::default())
    }

    /// Create an engine with the given configuration.
    pub fn with_config(adapter: Arc<dyn StorageAdapter>, config: EngineConfig) -> Self {
        let dialect = adapter.dialect();
        let read_pool = ConnectionPool::new("read", Arc::clone(&adapter), config.read_pool());
        let write_pool = ConnectionPool::new("write", Arc::clone(&adapter), config.write_pool());
        debug!(
            dialect = dialect.name(),
            read_pool = config.read_pool_size,
            write_pool = config.write_pool_size,
            "Created engine"
        );
        Self {
            inner: Arc::new(EngineInner {
                config,
                adapter,
                dialect,
                registry: MetadataRegistry::new(),
                read_pool,
                write_pool,
                transaction: Mutex::new(None),
            }),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The metadata registry.
    pub fn registry(&self) -> &MetadataRegistry {
        &self.inner.registry
    }

    /// The dialect statements are rendered in.
    pub fn dialect(&self) -> &dyn Dialect {
        self.inner.dialect.as_ref()
    }

    /// The storage adapter.
    pub fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.inner.adapter
    }

    /// The read connection pool.
    pub fn read_pool(&self) -> &ConnectionPool {
        &self.inner.read_pool
    }

    /// The write connection pool.
    pub fn write_pool(&self) -> &ConnectionPool {
        &self.inner.write_pool
    }

    /// Register a mapped type.
    pub fn register<T: Entity>(&self) -> Result<Arc<EntityDescriptor>, Error> {
        self.inner.registry.register::<T>()
    }

    /// Descriptor for `T`, registering it on first use when enabled.
    ///
    /// Declared subtypes materialize as themselves from the base table.
    pub(crate) fn descriptor<T: Entity>(&self) -> Result<Arc<EntityDescriptor>, Error> {
        let registry = &self.inner.registry;
        match registry.resolve_entity::<T>() {
            Ok(descriptor) => Ok(descriptor),
            Err(Error::EntityNotFound(_)) if self.inner.config.auto_register => {
                registry.register::<T>()
            }
            Err(e) => Err(e),
        }
    }

    /// Run `f` on the transaction's connection, or on a pooled one.
    pub(crate) fn with_connection<R>(
        &self,
        access: Access,
        f: impl FnOnce(&mut dyn Connection) -> Result<R, Error>,
    ) -> Result<R, Error> {
        {
            let mut pinned = self.inner.transaction.lock();
            if let Some(connection) = pinned.as_mut() {
                let connection: &mut dyn Connection = connection;
                return f(connection);
            }
        }
        let mut lease = self.pool(access).acquire()?;
        let connection: &mut dyn Connection = &mut lease;
        f(connection)
    }

    fn pool(&self, access: Access) -> &ConnectionPool {
        match access {
            Access::Read => &self.inner.read_pool,
            Access::Write => &self.inner.write_pool,
        }
    }

    fn log_statement(statement: &RenderedStatement) {
        debug!(sql = %statement.sql, params = statement.params.len(), "Executing statement");
    }

    /// Fetch all rows of a select. Outside a transaction the read lease is
    /// handed back so the caller decides when it is released.
    pub(crate) fn fetch(
        &self,
        statement: &RenderedStatement,
    ) -> Result<(RowSet, Option<PooledConnection>), Error> {
        Self::log_statement(statement);
        {
            let mut pinned = self.inner.transaction.lock();
            if let Some(connection) = pinned.as_mut() {
                let rows = connection.query(&statement.sql, &statement.params)?;
                return Ok((rows, None));
            }
        }
        let mut lease = self.inner.read_pool.acquire()?;
        let rows = lease.query(&statement.sql, &statement.params)?;
        Ok((rows, Some(lease)))
    }

    pub(crate) fn rows(&self, statement: &RenderedStatement) -> Result<RowSet, Error> {
        Self::log_statement(statement);
        self.with_connection(Access::Read, |conn| conn.query(&statement.sql, &statement.params))
    }

    pub(crate) fn scalar(&self, statement: &RenderedStatement) -> Result<Value, Error> {
        Self::log_statement(statement);
        self.with_connection(Access::Read, |conn| {
            conn.query_scalar(&statement.sql, &statement.params)
        })
    }

    pub(crate) fn run(&self, statement: &RenderedStatement) -> Result<u64, Error> {
        Self::log_statement(statement);
        self.with_connection(Access::Write, |conn| {
            conn.execute(&statement.sql, &statement.params)
        })
    }

    /// Start a typed query over `T`.
    pub fn query<T: Entity>(&self) -> Query<'_, T> {
        Query::new(self)
    }

    /// Start a bulk update of `T`.
    pub fn update<T: Entity>(&self) -> Update<'_, T> {
        Update::new(self)
    }

    /// Run raw SQL that returns no rows.
    pub fn execute(&self, sql: &str, params: &Parameters) -> Result<u64, Error> {
        debug!(sql, params = params.len(), "Executing statement");
        self.with_connection(Access::Write, |conn| conn.execute(sql, params))
    }

    /// Run raw SQL and return the first column of the first row.
    pub fn execute_scalar(&self, sql: &str, params: &Parameters) -> Result<Value, Error> {
        debug!(sql, params = params.len(), "Executing scalar");
        self.with_connection(Access::Write, |conn| conn.query_scalar(sql, params))
    }

    /// Insert an entity, returning its primary key value.
    ///
    /// Store-assigned identity keys are read back on the same connection.
    /// A null `Guid` key is generated here. Row versions start at 1.
    pub fn insert<T: Entity>(&self, entity: &T) -> Result<Value, Error> {
        let descriptor = self.descriptor::<T>()?;
        let supplied = self.field_values(&descriptor, entity)?;

        let mut key = Value::Null;
        let mut values = Vec::with_capacity(descriptor.fields.len());
        for (field, value) in descriptor.fields.iter().zip(supplied) {
            if !field.settable {
                continue;
            }
            let value = if field.row_version {
                Value::Int64(1)
            } else if field.primary_key && value.is_null() && is_guid_key(&descriptor) {
                Value::Guid(Uuid::new_v4())
            } else {
                value
            };
            if field.primary_key {
                key = value.clone();
            }
            if value.is_null() && field.default.is_some() {
                continue;
            }
            values.push((field.store_name.clone(), value));
        }

        let statement = InsertStatement {
            entity: Arc::clone(&descriptor),
            values,
        }
        .render(self.dialect());
        Self::log_statement(&statement);

        let identity = descriptor.primary_key.as_ref().filter(|pk| pk.is_identity());
        self.with_connection(Access::Write, |conn| {
            conn.execute(&statement.sql, &statement.params)?;
            if identity.is_some() {
                let assigned =
                    conn.query_scalar(self.dialect().last_identity_sql(), &Parameters::new())?;
                key = identity_value(&descriptor, assigned);
            }
            Ok(())
        })?;
        Ok(key)
    }

    /// Write every settable field of an entity back by primary key.
    ///
    /// A row version is compared and incremented; a mismatch fails with
    /// `ConcurrencyConflict` and changes nothing.
    pub fn save<T: Entity>(&self, entity: &T) -> Result<(), Error> {
        let descriptor = self.descriptor::<T>()?;
        let values = self.field_values(&descriptor, entity)?;
        let (key_filter, key) = key_condition(&descriptor, &values)?;
        let table = &descriptor.store_name;

        let mut assignments = Vec::new();
        let mut filter = key_filter.clone();
        for (field, value) in descriptor.fields.iter().zip(values) {
            let column = ColumnRef::new(table, &field.store_name);
            if field.row_version {
                let bumped = Condition::binary(
                    BinaryOp::Add,
                    Condition::Column(column.clone()),
                    Condition::literal(1i64),
                );
                filter = filter.and(Condition::binary(
                    BinaryOp::Equal,
                    Condition::Column(column.clone()),
                    Condition::Literal(value),
                ));
                assignments.push((column, bumped));
            } else if field.settable && !field.primary_key {
                assignments.push((column, Condition::Literal(value)));
            }
        }

        let statement = UpdateStatement {
            entity: Arc::clone(&descriptor),
            assignments,
            filter: Some(filter),
        }
        .render(self.dialect())?;
        if self.run(&statement)? > 0 {
            return Ok(());
        }

        if descriptor.row_version_field().is_some() && self.exists(&descriptor, key_filter)? {
            return Err(Error::ConcurrencyConflict {
                entity: descriptor.name.clone(),
                key: key.to_string(),
            });
        }
        Err(Error::RecordNotFound {
            entity: descriptor.name.clone(),
            key: key.to_string(),
        })
    }

    /// Delete an entity by primary key.
    pub fn delete<T: Entity>(&self, entity: &T) -> Result<(), Error> {
        let descriptor = self.descriptor::<T>()?;
        let values = self.field_values(&descriptor, entity)?;
        let (filter, key) = key_condition(&descriptor, &values)?;

        let statement = DeleteStatement {
            entity: Arc::clone(&descriptor),
            filter: Some(filter),
        }
        .render(self.dialect());
        if self.run(&statement)? == 0 {
            return Err(Error::RecordNotFound {
                entity: descriptor.name.clone(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Seek by primary key.
    pub fn find<T: Entity>(&self, key: impl Into<Value>) -> Result<Option<Arc<T>>, Error> {
        let descriptor = self.descriptor::<T>()?;
        let key = key.into();
        let column = descriptor
            .primary_key
            .as_ref()
            .map(|pk| pk.column.clone())
            .ok_or_else(|| Error::PrimaryKeyRequired(descriptor.name.clone()))?;
        if key.is_null() {
            return Err(Error::PrimaryKeyRequired(descriptor.name.clone()));
        }

        let mut select = SelectStatement::new(Arc::clone(&descriptor));
        select.filter = Some(Condition::binary(
            BinaryOp::Equal,
            Condition::column(&descriptor.store_name, column),
            Condition::Literal(key),
        ));
        let plan = MaterializePlan::for_select(&select)?;
        let statement = select.render(self.dialect())?;
        let rows = self.rows(&statement)?;

        let mut materializer = Materializer::new(plan);
        for row in &rows.rows {
            if let Some(entity) = materializer.process_row(row)? {
                return entity.downcast::<T>().map(Some).map_err(|_| Error::Materialize {
                    entity: descriptor.name.clone(),
                    field: String::new(),
                    reason: format!("descriptor is not bound to {}", type_name::<T>()),
                });
            }
        }
        Ok(None)
    }

    /// Seek by primary key, failing with `RecordNotFound`.
    pub fn get<T: Entity>(&self, key: impl Into<Value>) -> Result<Arc<T>, Error> {
        let key = key.into();
        let display = key.to_string();
        self.find::<T>(key)?.ok_or_else(|| Error::RecordNotFound {
            entity: type_name::<T>().to_string(),
            key: display,
        })
    }

    fn field_values<T: Entity>(
        &self,
        descriptor: &EntityDescriptor,
        entity: &T,
    ) -> Result<Vec<Value>, Error> {
        let mut values = vec![Value::Null; descriptor.fields.len()];
        for (name, value) in entity.to_fields() {
            let position = descriptor
                .field_position(name)
                .ok_or_else(|| Error::UnknownField {
                    entity: descriptor.name.clone(),
                    field: name.to_string(),
                })?;
            values[position] = value;
        }
        Ok(values)
    }

    fn exists(&self, descriptor: &Arc<EntityDescriptor>, filter: Condition) -> Result<bool, Error> {
        let mut select = SelectStatement::new(Arc::clone(descriptor));
        select.filter = Some(filter);
        select.projection = Projection::Count;
        let count = self.scalar(&select.render(self.dialect())?)?;
        Ok(count.as_i64().unwrap_or(0) > 0)
    }

    /// Open a transaction; statements run through its connection until it
    /// ends. Only one transaction may be open per store.
    pub fn begin_transaction(&self, isolation: IsolationLevel) -> Result<Transaction<'_>, Error> {
        let mut pinned = self.inner.transaction.lock();
        if pinned.is_some() {
            return Err(Error::TransactionConflict);
        }
        let mut connection = self.inner.write_pool.acquire()?;
        for sql in self.dialect().begin_transaction_sql(isolation) {
            debug!(sql = %sql, "Beginning transaction");
            connection.execute(&sql, &Parameters::new())?;
        }
        *pinned = Some(connection);
        Ok(Transaction::new(self, isolation))
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.inner.transaction.lock().is_some()
    }

    pub(crate) fn take_pinned(&self) -> Option<PooledConnection> {
        self.inner.transaction.lock().take()
    }

    /// Whether the backing store exists.
    pub fn store_exists(&self) -> Result<bool, Error> {
        self.inner.adapter.database_exists()
    }

    /// Create the backing store.
    pub fn create_store(&self) -> Result<(), Error> {
        if self.inner.adapter.database_exists()? {
            return Err(Error::StoreAlreadyExists);
        }
        self.inner.adapter.create_database()?;
        info!(dialect = self.dialect().name(), "Created store");
        Ok(())
    }

    /// Remove the backing store.
    pub fn delete_store(&self) -> Result<(), Error> {
        self.inner.adapter.delete_database()?;
        info!(dialect = self.dialect().name(), "Deleted store");
        Ok(())
    }

    /// Reclaim unused space.
    pub fn compact(&self) -> Result<(), Error> {
        self.inner.adapter.compact()?;
        info!("Compaction completed");
        Ok(())
    }

    /// Check and repair store integrity.
    pub fn repair(&self) -> Result<(), Error> {
        self.inner.adapter.repair()?;
        info!("Repair completed");
        Ok(())
    }

    /// Shrink store files.
    pub fn shrink(&self) -> Result<(), Error> {
        self.inner.adapter.shrink()?;
        info!("Shrink completed");
        Ok(())
    }

    /// Bring the store in line with every registered entity.
    pub fn ensure_compatibility(&self) -> Result<ReconcileReport, Error> {
        SchemaReconciler::new(self).run()
    }
}

fn is_guid_key(descriptor: &EntityDescriptor) -> bool {
    descriptor
        .primary_key
        .as_ref()
        .is_some_and(|pk| pk.scheme == KeyScheme::Guid)
}

/// Convert a store-reported identity to the key field's type.
fn identity_value(descriptor: &EntityDescriptor, assigned: Value) -> Value {
    let scalar = descriptor.primary_key_field().map(|f| f.scalar);
    match (scalar, assigned.as_i64()) {
        (Some(ScalarType::Int32), Some(id)) => i32::try_from(id)
            .map(Value::Int32)
            .unwrap_or(Value::Int64(id)),
        (_, Some(id)) => Value::Int64(id),
        (_, None) => assigned,
    }
}

/// `pk = key` for an entity's current key value.
fn key_condition(
    descriptor: &EntityDescriptor,
    values: &[Value],
) -> Result<(Condition, Value), Error> {
    let missing = || Error::PrimaryKeyRequired(descriptor.name.clone());
    let pk = descriptor.primary_key.as_ref().ok_or_else(missing)?;
    let position = descriptor.field_position(&pk.field).ok_or_else(missing)?;
    let key = values.get(position).cloned().unwrap_or(Value::Null);
    if key.is_null() {
        return Err(missing());
    }
    let condition = Condition::binary(
        BinaryOp::Equal,
        Condition::column(&descriptor.store_name, &pk.column),
        Condition::Literal(key.clone()),
    );
    Ok((condition, key))
}
