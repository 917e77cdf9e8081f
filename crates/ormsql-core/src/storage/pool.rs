//! Bounded connection pool.
//!
//! Slots are scanned in order under one pool-wide lock. A caller that finds
//! neither a free slot nor spare capacity blocks on a condition variable
//! until a lease is returned, instead of sleeping and polling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::adapter::{Connection, RowSet, StorageAdapter};
use crate::dialect::Parameters;
use crate::error::Error;
use crate::value::Value;

/// Configuration for one connection pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of connections checked out at once.
    pub capacity: usize,
    /// Upper bound on waiting for a free connection; `None` waits forever.
    pub acquire_timeout: Option<Duration>,
    /// Immediate retries when opening a connection fails.
    pub connect_retries: u32,
}

impl PoolConfig {
    /// Create a pool configuration with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            acquire_timeout: None,
            connect_retries: 3,
        }
    }

    /// Set the acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the number of connect retries.
    pub fn with_connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries;
        self
    }
}

struct Slot {
    /// `None` while leased out.
    connection: Option<Box<dyn Connection>>,
    in_use: bool,
}

struct PoolInner {
    name: &'static str,
    config: PoolConfig,
    adapter: Arc<dyn StorageAdapter>,
    slots: Mutex<Vec<Slot>>,
    released: Condvar,
}

impl PoolInner {
    fn open(&self) -> Result<Box<dyn Connection>, Error> {
        let mut attempt = 0;
        loop {
            match self.adapter.new_connection() {
                Ok(connection) => {
                    debug!(pool = self.name, attempt, "Opened connection");
                    return Ok(connection);
                }
                Err(e) if attempt < self.config.connect_retries => {
                    attempt += 1;
                    warn!(
                        pool = self.name,
                        attempt,
                        error = %e,
                        "Failed to open connection, retrying"
                    );
                }
                Err(e) => return Err(Error::Connection(Box::new(e))),
            }
        }
    }

    fn release(&self, index: usize, connection: Box<dyn Connection>) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(index) {
            slot.connection = Some(connection);
            slot.in_use = false;
        }
        drop(slots);
        self.released.notify_one();
    }
}

/// A pool of connections to one store.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create an empty pool; connections open on demand.
    pub fn new(name: &'static str, adapter: Arc<dyn StorageAdapter>, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                name,
                config,
                adapter,
                slots: Mutex::new(Vec::new()),
                released: Condvar::new(),
            }),
        }
    }

    /// Check out a connection, blocking until one is free.
    pub fn acquire(&self) -> Result<PooledConnection, Error> {
        let inner = &self.inner;
        let deadline = inner.config.acquire_timeout.map(|t| Instant::now() + t);
        let mut slots = inner.slots.lock();

        loop {
            if let Some(index) = slots.iter().position(|slot| !slot.in_use) {
                let slot = &mut slots[index];
                let reusable = slot.connection.take().and_then(|mut connection| {
                    if connection.is_valid() {
                        Some(connection)
                    } else {
                        None
                    }
                });
                let connection = match reusable {
                    Some(connection) => connection,
                    None => {
                        debug!(pool = inner.name, slot = index, "Reopening invalid connection");
                        match inner.open() {
                            Ok(connection) => connection,
                            Err(e) => {
                                // The slot stays free; hand the wakeup to the next waiter.
                                inner.released.notify_one();
                                return Err(e);
                            }
                        }
                    }
                };
                slot.in_use = true;
                return Ok(PooledConnection::new(index, connection, inner));
            }

            if slots.len() < inner.config.capacity {
                let connection = inner.open()?;
                slots.push(Slot {
                    connection: None,
                    in_use: true,
                });
                return Ok(PooledConnection::new(slots.len() - 1, connection, inner));
            }

            debug!(
                pool = inner.name,
                capacity = inner.config.capacity,
                "Waiting for a free connection"
            );
            match deadline {
                None => inner.released.wait(&mut slots),
                Some(deadline) => {
                    if inner.released.wait_until(&mut slots, deadline).timed_out() {
                        return Err(Error::PoolTimeout(
                            inner.config.acquire_timeout.unwrap_or_default(),
                        ));
                    }
                }
            }
        }
    }

    /// Number of connections currently checked out.
    pub fn in_use(&self) -> usize {
        self.inner.slots.lock().iter().filter(|s| s.in_use).count()
    }

    /// Number of connections opened and still held by the pool.
    pub fn open_connections(&self) -> usize {
        self.inner.slots.lock().len()
    }

    /// Maximum number of concurrent leases.
    pub fn capacity(&self) -> usize {
        self.inner.config.capacity
    }
}

/// A leased connection that returns itself to the pool when dropped.
pub struct PooledConnection {
    index: usize,
    connection: Option<Box<dyn Connection>>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    fn new(index: usize, connection: Box<dyn Connection>, pool: &Arc<PoolInner>) -> Self {
        Self {
            index,
            connection: Some(connection),
            pool: Arc::clone(pool),
        }
    }

    fn connection(&mut self) -> Result<&mut Box<dyn Connection>, Error> {
        self.connection
            .as_mut()
            .ok_or_else(|| Error::Connection("connection is not available".into()))
    }
}

impl Connection for PooledConnection {
    fn execute(&mut self, sql: &str, params: &Parameters) -> Result<u64, Error> {
        self.connection()?.execute(sql, params)
    }

    fn query(&mut self, sql: &str, params: &Parameters) -> Result<RowSet, Error> {
        self.connection()?.query(sql, params)
    }

    fn query_scalar(&mut self, sql: &str, params: &Parameters) -> Result<Value, Error> {
        self.connection()?.query_scalar(sql, params)
    }

    fn is_valid(&mut self) -> bool {
        self.connection
            .as_mut()
            .map(|c| c.is_valid())
            .unwrap_or(false)
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(self.index, connection);
        }
    }
}
