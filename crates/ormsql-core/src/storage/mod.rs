//! Storage layer: adapter interfaces, connection pooling, the execution
//! engine and transactions.

mod adapter;
mod config;
mod engine;
mod pool;
mod transaction;

pub use adapter::{Connection, Row, RowSet, StorageAdapter};
pub use config::{
    EngineConfig, DEFAULT_CONNECT_RETRIES, DEFAULT_READ_POOL_SIZE, DEFAULT_WRITE_POOL_SIZE,
};
pub(crate) use engine::Access;
pub use engine::Engine;
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use transaction::Transaction;
