//! Store-level transactions.

use tracing::{debug, warn};

use super::adapter::Connection;
use super::engine::Engine;
use crate::dialect::{IsolationLevel, Parameters};
use crate::error::Error;

/// An open transaction.
///
/// While it lives, every statement the engine runs goes through its pinned
/// connection. Dropping it without `commit` rolls back.
pub struct Transaction<'e> {
    engine: &'e Engine,
    isolation: IsolationLevel,
    finished: bool,
}

impl<'e> Transaction<'e> {
    pub(crate) fn new(engine: &'e Engine, isolation: IsolationLevel) -> Self {
        Self {
            engine,
            isolation,
            finished: false,
        }
    }

    /// Isolation level the transaction was opened with.
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Make the transaction's changes durable.
    pub fn commit(mut self) -> Result<(), Error> {
        self.finished = true;
        self.finish(self.engine.dialect().commit_sql())
    }

    /// Discard the transaction's changes.
    pub fn rollback(mut self) -> Result<(), Error> {
        self.finished = true;
        self.finish(self.engine.dialect().rollback_sql())
    }

    fn finish(&self, sql: &str) -> Result<(), Error> {
        let Some(mut connection) = self.engine.take_pinned() else {
            return Ok(());
        };
        debug!(sql, "Ending transaction");
        let result = connection.execute(sql, &Parameters::new()).map(|_| ());
        if result.is_err() && sql != self.engine.dialect().rollback_sql() {
            // Never hand a connection back to the pool mid-transaction.
            if let Err(e) = connection.execute(self.engine.dialect().rollback_sql(), &Parameters::new()) {
                warn!(error = %e, "Rollback after failed commit also failed");
            }
        }
        result
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(isolation = ?self.isolation, "Transaction dropped without commit, rolling back");
        if let Err(e) = self.finish(self.engine.dialect().rollback_sql()) {
            warn!(error = %e, "Rollback of dropped transaction failed");
        }
    }
}
