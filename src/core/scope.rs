//! Scoped transaction guard
//!
//! Every ledger operation must end its transaction with exactly one commit or
//! rollback. `TransactionScope` borrows the connection for the length of the
//! operation and rolls back on drop if neither was reached.

use crate::store::{Connection, RowSet, Statement, StoreResult};
use log::warn;

/// Guard over one transaction on a borrowed connection
pub struct TransactionScope<'c, C: Connection> {
    conn: &'c mut C,
    finished: bool,
}

impl<'c, C: Connection> TransactionScope<'c, C> {
    /// Start a scope on `conn`
    ///
    /// The transaction itself begins with the first executed statement.
    pub fn new(conn: &'c mut C) -> Self {
        Self {
            conn,
            finished: false,
        }
    }

    /// Execute a statement inside the scoped transaction
    pub fn execute(&mut self, statement: &Statement) -> StoreResult<RowSet> {
        self.conn.execute(statement)
    }

    /// Commit and close the scope
    pub fn commit(mut self) -> StoreResult<()> {
        self.finished = true;
        self.conn.commit()
    }

    /// Roll back and close the scope
    pub fn rollback(mut self) -> StoreResult<()> {
        self.finished = true;
        self.conn.rollback()
    }
}

impl<C: Connection> Drop for TransactionScope<'_, C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.conn.rollback() {
            warn!(
                "Rollback on session {} failed: {}",
                self.conn.session_id(),
                e
            );
        }
    }
}
