//! Store capability traits
//!
//! The transaction manager and the isolation harness only ever talk to a
//! backend through these traits, so the memory engine can be swapped for
//! another implementation without touching ledger logic.

use crate::store::{RowSet, Statement, StoreResult};
use std::fmt;
use std::sync::Arc;

/// Identifier of a store session (one per connection)
pub type SessionId = u64;

/// Isolation levels understood by the backend
///
/// These are the concrete backend settings. Callers normally reach them through
/// `core::isolation_policy`, which maps abstract requirements onto them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    /// Reads see uncommitted writes and take no locks
    ReadUncommitted,

    /// Reads see committed data and hold shared locks for one statement
    #[default]
    ReadCommitted,

    /// Reads hold shared row locks until the transaction ends
    RepeatableRead,

    /// Reads see the data committed when the transaction began, without locking
    Snapshot,

    /// Reads hold a shared table lock until the transaction ends
    Serializable,
}

impl IsolationLevel {
    /// The statement a relational backend would use to select this level
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            IsolationLevel::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            IsolationLevel::Snapshot => "SET TRANSACTION ISOLATION LEVEL SNAPSHOT",
            IsolationLevel::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Snapshot => "SNAPSHOT",
            IsolationLevel::Serializable => "SERIALIZABLE",
        };
        f.write_str(name)
    }
}

/// Receives session events from the store
///
/// Callbacks run inside the store while its internal state is locked, so
/// implementations must return quickly and must never call back into the store.
pub trait SessionObserver: Send + Sync {
    /// The session is about to wait for a lock held by another session
    ///
    /// Called once per blocked lock request.
    fn lock_wait(&self) {}

    /// The session's transaction committed
    ///
    /// Called before any other session can observe the commit, so observers
    /// see commits in the order the store applied them.
    fn committed(&self) {}
}

/// A connection to the store with auto-commit disabled
///
/// The first statement after a commit or rollback implicitly begins a new
/// transaction; every transaction must be ended explicitly.
pub trait Connection: Send {
    /// Session identifier of this connection
    fn session_id(&self) -> SessionId;

    /// Isolation level used for the next transaction
    fn isolation_level(&self) -> IsolationLevel;

    /// Change the isolation level
    ///
    /// # Errors
    ///
    /// Returns `StoreError::TransactionActive` while a transaction is open.
    fn set_isolation_level(&mut self, level: IsolationLevel) -> StoreResult<()>;

    /// Whether a transaction is currently open on this connection
    fn in_transaction(&self) -> bool;

    /// Execute a statement, beginning a transaction if none is open
    fn execute(&mut self, statement: &Statement) -> StoreResult<RowSet>;

    /// Commit the open transaction (no-op without one)
    fn commit(&mut self) -> StoreResult<()>;

    /// Roll back the open transaction (no-op without one)
    fn rollback(&mut self) -> StoreResult<()>;

    /// Register an observer for this session's lock waits and commits
    fn observe(&mut self, observer: Arc<dyn SessionObserver>);
}

/// A ledger store that hands out independent connections
pub trait Store: Send + Sync {
    /// Connection type produced by this store
    type Conn: Connection + 'static;

    /// Open a new connection with its own session and transaction state
    fn connect(&self) -> StoreResult<Self::Conn>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(IsolationLevel::ReadUncommitted, "READ UNCOMMITTED")]
    #[case(IsolationLevel::ReadCommitted, "READ COMMITTED")]
    #[case(IsolationLevel::RepeatableRead, "REPEATABLE READ")]
    #[case(IsolationLevel::Snapshot, "SNAPSHOT")]
    #[case(IsolationLevel::Serializable, "SERIALIZABLE")]
    fn test_isolation_level_display(#[case] level: IsolationLevel, #[case] expected: &str) {
        assert_eq!(level.to_string(), expected);
        assert!(level.as_sql().ends_with(expected));
    }

    #[test]
    fn test_default_level_is_read_committed() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
    }
}
