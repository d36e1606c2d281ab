//! Error types for the ledger store
//!
//! These are backend faults: lock waits that could not be satisfied, snapshot
//! update conflicts and constraint violations. The transaction manager wraps
//! them in `LedgerError::StoreFailure` and never retries them.

use crate::store::SessionId;
use crate::types::{AccountId, CustomerId};
use thiserror::Error;

/// Errors raised by a store connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A lock could not be granted within the configured lock timeout
    #[error("Lock request timed out for session {session}")]
    LockTimeout {
        /// Session that gave up waiting
        session: SessionId,
    },

    /// Granting the lock would close a wait-for cycle
    ///
    /// The requesting session is the victim; its transaction has already been
    /// rolled back by the store when this error is returned.
    #[error("Deadlock detected: session {session} chosen as victim")]
    Deadlock {
        /// Session whose transaction was rolled back
        session: SessionId,
    },

    /// A snapshot transaction tried to modify a row committed after its snapshot
    #[error("Snapshot isolation update conflict on account {account_id}")]
    WriteConflict {
        /// Account modified concurrently
        account_id: AccountId,
    },

    /// An account with the same key already exists
    #[error("Duplicate key: account {account_id} already exists")]
    DuplicateKey {
        /// Conflicting account identifier
        account_id: AccountId,
    },

    /// A customer with the same key already exists
    #[error("Duplicate key: customer {customer_id} already exists")]
    DuplicateCustomer {
        /// Conflicting customer identifier
        customer_id: CustomerId,
    },

    /// An account references a customer that does not exist
    #[error("Foreign key violation: customer {customer_id} does not exist")]
    ForeignKeyViolation {
        /// Missing customer identifier
        customer_id: CustomerId,
    },

    /// A row value would violate a column constraint (e.g. arithmetic overflow)
    #[error("Constraint violation: {message}")]
    ConstraintViolation {
        /// Description of the violated constraint
        message: String,
    },

    /// The isolation level cannot change while a transaction is open
    #[error("Cannot change isolation level while a transaction is active on session {session}")]
    TransactionActive {
        /// Session with the open transaction
        session: SessionId,
    },
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Create a ConstraintViolation error
    pub fn constraint_violation(message: impl Into<String>) -> Self {
        StoreError::ConstraintViolation {
            message: message.into(),
        }
    }
}
