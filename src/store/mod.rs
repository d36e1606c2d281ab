//! Ledger store module
//!
//! The store is the backend capability the ledger runs on:
//! - `traits` - `Store` / `Connection` capability and backend isolation levels
//! - `statement` - parametrized statements and result sets
//! - `error` - backend faults
//! - `memory` - in-process engine with versioned rows and a lock manager

pub mod error;
pub mod memory;
pub mod statement;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryConnection, MemoryStore, StoreConfig, DEFAULT_LOCK_TIMEOUT};
pub use statement::{RowSet, Statement};
pub use traits::{Connection, IsolationLevel, SessionId, SessionObserver, Store};
