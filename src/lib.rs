//! Ledger Isolation Library
//! # Overview
//!
//! This library provides a minimal banking ledger together with a harness that
//! demonstrates how transaction isolation levels change what concurrent
//! transactions see and whether they block each other.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Ledger rows, identifiers and the ledger error type
//! - [`store`] - Store capability traits and the in-memory engine:
//!   - [`store::memory`] - Versioned rows, lock manager, blocking sessions
//! - [`core`] - Business logic components:
//!   - [`core::transaction_manager`] - Atomic ledger operations
//!   - [`core::isolation_policy`] - Isolation requirements and test configurations
//! - [`harness`] - Reader/writer races with commit-order recording
//! - [`io`] - CSV dataset loading
//! - [`cli`] - CLI arguments and command execution
//!
//! # Ledger Operations
//!
//! - **Read balance**: look up one account
//! - **Transfer**: move funds between two accounts of the same customer
//! - **Create account**: insert a new account for an existing customer
//! - **Totals**: sum all balances twice within one transaction
//! - **Update balance**: overwrite a balance, holding the write before commit
//!
//! # Isolation Levels
//!
//! | Level | Dirty read | Non-repeatable read | Phantom | Reader blocks writer |
//! |---|---|---|---|---|
//! | Read uncommitted | yes | yes | yes | no |
//! | Snapshot | no | no | no | no |
//! | Read committed | no | yes | yes | no |
//! | Repeatable read | no | no | yes | yes (rows read) |
//! | Serializable | no | no | no | yes (whole table) |

// Module declarations
pub mod cli;
pub mod core;
pub mod harness;
pub mod io;
pub mod store;
pub mod types;

pub use crate::core::{
    IsolationConfig, IsolationRequirement, LedgerConfig, TransactionManager, TransactionScope,
};
pub use harness::{CommitMarker, Harness, HarnessError, Scenario};
pub use io::{Dataset, LoadError};
pub use store::{Connection, IsolationLevel, MemoryStore, Statement, Store, StoreConfig, StoreError};
pub use types::{Account, AccountId, Balance, Customer, CustomerId, LedgerError};
