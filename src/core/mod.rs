//! Core ledger logic module
//!
//! This module contains the ledger's business components:
//! - `transaction_manager` - Atomic ledger operations over an explicit connection
//! - `scope` - Guard that guarantees one commit or rollback per operation
//! - `isolation_policy` - Mapping of isolation requirements onto backend levels

pub mod isolation_policy;
pub mod scope;
pub mod transaction_manager;

pub use isolation_policy::{IsolationConfig, IsolationRequirement};
pub use scope::TransactionScope;
pub use transaction_manager::{LedgerConfig, TransactionManager};
