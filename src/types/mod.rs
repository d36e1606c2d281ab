//! Types module
//!
//! Contains core data structures used throughout the crate:
//! - `account`: ledger rows and identifiers
//! - `error`: error type for transaction manager operations

pub mod account;
pub mod error;

pub use account::{Account, AccountId, AccountType, Balance, Customer, CustomerId};
pub use error::LedgerError;
