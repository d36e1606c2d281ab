//! Error types for the ledger
//!
//! This module defines the errors returned by the transaction manager.
//! Validation errors carry the exact user-visible text the ledger has always
//! reported, so callers can surface them with a plain `to_string()`.
//!
//! # Error Categories
//!
//! - **Validation Errors**: account not found, insufficient funds, cross-customer
//!   transfer, invalid amount
//! - **Consistency Errors**: no account records found while totalling
//! - **Store Errors**: any backend fault (lock timeout, deadlock, constraint
//!   violation), surfaced as-is and never retried

use crate::store::StoreError;
use crate::types::{AccountId, Balance};
use thiserror::Error;

/// Main error type for ledger operations
///
/// Every transaction manager operation rolls back its transaction before
/// returning one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// The requested account does not exist
    #[error("Account {0} not found.")]
    AccountNotFound(AccountId),

    /// The source account cannot cover the transfer amount
    #[error("Transfer failed because of insufficient balance.")]
    InsufficientFunds,

    /// Source and destination accounts belong to different customers
    #[error("Transfer failed because accounts do not belong to same customer.")]
    CrossCustomerTransfer,

    /// The totals query found no account rows
    #[error("No account records found.")]
    NoRecordsFound,

    /// Transfer amounts must not be negative
    #[error("Transfer failed because amount {0} is negative.")]
    InvalidAmount(Balance),

    /// Inserting a new account failed
    #[error("Failed to create account {account_id}: {source}")]
    AccountCreation {
        /// Account that could not be created
        account_id: AccountId,
        /// Underlying store failure
        source: StoreError,
    },

    /// Backend fault outside the ledger's own validation
    #[error(transparent)]
    StoreFailure(#[from] StoreError),
}

impl LedgerError {
    /// Create an AccountNotFound error
    pub fn account_not_found(account_id: AccountId) -> Self {
        LedgerError::AccountNotFound(account_id)
    }

    /// Create an AccountCreation error
    pub fn account_creation(account_id: AccountId, source: StoreError) -> Self {
        LedgerError::AccountCreation { account_id, source }
    }

    /// Whether the error came from the store rather than ledger validation
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            LedgerError::StoreFailure(_) | LedgerError::AccountCreation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::account_not_found(LedgerError::AccountNotFound(150), "Account 150 not found.")]
    #[case::insufficient_funds(
        LedgerError::InsufficientFunds,
        "Transfer failed because of insufficient balance."
    )]
    #[case::cross_customer(
        LedgerError::CrossCustomerTransfer,
        "Transfer failed because accounts do not belong to same customer."
    )]
    #[case::no_records(LedgerError::NoRecordsFound, "No account records found.")]
    #[case::invalid_amount(
        LedgerError::InvalidAmount(-5),
        "Transfer failed because amount -5 is negative."
    )]
    #[case::account_creation(
        LedgerError::AccountCreation { account_id: 25, source: StoreError::DuplicateKey { account_id: 25 } },
        "Failed to create account 25: Duplicate key: account 25 already exists"
    )]
    #[case::store_failure(
        LedgerError::StoreFailure(StoreError::Deadlock { session: 3 }),
        "Deadlock detected: session 3 chosen as victim"
    )]
    fn test_error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn test_store_error_conversion() {
        let error: LedgerError = StoreError::LockTimeout { session: 2 }.into();
        assert!(matches!(error, LedgerError::StoreFailure(_)));
        assert!(error.is_store_failure());
        assert!(!LedgerError::InsufficientFunds.is_store_failure());
    }

    #[test]
    fn test_helper_functions() {
        assert_eq!(
            LedgerError::account_not_found(7),
            LedgerError::AccountNotFound(7)
        );
        assert_eq!(
            LedgerError::account_creation(25, StoreError::ForeignKeyViolation { customer_id: 99 }),
            LedgerError::AccountCreation {
                account_id: 25,
                source: StoreError::ForeignKeyViolation { customer_id: 99 }
            }
        );
    }
}
