//! Ledger row types
//!
//! This module defines the identifiers and the two rows of the ledger schema:
//! `Customer` and `Account`. Both are plain values; the store owns their
//! versioned copies and the transaction manager only ever sees snapshots.

use serde::{Deserialize, Serialize};

/// Account identifier (primary key of `Account`)
pub type AccountId = u32;

/// Customer identifier (primary key of `Customer`)
pub type CustomerId = u32;

/// Account balance and transfer amounts, in whole currency units
///
/// Signed so that a faulty update is observable instead of wrapping.
pub type Balance = i64;

/// Opaque account type tag (1 = checking, 2 = savings in the reference data)
pub type AccountType = i32;

/// A bank customer
///
/// Created once at load time and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: CustomerId,
    pub name: String,
}

/// A customer account
///
/// Every account references an existing customer. Several accounts may belong
/// to the same customer; transfers are only allowed between those.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier
    pub account_id: AccountId,

    /// Owning customer
    pub customer_id: CustomerId,

    /// Current balance
    ///
    /// A correctly implemented transfer never drives this below zero.
    pub balance: Balance,

    /// Opaque type tag, not interpreted by the ledger
    pub account_type: AccountType,
}

impl Account {
    /// Create a new account row
    pub fn new(
        account_id: AccountId,
        customer_id: CustomerId,
        balance: Balance,
        account_type: AccountType,
    ) -> Self {
        Account {
            account_id,
            customer_id,
            balance,
            account_type,
        }
    }

    /// Whether this account and `other` belong to the same customer
    pub fn same_owner(&self, other: &Account) -> bool {
        self.customer_id == other.customer_id
    }
}
