//! Parametrized ledger statements and their results
//!
//! The store understands a fixed set of statements against the ledger schema.
//! Each statement renders as SQL text plus its parameters so that logs read the
//! same way they would against a relational backend.

use crate::types::{Account, AccountId, Balance, Customer};
use std::fmt;

/// A statement executed on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Fetch one account row, optionally taking an update lock on it
    SelectAccount {
        account_id: AccountId,
        for_update: bool,
    },

    /// `sum(balance)` over all accounts
    SumBalances,

    /// Number of account rows
    CountAccounts,

    /// Overwrite an account balance
    SetBalance {
        account_id: AccountId,
        balance: Balance,
    },

    /// Add `delta` to an account balance in place
    AdjustBalance {
        account_id: AccountId,
        delta: Balance,
    },

    /// Insert a new account row
    InsertAccount(Account),

    /// Insert a new customer row
    InsertCustomer(Customer),
}

impl Statement {
    /// SQL text of the statement with `?` placeholders
    pub fn sql(&self) -> &'static str {
        match self {
            Statement::SelectAccount {
                for_update: false, ..
            } => "SELECT account_id, customer_id, balance, account_type FROM Account WHERE account_id = ?",
            Statement::SelectAccount {
                for_update: true, ..
            } => "SELECT account_id, customer_id, balance, account_type FROM Account WITH (UPDLOCK) WHERE account_id = ?",
            Statement::SumBalances => "SELECT sum(balance) FROM Account",
            Statement::CountAccounts => "SELECT count(*) FROM Account",
            Statement::SetBalance { .. } => "UPDATE Account SET balance = ? WHERE account_id = ?",
            Statement::AdjustBalance { .. } => {
                "UPDATE Account SET balance = balance + ? WHERE account_id = ?"
            }
            Statement::InsertAccount(_) => {
                "INSERT INTO Account (account_id, customer_id, balance, account_type) VALUES (?, ?, ?, ?)"
            }
            Statement::InsertCustomer(_) => "INSERT INTO Customer (customer_id, name) VALUES (?, ?)",
        }
    }

    /// Bound parameter values, in placeholder order
    pub fn params(&self) -> Vec<String> {
        match self {
            Statement::SelectAccount { account_id, .. } => vec![account_id.to_string()],
            Statement::SumBalances | Statement::CountAccounts => Vec::new(),
            Statement::SetBalance {
                account_id,
                balance,
            } => vec![balance.to_string(), account_id.to_string()],
            Statement::AdjustBalance { account_id, delta } => {
                vec![delta.to_string(), account_id.to_string()]
            }
            Statement::InsertAccount(account) => vec![
                account.account_id.to_string(),
                account.customer_id.to_string(),
                account.balance.to_string(),
                account.account_type.to_string(),
            ],
            Statement::InsertCustomer(customer) => vec![
                customer.customer_id.to_string(),
                format!("'{}'", customer.name),
            ],
        }
    }

    /// Whether the statement takes exclusive row locks
    pub fn locks_for_write(&self) -> bool {
        !matches!(
            self,
            Statement::SelectAccount {
                for_update: false,
                ..
            } | Statement::SumBalances
                | Statement::CountAccounts
        )
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self.params();
        if params.is_empty() {
            write!(f, "{}", self.sql())
        } else {
            write!(f, "{} [{}]", self.sql(), params.join(", "))
        }
    }
}

/// Result of executing a statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSet {
    /// Account rows returned by a select
    Accounts(Vec<Account>),

    /// Single aggregate value; `None` when the aggregate ran over no rows
    Scalar(Option<i64>),

    /// Number of rows inserted or updated
    Affected(usize),
}

impl RowSet {
    /// First account row, if the result holds any
    pub fn into_account(self) -> Option<Account> {
        match self {
            RowSet::Accounts(rows) => rows.into_iter().next(),
            _ => None,
        }
    }

    /// Aggregate value, if the result is a non-empty scalar
    pub fn scalar(&self) -> Option<i64> {
        match self {
            RowSet::Scalar(value) => *value,
            _ => None,
        }
    }

    /// Number of affected rows (zero for queries)
    pub fn affected(&self) -> usize {
        match self {
            RowSet::Affected(count) => *count,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::select(
        Statement::SelectAccount { account_id: 5, for_update: false },
        "SELECT account_id, customer_id, balance, account_type FROM Account WHERE account_id = ? [5]"
    )]
    #[case::sum(Statement::SumBalances, "SELECT sum(balance) FROM Account")]
    #[case::set_balance(
        Statement::SetBalance { account_id: 115, balance: 3_000_000 },
        "UPDATE Account SET balance = ? WHERE account_id = ? [3000000, 115]"
    )]
    #[case::insert(
        Statement::InsertAccount(Account::new(25, 10, 9_000_000, 1)),
        "INSERT INTO Account (account_id, customer_id, balance, account_type) VALUES (?, ?, ?, ?) [25, 10, 9000000, 1]"
    )]
    fn test_statement_display(#[case] statement: Statement, #[case] expected: &str) {
        assert_eq!(statement.to_string(), expected);
    }

    #[rstest]
    #[case(Statement::SelectAccount { account_id: 1, for_update: false }, false)]
    #[case(Statement::SelectAccount { account_id: 1, for_update: true }, true)]
    #[case(Statement::SumBalances, false)]
    #[case(Statement::AdjustBalance { account_id: 1, delta: -5 }, true)]
    fn test_locks_for_write(#[case] statement: Statement, #[case] expected: bool) {
        assert_eq!(statement.locks_for_write(), expected);
    }

    #[test]
    fn test_rowset_accessors() {
        let account = Account::new(5, 5, 100, 1);
        assert_eq!(
            RowSet::Accounts(vec![account.clone()]).into_account(),
            Some(account)
        );
        assert_eq!(RowSet::Accounts(Vec::new()).into_account(), None);
        assert_eq!(RowSet::Scalar(Some(42)).scalar(), Some(42));
        assert_eq!(RowSet::Scalar(None).scalar(), None);
        assert_eq!(RowSet::Affected(1).affected(), 1);
        assert_eq!(RowSet::Scalar(Some(1)).affected(), 0);
    }
}
