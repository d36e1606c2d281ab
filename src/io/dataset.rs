//! Ledger dataset loading
//!
//! Reads the `Customer` and `Account` tables from CSV and inserts them into a
//! store in one transaction. The reference dataset used by the demo session and
//! the isolation scenarios is embedded in the binary; a directory holding
//! `customers.csv` and `accounts.csv` can be loaded instead.
//!
//! # CSV Format
//!
//! ```text
//! customer_id,name
//! 1,Alice Martin
//!
//! account_id,customer_id,balance,account_type
//! 1,1,1250,1
//! ```

use crate::core::TransactionScope;
use crate::store::{Statement, Store, StoreError};
use crate::types::{Account, Balance, Customer};
use csv::{ReaderBuilder, Trim};
use log::info;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the customer table inside a dataset directory
pub const CUSTOMERS_FILE: &str = "customers.csv";

/// File name of the account table inside a dataset directory
pub const ACCOUNTS_FILE: &str = "accounts.csv";

const REFERENCE_CUSTOMERS: &str = include_str!("../../data/customers.csv");
const REFERENCE_ACCOUNTS: &str = include_str!("../../data/accounts.csv");

/// Errors raised while reading or loading a dataset
#[derive(Debug, Error)]
pub enum LoadError {
    /// A dataset file could not be opened
    #[error("Failed to open file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A dataset file could not be parsed
    #[error("CSV parse error in {file}: {source}")]
    Csv { file: String, source: csv::Error },

    /// The store rejected a row
    #[error("Failed to load dataset: {0}")]
    Store(#[from] StoreError),
}

/// Rows of the two ledger tables
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dataset {
    pub customers: Vec<Customer>,
    pub accounts: Vec<Account>,
}

impl Dataset {
    /// The embedded reference dataset (20 customers, 40 accounts)
    pub fn reference() -> Result<Self, LoadError> {
        Self::from_readers(REFERENCE_CUSTOMERS.as_bytes(), REFERENCE_ACCOUNTS.as_bytes())
    }

    /// Read `customers.csv` and `accounts.csv` from `dir`
    ///
    /// # Arguments
    ///
    /// * `dir` - Directory containing both files
    ///
    /// # Errors
    ///
    /// Returns `LoadError::Io` if a file is missing and `LoadError::Csv` if a row
    /// does not parse.
    pub fn from_dir(dir: &Path) -> Result<Self, LoadError> {
        let customers = open(&dir.join(CUSTOMERS_FILE))?;
        let accounts = open(&dir.join(ACCOUNTS_FILE))?;
        Self::from_readers(customers, accounts)
    }

    /// Parse both tables from arbitrary readers
    pub fn from_readers<C: Read, A: Read>(customers: C, accounts: A) -> Result<Self, LoadError> {
        Ok(Self {
            customers: read_rows(customers, CUSTOMERS_FILE)?,
            accounts: read_rows(accounts, ACCOUNTS_FILE)?,
        })
    }

    /// Sum of all account balances
    pub fn total_balance(&self) -> Balance {
        self.accounts.iter().map(|account| account.balance).sum()
    }
}

/// Insert every row of `dataset` into `store` and commit
///
/// Customers are inserted before accounts so that foreign keys resolve. Any
/// failure rolls the whole load back.
pub fn load<S: Store>(store: &S, dataset: &Dataset) -> Result<(), LoadError> {
    let mut conn = store.connect()?;
    let mut scope = TransactionScope::new(&mut conn);

    for customer in &dataset.customers {
        scope.execute(&Statement::InsertCustomer(customer.clone()))?;
    }
    for account in &dataset.accounts {
        scope.execute(&Statement::InsertAccount(account.clone()))?;
    }
    scope.commit()?;

    info!(
        "Loaded {} customers and {} accounts (total balance {})",
        dataset.customers.len(),
        dataset.accounts.len(),
        dataset.total_balance()
    );
    Ok(())
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_rows<T: DeserializeOwned, R: Read>(reader: R, file: &str) -> Result<Vec<T>, LoadError> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .from_reader(reader)
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .map_err(|source| LoadError::Csv {
            file: file.to_string(),
            source,
        })
}
