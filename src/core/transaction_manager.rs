//! Transaction manager
//!
//! This module provides the TransactionManager that runs every ledger
//! operation as a single store transaction on a caller-supplied connection.
//!
//! The manager enforces the ledger's business rules:
//! - Transfers only between existing accounts of the same customer
//! - Transfers never overdraw the source account
//! - Every operation ends with exactly one commit or rollback

use crate::core::scope::TransactionScope;
use crate::store::{Connection, Statement};
use crate::types::{Account, AccountId, AccountType, Balance, CustomerId, LedgerError};
use log::{debug, info, warn};
use std::thread;
use std::time::Duration;

/// Default pause between the two reads of `get_totals`
pub const DEFAULT_TOTALS_PAUSE: Duration = Duration::from_secs(2);

/// Transaction manager configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Pause between the two `sum(balance)` reads of `get_totals`
    pub totals_pause: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            totals_pause: DEFAULT_TOTALS_PAUSE,
        }
    }
}

impl LedgerConfig {
    /// Create a LedgerConfig with the given totals pause
    pub fn new(totals_pause: Duration) -> Self {
        Self { totals_pause }
    }
}

/// Ledger operations over an explicit connection
///
/// The manager itself holds only immutable configuration; all transaction state
/// lives on the connection passed to each call, so one manager can serve any
/// number of concurrent sessions.
#[derive(Debug, Clone, Default)]
pub struct TransactionManager {
    config: LedgerConfig,
}

impl TransactionManager {
    /// Create a new TransactionManager
    ///
    /// # Arguments
    ///
    /// * `config` - Timing configuration for the totals query
    pub fn new(config: LedgerConfig) -> Self {
        TransactionManager { config }
    }

    /// Read the balance of an account
    ///
    /// # Arguments
    ///
    /// * `conn` - Connection to run the read on
    /// * `account_id` - Account to read
    ///
    /// # Returns
    ///
    /// * `Ok(balance)` if the account exists
    /// * `Err(LedgerError::AccountNotFound)` if it does not
    ///
    /// # Errors
    ///
    /// Store failures are returned as `LedgerError::StoreFailure`.
    pub fn read_balance<C: Connection>(
        &self,
        conn: &mut C,
        account_id: AccountId,
    ) -> Result<Balance, LedgerError> {
        let mut scope = TransactionScope::new(conn);
        let account = scope
            .execute(&Statement::SelectAccount {
                account_id,
                for_update: false,
            })?
            .into_account();

        match account {
            Some(account) => {
                scope.commit()?;
                Ok(account.balance)
            }
            None => {
                scope.rollback()?;
                Err(LedgerError::account_not_found(account_id))
            }
        }
    }

    /// Move `amount` from one account to another of the same customer
    ///
    /// Both rows are fetched with update locks before any balance changes, then
    /// debited and credited with relative updates in the same transaction.
    ///
    /// # Arguments
    ///
    /// * `conn` - Connection to run the transfer on
    /// * `amount` - Non-negative amount to move
    /// * `from_id` - Account to debit
    /// * `to_id` - Account to credit
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `amount` is negative (checked before touching the store)
    /// - Either account does not exist
    /// - The accounts belong to different customers
    /// - The source balance is below `amount`
    /// - The store fails (lock timeout, deadlock, constraint violation)
    ///
    /// In every error case nothing is modified.
    pub fn transfer<C: Connection>(
        &self,
        conn: &mut C,
        amount: Balance,
        from_id: AccountId,
        to_id: AccountId,
    ) -> Result<(), LedgerError> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut scope = TransactionScope::new(conn);

        let Some(from) = fetch_for_update(&mut scope, from_id)? else {
            scope.rollback()?;
            return Err(LedgerError::account_not_found(from_id));
        };
        let Some(to) = fetch_for_update(&mut scope, to_id)? else {
            scope.rollback()?;
            return Err(LedgerError::account_not_found(to_id));
        };

        if !from.same_owner(&to) {
            scope.rollback()?;
            return Err(LedgerError::CrossCustomerTransfer);
        }
        if from.balance < amount {
            scope.rollback()?;
            return Err(LedgerError::InsufficientFunds);
        }

        scope.execute(&Statement::AdjustBalance {
            account_id: from_id,
            delta: -amount,
        })?;
        scope.execute(&Statement::AdjustBalance {
            account_id: to_id,
            delta: amount,
        })?;
        scope.commit()?;

        info!("Transferred {} from account {} to {}", amount, from_id, to_id);
        Ok(())
    }

    /// Insert a new account and commit it immediately
    ///
    /// # Arguments
    ///
    /// * `conn` - Connection to run the insert on
    /// * `customer_id` - Owning customer (must exist)
    /// * `account_type` - Opaque type tag
    /// * `account_id` - New account identifier (must be unused)
    /// * `initial_balance` - Opening balance
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::AccountCreation` wrapping the store error when the
    /// insert or its commit fails.
    pub fn create_account<C: Connection>(
        &self,
        conn: &mut C,
        customer_id: CustomerId,
        account_type: AccountType,
        account_id: AccountId,
        initial_balance: Balance,
    ) -> Result<(), LedgerError> {
        self.create_account_with(
            conn,
            customer_id,
            account_type,
            account_id,
            initial_balance,
            || {},
        )
    }

    /// `create_account` with a hook that runs between the insert and the commit
    pub fn create_account_with<C, F>(
        &self,
        conn: &mut C,
        customer_id: CustomerId,
        account_type: AccountType,
        account_id: AccountId,
        initial_balance: Balance,
        before_commit: F,
    ) -> Result<(), LedgerError>
    where
        C: Connection,
        F: FnOnce(),
    {
        let account = Account::new(account_id, customer_id, initial_balance, account_type);
        let mut scope = TransactionScope::new(conn);

        if let Err(source) = scope.execute(&Statement::InsertAccount(account)) {
            scope.rollback()?;
            return Err(LedgerError::account_creation(account_id, source));
        }
        before_commit();
        scope
            .commit()
            .map_err(|source| LedgerError::account_creation(account_id, source))?;

        info!(
            "Created account {} for customer {} with balance {}",
            account_id, customer_id, initial_balance
        );
        Ok(())
    }

    /// Sum all balances twice in one transaction, pausing in between
    ///
    /// The pause comes from `LedgerConfig::totals_pause`. What the second sum
    /// shows depends on the connection's isolation level and on writers that
    /// ran during the pause.
    ///
    /// # Returns
    ///
    /// `(first_sum, second_sum)`
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NoRecordsFound` if either read finds no accounts.
    pub fn get_totals<C: Connection>(&self, conn: &mut C) -> Result<(Balance, Balance), LedgerError> {
        let pause = self.config.totals_pause;
        self.get_totals_with(conn, || thread::sleep(pause))
    }

    /// `get_totals` with a hook run between the two reads instead of the pause
    pub fn get_totals_with<C, F>(
        &self,
        conn: &mut C,
        between: F,
    ) -> Result<(Balance, Balance), LedgerError>
    where
        C: Connection,
        F: FnOnce(),
    {
        let mut scope = TransactionScope::new(conn);

        let Some(first) = scope.execute(&Statement::SumBalances)?.scalar() else {
            scope.rollback()?;
            return Err(LedgerError::NoRecordsFound);
        };
        debug!("Totals first read: {}", first);

        between();

        let Some(second) = scope.execute(&Statement::SumBalances)?.scalar() else {
            scope.rollback()?;
            return Err(LedgerError::NoRecordsFound);
        };
        debug!("Totals second read: {}", second);

        scope.commit()?;
        Ok((first, second))
    }

    /// Overwrite an account balance, wait `delay`, then commit
    ///
    /// The delay keeps the uncommitted value visible to dirty readers.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::AccountNotFound` if no row was updated.
    pub fn update_account_balance<C: Connection>(
        &self,
        conn: &mut C,
        account_id: AccountId,
        new_amount: Balance,
        delay: Duration,
    ) -> Result<(), LedgerError> {
        self.update_account_balance_with(conn, account_id, new_amount, || {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        })
    }

    /// `update_account_balance` with a hook run before the commit instead of the delay
    pub fn update_account_balance_with<C, F>(
        &self,
        conn: &mut C,
        account_id: AccountId,
        new_amount: Balance,
        before_commit: F,
    ) -> Result<(), LedgerError>
    where
        C: Connection,
        F: FnOnce(),
    {
        let mut scope = TransactionScope::new(conn);
        let updated = scope
            .execute(&Statement::SetBalance {
                account_id,
                balance: new_amount,
            })?
            .affected();

        if updated == 0 {
            scope.rollback()?;
            return Err(LedgerError::account_not_found(account_id));
        }

        before_commit();
        scope.commit()?;
        info!("Set balance of account {} to {}", account_id, new_amount);
        Ok(())
    }

    /// Read a balance and format the outcome for display
    ///
    /// # Returns
    ///
    /// `"Balance for account {id}: {balance}"`, or the error's display text
    pub fn query_balance<C: Connection>(&self, conn: &mut C, account_id: AccountId) -> String {
        match self.read_balance(conn, account_id) {
            Ok(balance) => format!("Balance for account {}: {}", account_id, balance),
            Err(e) => {
                if e.is_store_failure() {
                    warn!("Balance query for account {} failed in the store: {}", account_id, e);
                }
                e.to_string()
            }
        }
    }

    /// Run a transfer and format the outcome for display
    ///
    /// # Returns
    ///
    /// `"Transferred {amount} from account {from} to {to}"`, or the error's
    /// display text
    pub fn do_transfer<C: Connection>(
        &self,
        conn: &mut C,
        amount: Balance,
        from_id: AccountId,
        to_id: AccountId,
    ) -> String {
        match self.transfer(conn, amount, from_id, to_id) {
            Ok(()) => format!(
                "Transferred {} from account {} to {}",
                amount, from_id, to_id
            ),
            Err(e) => {
                if e.is_store_failure() {
                    warn!("Transfer from {} to {} failed in the store: {}", from_id, to_id, e);
                }
                e.to_string()
            }
        }
    }
}

fn fetch_for_update<C: Connection>(
    scope: &mut TransactionScope<'_, C>,
    account_id: AccountId,
) -> Result<Option<Account>, LedgerError> {
    Ok(scope
        .execute(&Statement::SelectAccount {
            account_id,
            for_update: true,
        })?
        .into_account())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::dataset::{self, Dataset};
    use crate::store::{IsolationLevel, MemoryConnection, MemoryStore, Store, StoreError};
    use rstest::{fixture, rstest};
    use std::time::Instant;

    const REFERENCE_TOTAL: Balance = 2_578_180;

    struct Ledger {
        store: MemoryStore,
        conn: MemoryConnection,
        manager: TransactionManager,
    }

    #[fixture]
    fn ledger() -> Ledger {
        let store = MemoryStore::default();
        dataset::load(&store, &Dataset::reference().unwrap()).unwrap();
        let conn = store.connect().unwrap();
        Ledger {
            store,
            conn,
            manager: TransactionManager::new(LedgerConfig::new(Duration::ZERO)),
        }
    }

    fn total(ledger: &mut Ledger) -> Balance {
        let (first, second) = ledger.manager.get_totals(&mut ledger.conn).unwrap();
        assert_eq!(first, second);
        first
    }

    #[rstest]
    #[case(5, 100)]
    #[case(7, 1100)]
    #[case(115, 1020)]
    fn test_read_balance(mut ledger: Ledger, #[case] account_id: AccountId, #[case] expected: Balance) {
        assert_eq!(
            ledger.manager.read_balance(&mut ledger.conn, account_id),
            Ok(expected)
        );
        // idempotent
        assert_eq!(
            ledger.manager.read_balance(&mut ledger.conn, account_id),
            Ok(expected)
        );
        assert!(!ledger.conn.in_transaction());
    }

    #[rstest]
    fn test_read_balance_missing_account(mut ledger: Ledger) {
        assert_eq!(
            ledger.manager.read_balance(&mut ledger.conn, 150),
            Err(LedgerError::AccountNotFound(150))
        );
        assert!(!ledger.conn.in_transaction());
    }

    #[rstest]
    fn test_transfer_moves_funds(mut ledger: Ledger) {
        ledger
            .manager
            .transfer(&mut ledger.conn, 100, 7, 107)
            .unwrap();

        assert_eq!(ledger.manager.read_balance(&mut ledger.conn, 7), Ok(1000));
        assert_eq!(ledger.manager.read_balance(&mut ledger.conn, 107), Ok(1200));
        assert_eq!(total(&mut ledger), REFERENCE_TOTAL);
    }

    #[rstest]
    #[case::insufficient_funds(1000, 8, 108, LedgerError::InsufficientFunds)]
    #[case::cross_customer(1000, 17, 119, LedgerError::CrossCustomerTransfer)]
    #[case::missing_source(10, 150, 7, LedgerError::AccountNotFound(150))]
    #[case::missing_destination(10, 7, 150, LedgerError::AccountNotFound(150))]
    #[case::negative_amount(-10, 7, 107, LedgerError::InvalidAmount(-10))]
    fn test_rejected_transfer_changes_nothing(
        mut ledger: Ledger,
        #[case] amount: Balance,
        #[case] from_id: AccountId,
        #[case] to_id: AccountId,
        #[case] expected: LedgerError,
    ) {
        assert_eq!(
            ledger.manager.transfer(&mut ledger.conn, amount, from_id, to_id),
            Err(expected)
        );
        assert!(!ledger.conn.in_transaction());
        assert_eq!(ledger.store.open_transactions(), 0);
        assert_eq!(total(&mut ledger), REFERENCE_TOTAL);
        assert_eq!(ledger.manager.read_balance(&mut ledger.conn, 7), Ok(1100));
    }

    #[rstest]
    fn test_transfer_entire_balance(mut ledger: Ledger) {
        ledger.manager.transfer(&mut ledger.conn, 500, 8, 108).unwrap();
        assert_eq!(ledger.manager.read_balance(&mut ledger.conn, 8), Ok(0));
        assert_eq!(ledger.manager.read_balance(&mut ledger.conn, 108), Ok(750));
    }

    #[rstest]
    fn test_self_transfer_is_a_no_op(mut ledger: Ledger) {
        ledger.manager.transfer(&mut ledger.conn, 50, 5, 5).unwrap();
        assert_eq!(ledger.manager.read_balance(&mut ledger.conn, 5), Ok(100));
    }

    #[rstest]
    fn test_transfer_overflow_rolls_back(mut ledger: Ledger) {
        ledger
            .manager
            .update_account_balance(&mut ledger.conn, 107, Balance::MAX, Duration::ZERO)
            .unwrap();

        let result = ledger.manager.transfer(&mut ledger.conn, 100, 7, 107);
        assert!(matches!(
            result,
            Err(LedgerError::StoreFailure(StoreError::ConstraintViolation { .. }))
        ));
        assert_eq!(ledger.manager.read_balance(&mut ledger.conn, 7), Ok(1100));
    }

    #[rstest]
    fn test_create_account(mut ledger: Ledger) {
        ledger
            .manager
            .create_account(&mut ledger.conn, 10, 1, 25, 9_000_000)
            .unwrap();
        assert_eq!(
            ledger.manager.read_balance(&mut ledger.conn, 25),
            Ok(9_000_000)
        );
        assert_eq!(total(&mut ledger), REFERENCE_TOTAL + 9_000_000);
    }

    #[rstest]
    #[case::duplicate(10, 7, StoreError::DuplicateKey { account_id: 7 })]
    #[case::unknown_customer(99, 25, StoreError::ForeignKeyViolation { customer_id: 99 })]
    fn test_create_account_failures(
        mut ledger: Ledger,
        #[case] customer_id: CustomerId,
        #[case] account_id: AccountId,
        #[case] source: StoreError,
    ) {
        assert_eq!(
            ledger
                .manager
                .create_account(&mut ledger.conn, customer_id, 1, account_id, 10),
            Err(LedgerError::account_creation(account_id, source))
        );
        assert!(!ledger.conn.in_transaction());
        assert_eq!(total(&mut ledger), REFERENCE_TOTAL);
    }

    #[rstest]
    fn test_update_account_balance(mut ledger: Ledger) {
        ledger
            .manager
            .update_account_balance(&mut ledger.conn, 115, 3_000_000, Duration::ZERO)
            .unwrap();
        assert_eq!(total(&mut ledger), 5_577_160);
    }

    #[rstest]
    fn test_update_missing_account(mut ledger: Ledger) {
        let mut hook_ran = false;
        let result = ledger.manager.update_account_balance_with(
            &mut ledger.conn,
            150,
            1,
            || hook_ran = true,
        );
        assert_eq!(result, Err(LedgerError::AccountNotFound(150)));
        assert!(!hook_ran);
        assert!(!ledger.conn.in_transaction());
    }

    #[test]
    fn test_totals_on_empty_store() {
        let store = MemoryStore::default();
        let mut conn = store.connect().unwrap();
        let manager = TransactionManager::default();
        assert_eq!(
            manager.get_totals_with(&mut conn, || {}),
            Err(LedgerError::NoRecordsFound)
        );
        assert!(!conn.in_transaction());
    }

    #[rstest]
    #[case::found(5, "Balance for account 5: 100")]
    #[case::missing(150, "Account 150 not found.")]
    fn test_query_balance(mut ledger: Ledger, #[case] account_id: AccountId, #[case] expected: &str) {
        assert_eq!(ledger.manager.query_balance(&mut ledger.conn, account_id), expected);
    }

    #[rstest]
    #[case::ok(100, 7, 107, "Transferred 100 from account 7 to 107")]
    #[case::insufficient(1000, 8, 108, "Transfer failed because of insufficient balance.")]
    #[case::cross_customer(
        1000,
        17,
        119,
        "Transfer failed because accounts do not belong to same customer."
    )]
    fn test_do_transfer(
        mut ledger: Ledger,
        #[case] amount: Balance,
        #[case] from_id: AccountId,
        #[case] to_id: AccountId,
        #[case] expected: &str,
    ) {
        assert_eq!(
            ledger.manager.do_transfer(&mut ledger.conn, amount, from_id, to_id),
            expected
        );
    }

    #[test]
    fn test_dirty_reader_sees_update_during_writer_delay() {
        let store = MemoryStore::default();
        dataset::load(&store, &Dataset::reference().unwrap()).unwrap();
        let mut reader = store.connect().unwrap();
        reader
            .set_isolation_level(IsolationLevel::ReadUncommitted)
            .unwrap();
        let mut writer = store.connect().unwrap();

        let reader_manager = TransactionManager::new(LedgerConfig::new(Duration::from_millis(600)));
        let writer_manager = TransactionManager::default();
        let delay = Duration::from_millis(1500);

        thread::scope(|s| {
            let writer_thread = s.spawn(|| {
                // start after the reader's first sum
                thread::sleep(Duration::from_millis(150));
                let started = Instant::now();
                writer_manager
                    .update_account_balance(&mut writer, 115, 3_000_000, delay)
                    .unwrap();
                started.elapsed()
            });

            let totals = reader_manager.get_totals(&mut reader).unwrap();
            assert!(
                !writer_thread.is_finished(),
                "writer committed before the second sum"
            );
            assert_eq!(totals, (2_578_180, 5_577_160));

            let elapsed = writer_thread.join().unwrap();
            assert!(elapsed >= delay);
        });

        assert_eq!(writer_manager.read_balance(&mut reader, 115), Ok(3_000_000));
        assert_eq!(store.open_transactions(), 0);
    }
}
