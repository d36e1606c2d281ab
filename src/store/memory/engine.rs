//! Versioned ledger tables for the memory store
//!
//! Each row keeps a chain of committed versions plus at most one uncommitted
//! version staged by the transaction holding the row's exclusive lock. Which
//! version a read sees depends on the reading transaction's isolation level.
//!
//! Everything here runs under the store mutex and never blocks; lock waits are
//! handled by the connection before `Engine::apply` is called.

use crate::store::memory::lock_manager::{LockManager, LockMode, Resource, TxnId};
use crate::store::{IsolationLevel, RowSet, SessionId, Statement, StoreError, StoreResult};
use crate::types::{Account, AccountId, Customer, CustomerId};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Commit timestamp; increases by one for every committed write transaction
pub type CommitTs = u64;

/// Which versions a read may observe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadView {
    /// Latest version, committed or not
    Uncommitted,
    /// Latest committed version
    Committed,
    /// Latest version committed at or before the given timestamp
    Snapshot(CommitTs),
}

#[derive(Debug)]
struct Version<V> {
    commit_ts: CommitTs,
    value: V,
}

/// Committed versions of one row and its staged write, if any
#[derive(Debug)]
pub struct RowChain<V> {
    versions: Vec<Version<V>>,
    pending: Option<(TxnId, V)>,
}

impl<V> Default for RowChain<V> {
    fn default() -> Self {
        Self {
            versions: Vec::new(),
            pending: None,
        }
    }
}

impl<V> RowChain<V> {
    /// Value visible to `txn` under `view`
    ///
    /// A transaction always sees its own staged write.
    pub fn visible(&self, txn: TxnId, view: ReadView) -> Option<&V> {
        if let Some((writer, value)) = &self.pending {
            if *writer == txn || view == ReadView::Uncommitted {
                return Some(value);
            }
        }
        match view {
            ReadView::Snapshot(ts) => self
                .versions
                .iter()
                .rev()
                .find(|version| version.commit_ts <= ts)
                .map(|version| &version.value),
            ReadView::Uncommitted | ReadView::Committed => {
                self.versions.last().map(|version| &version.value)
            }
        }
    }

    /// Value a write by `txn` starts from: its own staged write or the latest commit
    pub fn current_for_write(&self, txn: TxnId) -> Option<&V> {
        self.visible(txn, ReadView::Committed)
    }

    /// Timestamp of the latest committed version
    pub fn latest_commit_ts(&self) -> Option<CommitTs> {
        self.versions.last().map(|version| version.commit_ts)
    }

    /// Stage an uncommitted value for `txn`
    pub fn stage(&mut self, txn: TxnId, value: V) {
        self.pending = Some((txn, value));
    }

    /// Turn `txn`'s staged value into a committed version
    pub fn install(&mut self, txn: TxnId, commit_ts: CommitTs) {
        if matches!(&self.pending, Some((writer, _)) if *writer == txn) {
            if let Some((_, value)) = self.pending.take() {
                self.versions.push(Version { commit_ts, value });
            }
        }
    }

    /// Drop `txn`'s staged value
    pub fn discard(&mut self, txn: TxnId) {
        if matches!(&self.pending, Some((writer, _)) if *writer == txn) {
            self.pending = None;
        }
    }

    /// Whether the row has neither committed nor staged versions
    pub fn is_vacant(&self) -> bool {
        self.versions.is_empty() && self.pending.is_none()
    }

    /// Drop versions no active snapshot can reach
    ///
    /// Keeps the newest version at or before `horizon` and everything after it;
    /// without a horizon only the latest version survives.
    pub fn prune(&mut self, horizon: Option<CommitTs>) {
        if self.versions.len() <= 1 {
            return;
        }
        let keep_from = match horizon {
            Some(ts) => self
                .versions
                .iter()
                .rposition(|version| version.commit_ts <= ts)
                .unwrap_or(0),
            None => self.versions.len() - 1,
        };
        self.versions.drain(..keep_from);
    }

    /// Number of committed versions retained
    #[cfg(test)]
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }
}

/// How long a granted lock is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    /// Released when the statement finishes
    Statement,
    /// Released at commit or rollback
    Transaction,
}

/// A lock a statement needs before it can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRequest {
    pub resource: Resource,
    pub mode: LockMode,
    pub scope: LockScope,
}

impl LockRequest {
    fn statement(resource: Resource, mode: LockMode) -> Self {
        Self {
            resource,
            mode,
            scope: LockScope::Statement,
        }
    }

    fn transaction(resource: Resource, mode: LockMode) -> Self {
        Self {
            resource,
            mode,
            scope: LockScope::Transaction,
        }
    }
}

/// Bookkeeping for an open transaction
#[derive(Debug)]
struct TxnRecord {
    session: SessionId,
    level: IsolationLevel,
    snapshot: CommitTs,
    accounts_written: BTreeSet<AccountId>,
    customers_written: BTreeSet<CustomerId>,
}

/// Ledger tables, open transactions and the lock table
#[derive(Debug, Default)]
pub struct Engine {
    accounts: BTreeMap<AccountId, RowChain<Account>>,
    customers: BTreeMap<CustomerId, RowChain<Customer>>,
    txns: HashMap<TxnId, TxnRecord>,
    next_txn: TxnId,
    last_commit: CommitTs,
    pub locks: LockManager,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a transaction for `session`; its snapshot is the latest commit
    pub fn begin(&mut self, session: SessionId, level: IsolationLevel) -> TxnId {
        self.next_txn += 1;
        let txn = self.next_txn;
        self.txns.insert(
            txn,
            TxnRecord {
                session,
                level,
                snapshot: self.last_commit,
                accounts_written: BTreeSet::new(),
                customers_written: BTreeSet::new(),
            },
        );
        txn
    }

    /// Number of open transactions
    pub fn open_transactions(&self) -> usize {
        self.txns.len()
    }

    /// Session that owns `txn`
    pub fn session_of(&self, txn: TxnId) -> Option<SessionId> {
        self.txns.get(&txn).map(|record| record.session)
    }

    /// Locks `statement` needs when run by `txn`, in acquisition order
    pub fn lock_plan(&self, txn: TxnId, statement: &Statement) -> Vec<LockRequest> {
        let level = self
            .txns
            .get(&txn)
            .map_or(IsolationLevel::default(), |record| record.level);

        match statement {
            Statement::SelectAccount {
                account_id,
                for_update: true,
            }
            | Statement::SetBalance { account_id, .. }
            | Statement::AdjustBalance { account_id, .. } => vec![
                LockRequest::transaction(Resource::AccountTable, LockMode::IntentionExclusive),
                LockRequest::transaction(Resource::Account(*account_id), LockMode::Exclusive),
            ],
            Statement::SelectAccount {
                account_id,
                for_update: false,
            } => read_locks(level, &[*account_id]),
            Statement::SumBalances | Statement::CountAccounts => {
                let keys: Vec<AccountId> = self.accounts.keys().copied().collect();
                read_locks(level, &keys)
            }
            Statement::InsertAccount(account) => vec![
                LockRequest::transaction(Resource::AccountTable, LockMode::IntentionExclusive),
                LockRequest::transaction(Resource::Account(account.account_id), LockMode::Exclusive),
                LockRequest::statement(Resource::CustomerTable, LockMode::IntentionShared),
                LockRequest::statement(Resource::Customer(account.customer_id), LockMode::Shared),
            ],
            Statement::InsertCustomer(customer) => vec![
                LockRequest::transaction(Resource::CustomerTable, LockMode::IntentionExclusive),
                LockRequest::transaction(Resource::Customer(customer.customer_id), LockMode::Exclusive),
            ],
        }
    }

    /// Run `statement` for `txn`, assuming its lock plan has been granted
    pub fn apply(&mut self, txn: TxnId, statement: &Statement) -> StoreResult<RowSet> {
        let view = self.view_of(txn);

        match statement {
            Statement::SelectAccount {
                account_id,
                for_update,
            } => {
                let row = if *for_update {
                    self.check_write_conflict(txn, *account_id)?;
                    self.accounts
                        .get(account_id)
                        .and_then(|chain| chain.current_for_write(txn))
                } else {
                    self.accounts
                        .get(account_id)
                        .and_then(|chain| chain.visible(txn, view))
                };
                Ok(RowSet::Accounts(row.cloned().into_iter().collect()))
            }
            Statement::SumBalances => {
                let mut total: i64 = 0;
                let mut rows = 0usize;
                for account in self
                    .accounts
                    .values()
                    .filter_map(|chain| chain.visible(txn, view))
                {
                    total = total.checked_add(account.balance).ok_or_else(|| {
                        StoreError::constraint_violation("sum(balance) overflow")
                    })?;
                    rows += 1;
                }
                Ok(RowSet::Scalar((rows > 0).then_some(total)))
            }
            Statement::CountAccounts => {
                let rows = self
                    .accounts
                    .values()
                    .filter(|chain| chain.visible(txn, view).is_some())
                    .count();
                Ok(RowSet::Scalar(Some(rows as i64)))
            }
            Statement::SetBalance {
                account_id,
                balance,
            } => self.write_account(txn, *account_id, |account| {
                account.balance = *balance;
                Ok(())
            }),
            Statement::AdjustBalance { account_id, delta } => {
                self.write_account(txn, *account_id, |account| {
                    account.balance = account.balance.checked_add(*delta).ok_or_else(|| {
                        StoreError::constraint_violation(format!(
                            "balance overflow on account {}",
                            account.account_id
                        ))
                    })?;
                    Ok(())
                })
            }
            Statement::InsertAccount(account) => self.insert_account(txn, account.clone()),
            Statement::InsertCustomer(customer) => self.insert_customer(txn, customer.clone()),
        }
    }

    /// Install `txn`'s writes and release its locks
    ///
    /// Returns the commit timestamp, or `None` for a read-only transaction.
    pub fn commit(&mut self, txn: TxnId) -> Option<CommitTs> {
        let record = self.txns.remove(&txn)?;
        let wrote = !record.accounts_written.is_empty() || !record.customers_written.is_empty();
        let commit_ts = wrote.then(|| {
            self.last_commit += 1;
            self.last_commit
        });

        if let Some(ts) = commit_ts {
            let horizon = self.snapshot_horizon();
            for account_id in &record.accounts_written {
                if let Some(chain) = self.accounts.get_mut(account_id) {
                    chain.install(txn, ts);
                    chain.prune(horizon);
                }
            }
            for customer_id in &record.customers_written {
                if let Some(chain) = self.customers.get_mut(customer_id) {
                    chain.install(txn, ts);
                    chain.prune(horizon);
                }
            }
        }

        self.locks.release_all(txn);
        commit_ts
    }

    /// Discard `txn`'s writes and release its locks
    pub fn rollback(&mut self, txn: TxnId) {
        let Some(record) = self.txns.remove(&txn) else {
            self.locks.release_all(txn);
            return;
        };

        for account_id in &record.accounts_written {
            if let Some(chain) = self.accounts.get_mut(account_id) {
                chain.discard(txn);
                if chain.is_vacant() {
                    self.accounts.remove(account_id);
                }
            }
        }
        for customer_id in &record.customers_written {
            if let Some(chain) = self.customers.get_mut(customer_id) {
                chain.discard(txn);
                if chain.is_vacant() {
                    self.customers.remove(customer_id);
                }
            }
        }

        self.locks.release_all(txn);
    }

    /// Committed versions retained for an account (zero if it does not exist)
    #[cfg(test)]
    pub fn version_count(&self, account_id: AccountId) -> usize {
        self.accounts
            .get(&account_id)
            .map_or(0, RowChain::version_count)
    }

    fn view_of(&self, txn: TxnId) -> ReadView {
        match self.txns.get(&txn) {
            Some(record) => match record.level {
                IsolationLevel::ReadUncommitted => ReadView::Uncommitted,
                IsolationLevel::Snapshot => ReadView::Snapshot(record.snapshot),
                IsolationLevel::ReadCommitted
                | IsolationLevel::RepeatableRead
                | IsolationLevel::Serializable => ReadView::Committed,
            },
            None => ReadView::Committed,
        }
    }

    /// Oldest snapshot still needed by an open snapshot transaction
    fn snapshot_horizon(&self) -> Option<CommitTs> {
        self.txns
            .values()
            .filter(|record| record.level == IsolationLevel::Snapshot)
            .map(|record| record.snapshot)
            .min()
    }

    /// First committer wins: a snapshot transaction may not overwrite a newer commit
    fn check_write_conflict(&self, txn: TxnId, account_id: AccountId) -> StoreResult<()> {
        let Some(record) = self.txns.get(&txn) else {
            return Ok(());
        };
        if record.level != IsolationLevel::Snapshot {
            return Ok(());
        }
        let newer = self
            .accounts
            .get(&account_id)
            .and_then(RowChain::latest_commit_ts)
            .is_some_and(|ts| ts > record.snapshot);
        if newer {
            return Err(StoreError::WriteConflict { account_id });
        }
        Ok(())
    }

    fn write_account<F>(&mut self, txn: TxnId, account_id: AccountId, f: F) -> StoreResult<RowSet>
    where
        F: FnOnce(&mut Account) -> StoreResult<()>,
    {
        self.check_write_conflict(txn, account_id)?;

        let Some(chain) = self.accounts.get_mut(&account_id) else {
            return Ok(RowSet::Affected(0));
        };
        let Some(current) = chain.current_for_write(txn) else {
            return Ok(RowSet::Affected(0));
        };

        let mut updated = current.clone();
        f(&mut updated)?;
        chain.stage(txn, updated);
        self.record_account_write(txn, account_id);
        Ok(RowSet::Affected(1))
    }

    fn insert_account(&mut self, txn: TxnId, account: Account) -> StoreResult<RowSet> {
        let customer_exists = self
            .customers
            .get(&account.customer_id)
            .and_then(|chain| chain.current_for_write(txn))
            .is_some();
        if !customer_exists {
            return Err(StoreError::ForeignKeyViolation {
                customer_id: account.customer_id,
            });
        }

        let account_id = account.account_id;
        let chain = self.accounts.entry(account_id).or_default();
        if chain.current_for_write(txn).is_some() {
            return Err(StoreError::DuplicateKey { account_id });
        }
        chain.stage(txn, account);
        self.record_account_write(txn, account_id);
        Ok(RowSet::Affected(1))
    }

    fn insert_customer(&mut self, txn: TxnId, customer: Customer) -> StoreResult<RowSet> {
        let customer_id = customer.customer_id;
        let chain = self.customers.entry(customer_id).or_default();
        if chain.current_for_write(txn).is_some() {
            return Err(StoreError::DuplicateCustomer { customer_id });
        }
        chain.stage(txn, customer);
        if let Some(record) = self.txns.get_mut(&txn) {
            record.customers_written.insert(customer_id);
        }
        Ok(RowSet::Affected(1))
    }

    fn record_account_write(&mut self, txn: TxnId, account_id: AccountId) {
        if let Some(record) = self.txns.get_mut(&txn) {
            record.accounts_written.insert(account_id);
        }
    }
}

/// Read locks for `keys` at `level`
fn read_locks(level: IsolationLevel, keys: &[AccountId]) -> Vec<LockRequest> {
    match level {
        IsolationLevel::ReadUncommitted | IsolationLevel::Snapshot => Vec::new(),
        IsolationLevel::ReadCommitted => {
            let mut plan = vec![LockRequest::statement(
                Resource::AccountTable,
                LockMode::IntentionShared,
            )];
            plan.extend(
                keys.iter()
                    .map(|&id| LockRequest::statement(Resource::Account(id), LockMode::Shared)),
            );
            plan
        }
        IsolationLevel::RepeatableRead => {
            let mut plan = vec![LockRequest::transaction(
                Resource::AccountTable,
                LockMode::IntentionShared,
            )];
            plan.extend(
                keys.iter()
                    .map(|&id| LockRequest::transaction(Resource::Account(id), LockMode::Shared)),
            );
            plan
        }
        IsolationLevel::Serializable => vec![LockRequest::transaction(
            Resource::AccountTable,
            LockMode::Shared,
        )],
    }
}
