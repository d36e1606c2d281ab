//! Lock table for the memory store
//!
//! Tracks which transaction holds which lock on which resource, decides lock
//! compatibility and keeps the wait-for graph used for deadlock detection.
//! The lock manager never blocks; waiting is done by the connection, which
//! owns the condition variable.

use crate::types::{AccountId, CustomerId};
use std::collections::{HashMap, HashSet};

/// Store-internal transaction identifier
pub type TxnId = u64;

/// Lock modes, following the usual multi-granularity scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Intention to take shared locks on rows of a table
    IntentionShared,
    /// Intention to take exclusive locks on rows of a table
    IntentionExclusive,
    /// Read lock
    Shared,
    /// Write lock
    Exclusive,
}

impl LockMode {
    /// Whether a lock in this mode can coexist with `other` held by another transaction
    pub fn compatible_with(self, other: LockMode) -> bool {
        use LockMode::*;
        match (self, other) {
            (Exclusive, _) | (_, Exclusive) => false,
            (IntentionShared, _) | (_, IntentionShared) => true,
            (IntentionExclusive, IntentionExclusive) => true,
            (Shared, Shared) => true,
            (Shared, IntentionExclusive) | (IntentionExclusive, Shared) => false,
        }
    }

    /// Whether holding this mode already grants everything `requested` would
    pub fn covers(self, requested: LockMode) -> bool {
        use LockMode::*;
        match self {
            Exclusive => true,
            Shared => matches!(requested, Shared | IntentionShared),
            IntentionExclusive => matches!(requested, IntentionExclusive | IntentionShared),
            IntentionShared => requested == IntentionShared,
        }
    }
}

/// Lockable resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    /// The `Account` table as a whole
    AccountTable,
    /// The `Customer` table as a whole
    CustomerTable,
    /// One account key
    Account(AccountId),
    /// One customer key
    Customer(CustomerId),
}

/// Granted locks and pending waits
#[derive(Debug, Default)]
pub struct LockManager {
    /// Resource -> holders
    granted: HashMap<Resource, Vec<(TxnId, LockMode)>>,

    /// Transaction -> locks it holds
    owned: HashMap<TxnId, Vec<(Resource, LockMode)>>,

    /// Transaction -> transactions it is waiting for
    waits_for: HashMap<TxnId, HashSet<TxnId>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `txn` already holds a lock covering `mode` on `resource`
    pub fn holds(&self, txn: TxnId, resource: Resource, mode: LockMode) -> bool {
        self.granted.get(&resource).is_some_and(|holders| {
            holders
                .iter()
                .any(|&(holder, held)| holder == txn && held.covers(mode))
        })
    }

    /// Other transactions whose locks on `resource` conflict with `mode`
    ///
    /// Returns an empty list when the lock can be granted right away.
    pub fn blockers(&self, txn: TxnId, resource: Resource, mode: LockMode) -> Vec<TxnId> {
        let mut blockers: Vec<TxnId> = self
            .granted
            .get(&resource)
            .map(|holders| {
                holders
                    .iter()
                    .filter(|&&(holder, held)| holder != txn && !mode.compatible_with(held))
                    .map(|&(holder, _)| holder)
                    .collect()
            })
            .unwrap_or_default();
        blockers.sort_unstable();
        blockers.dedup();
        blockers
    }

    /// Record a granted lock
    pub fn grant(&mut self, txn: TxnId, resource: Resource, mode: LockMode) {
        self.granted.entry(resource).or_default().push((txn, mode));
        self.owned.entry(txn).or_default().push((resource, mode));
    }

    /// Release one previously granted lock
    pub fn release(&mut self, txn: TxnId, resource: Resource, mode: LockMode) {
        if let Some(holders) = self.granted.get_mut(&resource) {
            if let Some(pos) = holders.iter().position(|&entry| entry == (txn, mode)) {
                holders.swap_remove(pos);
            }
            if holders.is_empty() {
                self.granted.remove(&resource);
            }
        }
        if let Some(locks) = self.owned.get_mut(&txn) {
            if let Some(pos) = locks.iter().position(|&entry| entry == (resource, mode)) {
                locks.swap_remove(pos);
            }
        }
    }

    /// Release every lock held by `txn` and forget its waits
    ///
    /// Returns the number of locks released.
    pub fn release_all(&mut self, txn: TxnId) -> usize {
        self.waits_for.remove(&txn);
        let locks = self.owned.remove(&txn).unwrap_or_default();
        for &(resource, mode) in &locks {
            if let Some(holders) = self.granted.get_mut(&resource) {
                if let Some(pos) = holders.iter().position(|&entry| entry == (txn, mode)) {
                    holders.swap_remove(pos);
                }
                if holders.is_empty() {
                    self.granted.remove(&resource);
                }
            }
        }
        locks.len()
    }

    /// Number of locks currently held by `txn`
    #[cfg(test)]
    pub fn held_count(&self, txn: TxnId) -> usize {
        self.owned.get(&txn).map_or(0, Vec::len)
    }

    /// Record that `txn` waits for `blockers`
    pub fn set_waiting(&mut self, txn: TxnId, blockers: &[TxnId]) {
        self.waits_for
            .insert(txn, blockers.iter().copied().collect());
    }

    /// `txn` is no longer waiting
    pub fn clear_waiting(&mut self, txn: TxnId) {
        self.waits_for.remove(&txn);
    }

    /// Whether the wait-for graph contains a cycle through `txn`
    pub fn would_deadlock(&self, txn: TxnId) -> bool {
        let mut stack: Vec<TxnId> = self
            .waits_for
            .get(&txn)
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default();
        let mut visited = HashSet::new();

        while let Some(current) = stack.pop() {
            if current == txn {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(next) = self.waits_for.get(&current) {
                stack.extend(next.iter().copied());
            }
        }
        false
    }
}
