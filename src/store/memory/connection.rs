//! Memory store sessions
//!
//! A connection owns its open transaction and blocks on the store's condvar
//! while a lock it needs is held elsewhere.

use super::engine::{Engine, LockScope};
use super::lock_manager::{LockMode, Resource, TxnId};
use super::Shared;
use crate::store::{
    Connection, IsolationLevel, RowSet, SessionId, SessionObserver, Statement, StoreError,
    StoreResult,
};
use log::{debug, trace, warn};
use parking_lot::MutexGuard;
use std::sync::Arc;
use std::time::Instant;

/// A session on a `MemoryStore`
///
/// Statements run inside an implicit transaction that stays open until
/// `commit` or `rollback`. Dropping the connection rolls back whatever is
/// still open.
pub struct MemoryConnection {
    shared: Arc<Shared>,
    session: SessionId,
    level: IsolationLevel,
    txn: Option<TxnId>,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl MemoryConnection {
    pub(crate) fn new(shared: Arc<Shared>, session: SessionId) -> Self {
        Self {
            shared,
            session,
            level: IsolationLevel::default(),
            txn: None,
            observer: None,
        }
    }

    /// Wait until `mode` on `resource` can be granted to `txn`, then grant it
    ///
    /// # Errors
    ///
    /// * `Deadlock` - waiting would close a cycle in the wait-for graph
    /// * `LockTimeout` - the lock was not released within the lock timeout
    fn acquire(
        &self,
        engine: &mut MutexGuard<'_, Engine>,
        txn: TxnId,
        resource: Resource,
        mode: LockMode,
    ) -> StoreResult<()> {
        let deadline = Instant::now() + self.shared.config.lock_timeout;
        let mut waited = false;

        loop {
            let blockers = engine.locks.blockers(txn, resource, mode);
            if blockers.is_empty() {
                engine.locks.clear_waiting(txn);
                engine.locks.grant(txn, resource, mode);
                if waited {
                    debug!(
                        "Session {} granted {:?} on {:?} after waiting",
                        self.session, mode, resource
                    );
                }
                return Ok(());
            }

            engine.locks.set_waiting(txn, &blockers);
            if self.shared.config.deadlock_detection && engine.locks.would_deadlock(txn) {
                engine.locks.clear_waiting(txn);
                warn!(
                    "Deadlock on {:?}: session {} chosen as victim",
                    resource, self.session
                );
                return Err(StoreError::Deadlock {
                    session: self.session,
                });
            }

            if !waited {
                waited = true;
                let holders: Vec<SessionId> = blockers
                    .iter()
                    .filter_map(|&blocker| engine.session_of(blocker))
                    .collect();
                debug!(
                    "Session {} waiting for {:?} on {:?} (held by sessions {:?})",
                    self.session, mode, resource, holders
                );
                if let Some(observer) = &self.observer {
                    observer.lock_wait();
                }
            }

            if self
                .shared
                .lock_released
                .wait_until(engine, deadline)
                .timed_out()
                && !engine.locks.blockers(txn, resource, mode).is_empty()
            {
                engine.locks.clear_waiting(txn);
                warn!(
                    "Session {} timed out waiting for {:?} on {:?}",
                    self.session, mode, resource
                );
                return Err(StoreError::LockTimeout {
                    session: self.session,
                });
            }
        }
    }
}

impl Connection for MemoryConnection {
    fn session_id(&self) -> SessionId {
        self.session
    }

    fn isolation_level(&self) -> IsolationLevel {
        self.level
    }

    fn set_isolation_level(&mut self, level: IsolationLevel) -> StoreResult<()> {
        if self.txn.is_some() {
            return Err(StoreError::TransactionActive {
                session: self.session,
            });
        }
        debug!("Session {}: {}", self.session, level.as_sql());
        self.level = level;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    fn execute(&mut self, statement: &Statement) -> StoreResult<RowSet> {
        let shared = Arc::clone(&self.shared);
        let mut engine = shared.engine.lock();

        let txn = match self.txn {
            Some(txn) => txn,
            None => {
                let txn = engine.begin(self.session, self.level);
                debug!(
                    "Session {} began transaction {} ({})",
                    self.session, txn, self.level
                );
                self.txn = Some(txn);
                txn
            }
        };
        trace!(
            "Session {} executing {}: {}",
            self.session,
            if statement.locks_for_write() { "write" } else { "read" },
            statement
        );

        let plan = engine.lock_plan(txn, statement);
        let mut statement_locks = Vec::new();
        let mut acquired = Ok(());
        for request in plan {
            if engine.locks.holds(txn, request.resource, request.mode) {
                continue;
            }
            if let Err(e) = self.acquire(&mut engine, txn, request.resource, request.mode) {
                acquired = Err(e);
                break;
            }
            if request.scope == LockScope::Statement {
                statement_locks.push((request.resource, request.mode));
            }
        }

        let result = acquired.and_then(|()| engine.apply(txn, statement));

        for &(resource, mode) in &statement_locks {
            engine.locks.release(txn, resource, mode);
        }
        if matches!(result, Err(StoreError::Deadlock { .. })) {
            engine.rollback(txn);
            self.txn = None;
            debug!(
                "Session {} rolled back transaction {} as deadlock victim",
                self.session, txn
            );
        }

        let released = !statement_locks.is_empty() || self.txn.is_none();
        drop(engine);
        if released {
            shared.lock_released.notify_all();
        }
        result
    }

    fn commit(&mut self) -> StoreResult<()> {
        let Some(txn) = self.txn.take() else {
            return Ok(());
        };

        let mut engine = self.shared.engine.lock();
        let commit_ts = engine.commit(txn);
        if let Some(observer) = &self.observer {
            observer.committed();
        }
        drop(engine);
        self.shared.lock_released.notify_all();

        match commit_ts {
            Some(ts) => debug!(
                "Session {} committed transaction {} at {}",
                self.session, txn, ts
            ),
            None => debug!(
                "Session {} committed read-only transaction {}",
                self.session, txn
            ),
        }
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        let Some(txn) = self.txn.take() else {
            return Ok(());
        };

        self.shared.engine.lock().rollback(txn);
        self.shared.lock_released.notify_all();
        debug!("Session {} rolled back transaction {}", self.session, txn);
        Ok(())
    }

    fn observe(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observer = Some(observer);
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            warn!(
                "Session {} closed with open transaction {}, rolling back",
                self.session, txn
            );
            self.shared.engine.lock().rollback(txn);
            self.shared.lock_released.notify_all();
        }
    }
}
