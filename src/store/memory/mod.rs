//! In-process ledger store
//!
//! `MemoryStore` keeps the `Customer` and `Account` tables in memory behind a
//! single mutex. Rows are versioned so snapshot readers can see the data as of
//! their first statement, and a lock manager with shared, exclusive and
//! intention locks gives the locking isolation levels their blocking behavior.
//!
//! Connections block on a condition variable while a lock they need is held by
//! another session, up to the configured lock timeout.

mod connection;
pub mod engine;
pub mod lock_manager;

pub use connection::MemoryConnection;

use crate::store::{SessionId, Store, StoreResult};
use engine::Engine;
use log::debug;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default time a session waits for a lock before giving up
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Tuning knobs for the memory store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// How long a blocked lock request waits before failing with `LockTimeout`
    pub lock_timeout: Duration,

    /// Whether lock waits are checked for wait-for cycles
    ///
    /// When disabled, deadlocked sessions only recover through the lock timeout.
    pub deadlock_detection: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            deadlock_detection: true,
        }
    }
}

impl StoreConfig {
    /// Config with the given lock timeout; zero falls back to the default
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        let lock_timeout = if lock_timeout.is_zero() {
            DEFAULT_LOCK_TIMEOUT
        } else {
            lock_timeout
        };
        Self {
            lock_timeout,
            ..Self::default()
        }
    }
}

/// State shared by the store and all of its connections
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) engine: Mutex<Engine>,
    pub(crate) lock_released: Condvar,
    pub(crate) config: StoreConfig,
    next_session: AtomicU64,
}

/// In-memory ledger store
///
/// Cloning is cheap; clones share the same tables.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new(config: StoreConfig) -> Self {
        debug!(
            "Creating memory store (lock timeout {:?}, deadlock detection {})",
            config.lock_timeout, config.deadlock_detection
        );
        Self {
            shared: Arc::new(Shared {
                engine: Mutex::new(Engine::new()),
                lock_released: Condvar::new(),
                config,
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Number of transactions currently open across all connections
    pub fn open_transactions(&self) -> usize {
        self.shared.engine.lock().open_transactions()
    }

    fn next_session(&self) -> SessionId {
        self.shared.next_session.fetch_add(1, Ordering::Relaxed)
    }
}

impl Store for MemoryStore {
    type Conn = MemoryConnection;

    fn connect(&self) -> StoreResult<MemoryConnection> {
        let session = self.next_session();
        debug!("Opened session {}", session);
        Ok(MemoryConnection::new(Arc::clone(&self.shared), session))
    }
}
