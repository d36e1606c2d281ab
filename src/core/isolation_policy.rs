//! Isolation policy
//!
//! Maps the abstract isolation requirements the ledger is tested under onto
//! the concrete levels a backend understands, and names the five canonical
//! test configurations.

use crate::store::{Connection, IsolationLevel, StoreResult};
use log::debug;
use std::fmt;

/// Abstract isolation requirement
///
/// Each variant is defined by the anomalies it must prevent and whether a
/// concurrent writer has to block:
///
/// | Requirement | Dirty read | Non-repeatable read | Phantom |
/// |---|---|---|---|
/// | `ReadUncommitted` | allowed | allowed | allowed |
/// | `ReadCommittedSnapshot` | prevented | prevented | prevented |
/// | `ReadCommittedLocking` | prevented | allowed | allowed |
/// | `RepeatableRead` | prevented | prevented | allowed |
/// | `SerializableSnapshot` | prevented | prevented | prevented |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationRequirement {
    /// Reads may observe uncommitted writes of other transactions
    ReadUncommitted,

    /// Reads see a point-in-time view and never block writers
    ReadCommittedSnapshot,

    /// Reads see committed data only and hold shared locks per statement
    ReadCommittedLocking,

    /// Rows once read cannot change until commit; new rows may appear
    RepeatableRead,

    /// Repeated reads, including range reads, return identical results
    SerializableSnapshot,
}

impl IsolationRequirement {
    /// Backend level that satisfies this requirement
    ///
    /// `ReadCommittedSnapshot` needs a stable view for the whole transaction,
    /// so it maps to transaction-level snapshot isolation rather than
    /// statement-level row versioning. `SerializableSnapshot` must also keep
    /// concurrent inserts out of a repeated range read, so it maps to locking
    /// serializable.
    pub fn backend_level(self) -> IsolationLevel {
        match self {
            IsolationRequirement::ReadUncommitted => IsolationLevel::ReadUncommitted,
            IsolationRequirement::ReadCommittedSnapshot => IsolationLevel::Snapshot,
            IsolationRequirement::ReadCommittedLocking => IsolationLevel::ReadCommitted,
            IsolationRequirement::RepeatableRead => IsolationLevel::RepeatableRead,
            IsolationRequirement::SerializableSnapshot => IsolationLevel::Serializable,
        }
    }
}

impl fmt::Display for IsolationRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsolationRequirement::ReadUncommitted => "read uncommitted",
            IsolationRequirement::ReadCommittedSnapshot => "read committed (snapshot)",
            IsolationRequirement::ReadCommittedLocking => "read committed (locking)",
            IsolationRequirement::RepeatableRead => "repeatable read",
            IsolationRequirement::SerializableSnapshot => "serializable",
        };
        f.write_str(name)
    }
}

/// Configure `conn` so its next transaction runs under `requirement`
///
/// # Errors
///
/// Returns `StoreError::TransactionActive` if `conn` has an open transaction.
pub fn apply<C: Connection>(conn: &mut C, requirement: IsolationRequirement) -> StoreResult<()> {
    let level = requirement.backend_level();
    debug!(
        "Session {}: {} -> {}",
        conn.session_id(),
        requirement,
        level
    );
    conn.set_isolation_level(level)
}

/// The five canonical isolation test configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationConfig {
    Config1,
    Config2,
    Config3,
    Config4,
    Config5,
}

impl IsolationConfig {
    /// All configurations in order
    pub const ALL: [IsolationConfig; 5] = [
        IsolationConfig::Config1,
        IsolationConfig::Config2,
        IsolationConfig::Config3,
        IsolationConfig::Config4,
        IsolationConfig::Config5,
    ];

    /// Requirement exercised by this configuration
    pub fn requirement(self) -> IsolationRequirement {
        match self {
            IsolationConfig::Config1 => IsolationRequirement::ReadUncommitted,
            IsolationConfig::Config2 => IsolationRequirement::ReadCommittedSnapshot,
            IsolationConfig::Config3 => IsolationRequirement::ReadCommittedLocking,
            IsolationConfig::Config4 => IsolationRequirement::RepeatableRead,
            IsolationConfig::Config5 => IsolationRequirement::SerializableSnapshot,
        }
    }

    /// 1-based configuration number
    pub fn number(self) -> u8 {
        match self {
            IsolationConfig::Config1 => 1,
            IsolationConfig::Config2 => 2,
            IsolationConfig::Config3 => 3,
            IsolationConfig::Config4 => 4,
            IsolationConfig::Config5 => 5,
        }
    }

    /// Configuration by its 1-based number
    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|config| config.number() == number)
    }
}

impl fmt::Display for IsolationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Config{}", self.number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Statement, Store, StoreError};
    use rstest::rstest;

    #[rstest]
    #[case(IsolationConfig::Config1, IsolationLevel::ReadUncommitted)]
    #[case(IsolationConfig::Config2, IsolationLevel::Snapshot)]
    #[case(IsolationConfig::Config3, IsolationLevel::ReadCommitted)]
    #[case(IsolationConfig::Config4, IsolationLevel::RepeatableRead)]
    #[case(IsolationConfig::Config5, IsolationLevel::Serializable)]
    fn test_config_backend_level(#[case] config: IsolationConfig, #[case] expected: IsolationLevel) {
        assert_eq!(config.requirement().backend_level(), expected);
    }

    #[rstest]
    #[case(1, Some(IsolationConfig::Config1))]
    #[case(5, Some(IsolationConfig::Config5))]
    #[case(0, None)]
    #[case(6, None)]
    fn test_from_number(#[case] number: u8, #[case] expected: Option<IsolationConfig>) {
        assert_eq!(IsolationConfig::from_number(number), expected);
    }

    #[test]
    fn test_apply_sets_connection_level() {
        let store = MemoryStore::default();
        let mut conn = store.connect().unwrap();
        apply(&mut conn, IsolationRequirement::ReadCommittedSnapshot).unwrap();
        assert_eq!(conn.isolation_level(), IsolationLevel::Snapshot);
    }

    #[test]
    fn test_apply_rejected_inside_transaction() {
        let store = MemoryStore::default();
        let mut conn = store.connect().unwrap();
        conn.execute(&Statement::CountAccounts).unwrap();
        assert_eq!(
            apply(&mut conn, IsolationRequirement::RepeatableRead),
            Err(StoreError::TransactionActive {
                session: conn.session_id()
            })
        );
    }
}
