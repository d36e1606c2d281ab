//! Commit markers
//!
//! Records which side of a scenario committed first.

use std::fmt;
use std::sync::OnceLock;

/// Which side of an isolation scenario committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitMarker {
    /// The reader running the totals query
    Query,
    /// The writer updating or inserting a row
    Update,
}

impl fmt::Display for CommitMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitMarker::Query => f.write_str("QUERY"),
            CommitMarker::Update => f.write_str("UPDATE"),
        }
    }
}

/// Write-once record of the first commit in a scenario
///
/// Both sessions report their commit from inside the store; only the first
/// report sticks.
#[derive(Debug, Default)]
pub struct CommitOrder {
    first: OnceLock<CommitMarker>,
}

impl CommitOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a commit; returns `true` if it was the first one
    pub fn record(&self, marker: CommitMarker) -> bool {
        self.first.set(marker).is_ok()
    }

    /// The first recorded commit, if any
    pub fn first(&self) -> Option<CommitMarker> {
        self.first.get().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_display() {
        assert_eq!(CommitMarker::Query.to_string(), "QUERY");
        assert_eq!(CommitMarker::Update.to_string(), "UPDATE");
    }

    #[test]
    fn test_only_first_commit_is_kept() {
        let order = CommitOrder::new();
        assert_eq!(order.first(), None);
        assert!(order.record(CommitMarker::Update));
        assert!(!order.record(CommitMarker::Query));
        assert_eq!(order.first(), Some(CommitMarker::Update));
    }
}
