//! Isolation scenarios
//!
//! A scenario pairs a reader running the totals query under some isolation
//! requirement with a writer that modifies the ledger between the reader's two
//! reads, and states what the reader should see and who should commit first.

use crate::core::{IsolationConfig, IsolationRequirement, TransactionManager};
use crate::harness::marker::CommitMarker;
use crate::io::Dataset;
use crate::store::Connection;
use crate::types::{AccountId, AccountType, Balance, CustomerId, LedgerError};
use std::fmt;

/// Sum of all balances in the reference dataset
pub const REFERENCE_TOTAL: Balance = 2_578_180;

/// Account the update scenarios overwrite
pub const UPDATED_ACCOUNT: AccountId = 115;

/// Balance written to `UPDATED_ACCOUNT`
pub const UPDATED_BALANCE: Balance = 3_000_000;

/// Account the insert scenarios create
pub const INSERTED_ACCOUNT: AccountId = 25;

/// Opening balance of `INSERTED_ACCOUNT`
pub const INSERTED_BALANCE: Balance = 9_000_000;

/// Balances the scenario expectations are computed from
///
/// Expectations follow the dataset the scenarios run on, so a ledger loaded
/// from `--data-dir` is judged against its own sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    /// Sum of all balances before the writer runs
    pub total: Balance,
    /// Balance of `UPDATED_ACCOUNT` before the writer runs
    ///
    /// Zero when the dataset has no such account; the update writer then
    /// fails with `AccountNotFound`.
    pub updated_balance: Balance,
}

impl Baseline {
    /// Baseline of the embedded reference dataset
    pub const REFERENCE: Baseline = Baseline {
        total: REFERENCE_TOTAL,
        updated_balance: 1020,
    };

    /// Baseline of a loaded dataset
    pub fn of(dataset: &Dataset) -> Self {
        let updated_balance = dataset
            .accounts
            .iter()
            .find(|account| account.account_id == UPDATED_ACCOUNT)
            .map_or(0, |account| account.balance);
        Self {
            total: dataset.total_balance(),
            updated_balance,
        }
    }

    /// Total once the update writer has set `UPDATED_ACCOUNT`
    fn after_update(&self) -> Balance {
        self.total - self.updated_balance + UPDATED_BALANCE
    }

    /// Total once the insert writer has created `INSERTED_ACCOUNT`
    fn after_insert(&self) -> Balance {
        self.total + INSERTED_BALANCE
    }

    fn observation(&self, second_sum: Balance, first_commit: CommitMarker) -> Observation {
        Observation {
            sums: (self.total, second_sum),
            first_commit,
        }
    }
}

/// What the writer does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterOp {
    /// Overwrite an existing balance
    UpdateBalance {
        account_id: AccountId,
        new_amount: Balance,
    },

    /// Insert a new account
    CreateAccount {
        customer_id: CustomerId,
        account_type: AccountType,
        account_id: AccountId,
        initial_balance: Balance,
    },
}

impl WriterOp {
    /// Run the operation, calling `before_commit` once its statement succeeded
    pub fn run<C, F>(
        &self,
        manager: &TransactionManager,
        conn: &mut C,
        before_commit: F,
    ) -> Result<(), LedgerError>
    where
        C: Connection,
        F: FnOnce(),
    {
        match *self {
            WriterOp::UpdateBalance {
                account_id,
                new_amount,
            } => manager.update_account_balance_with(conn, account_id, new_amount, before_commit),
            WriterOp::CreateAccount {
                customer_id,
                account_type,
                account_id,
                initial_balance,
            } => manager.create_account_with(
                conn,
                customer_id,
                account_type,
                account_id,
                initial_balance,
                before_commit,
            ),
        }
    }
}

impl fmt::Display for WriterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriterOp::UpdateBalance {
                account_id,
                new_amount,
            } => write!(f, "set account {} to {}", account_id, new_amount),
            WriterOp::CreateAccount {
                account_id,
                customer_id,
                initial_balance,
                ..
            } => write!(
                f,
                "insert account {} for customer {} with {}",
                account_id, customer_id, initial_balance
            ),
        }
    }
}

/// When the writer commits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterCommit {
    /// As soon as its statement succeeds
    Immediately,
    /// Only once the reader has finished or is itself blocked
    AfterReaderFinishes,
}

/// Expected or observed outcome of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// The reader's `(first_sum, second_sum)`
    pub sums: (Balance, Balance),
    /// Which side committed first
    pub first_commit: CommitMarker,
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sums ({}, {}), first commit {}",
            self.sums.0, self.sums.1, self.first_commit
        )
    }
}

/// One reader/writer race
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    pub requirement: IsolationRequirement,
    pub writer: WriterOp,
    pub writer_commit: WriterCommit,
    pub expected: Observation,
}

impl Scenario {
    /// The reference scenario for one of the canonical configurations
    pub fn reference(config: IsolationConfig) -> Self {
        Self::reference_for(config, Baseline::REFERENCE)
    }

    /// The scenario for `config` with expectations taken from `baseline`
    pub fn reference_for(config: IsolationConfig, baseline: Baseline) -> Self {
        let requirement = config.requirement();
        let (writer, writer_commit, expected) = match config {
            IsolationConfig::Config1 => (
                update_writer(),
                WriterCommit::AfterReaderFinishes,
                baseline.observation(baseline.after_update(), CommitMarker::Query),
            ),
            IsolationConfig::Config2 => (
                update_writer(),
                WriterCommit::Immediately,
                baseline.observation(baseline.total, CommitMarker::Update),
            ),
            IsolationConfig::Config3 => (
                update_writer(),
                WriterCommit::Immediately,
                baseline.observation(baseline.after_update(), CommitMarker::Update),
            ),
            IsolationConfig::Config4 => (
                update_writer(),
                WriterCommit::Immediately,
                baseline.observation(baseline.total, CommitMarker::Query),
            ),
            IsolationConfig::Config5 => (
                insert_writer(),
                WriterCommit::Immediately,
                baseline.observation(baseline.total, CommitMarker::Query),
            ),
        };

        Self {
            name: format!("{} ({})", config, requirement),
            requirement,
            writer,
            writer_commit,
            expected,
        }
    }

    /// Repeatable read with a concurrent insert: the new row shows up as a phantom
    pub fn phantom() -> Self {
        Self::phantom_for(Baseline::REFERENCE)
    }

    /// `phantom` with expectations taken from `baseline`
    pub fn phantom_for(baseline: Baseline) -> Self {
        Self {
            name: format!("Phantom ({})", IsolationRequirement::RepeatableRead),
            requirement: IsolationRequirement::RepeatableRead,
            writer: insert_writer(),
            writer_commit: WriterCommit::Immediately,
            expected: baseline.observation(baseline.after_insert(), CommitMarker::Update),
        }
    }
}

/// The five canonical scenarios, in configuration order
pub fn reference_scenarios() -> Vec<Scenario> {
    scenarios_for(Baseline::REFERENCE)
}

/// The five canonical scenarios with expectations taken from `baseline`
pub fn scenarios_for(baseline: Baseline) -> Vec<Scenario> {
    IsolationConfig::ALL
        .into_iter()
        .map(|config| Scenario::reference_for(config, baseline))
        .collect()
}

fn update_writer() -> WriterOp {
    WriterOp::UpdateBalance {
        account_id: UPDATED_ACCOUNT,
        new_amount: UPDATED_BALANCE,
    }
}

fn insert_writer() -> WriterOp {
    WriterOp::CreateAccount {
        customer_id: 10,
        account_type: 1,
        account_id: INSERTED_ACCOUNT,
        initial_balance: INSERTED_BALANCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Account;
    use rstest::rstest;

    #[rstest]
    #[case(IsolationConfig::Config1, (2_578_180, 5_577_160), CommitMarker::Query)]
    #[case(IsolationConfig::Config2, (2_578_180, 2_578_180), CommitMarker::Update)]
    #[case(IsolationConfig::Config3, (2_578_180, 5_577_160), CommitMarker::Update)]
    #[case(IsolationConfig::Config4, (2_578_180, 2_578_180), CommitMarker::Query)]
    #[case(IsolationConfig::Config5, (2_578_180, 2_578_180), CommitMarker::Query)]
    fn test_reference_expectations(
        #[case] config: IsolationConfig,
        #[case] sums: (Balance, Balance),
        #[case] first_commit: CommitMarker,
    ) {
        let scenario = Scenario::reference(config);
        assert_eq!(scenario.expected, Observation { sums, first_commit });
        assert_eq!(scenario.requirement, config.requirement());
    }

    #[test]
    fn test_phantom_expectation() {
        assert_eq!(Scenario::phantom().expected.sums, (2_578_180, 11_578_180));
    }

    #[test]
    fn test_only_dirty_read_scenario_holds_commit() {
        let holding: Vec<_> = reference_scenarios()
            .into_iter()
            .filter(|s| s.writer_commit == WriterCommit::AfterReaderFinishes)
            .map(|s| s.requirement)
            .collect();
        assert_eq!(holding, vec![IsolationRequirement::ReadUncommitted]);
    }

    #[test]
    fn test_reference_baseline_matches_dataset() {
        let dataset = Dataset::reference().unwrap();
        assert_eq!(Baseline::of(&dataset), Baseline::REFERENCE);
    }

    #[rstest]
    #[case(IsolationConfig::Config1, (1500, 3_000_500), CommitMarker::Query)]
    #[case(IsolationConfig::Config2, (1500, 1500), CommitMarker::Update)]
    #[case(IsolationConfig::Config3, (1500, 3_000_500), CommitMarker::Update)]
    #[case(IsolationConfig::Config4, (1500, 1500), CommitMarker::Query)]
    #[case(IsolationConfig::Config5, (1500, 1500), CommitMarker::Query)]
    fn test_expectations_follow_baseline(
        #[case] config: IsolationConfig,
        #[case] sums: (Balance, Balance),
        #[case] first_commit: CommitMarker,
    ) {
        let baseline = Baseline {
            total: 1500,
            updated_balance: 1000,
        };
        let scenario = Scenario::reference_for(config, baseline);
        assert_eq!(scenario.expected, Observation { sums, first_commit });
        assert_eq!(scenario.writer, Scenario::reference(config).writer);
    }

    #[test]
    fn test_baseline_without_updated_account() {
        let dataset = Dataset {
            customers: Vec::new(),
            accounts: vec![Account::new(1, 1, 70, 1)],
        };
        assert_eq!(
            Baseline::of(&dataset),
            Baseline {
                total: 70,
                updated_balance: 0
            }
        );
        assert_eq!(
            Scenario::phantom_for(Baseline::of(&dataset)).expected.sums,
            (70, 9_000_070)
        );
    }

    #[test]
    fn test_writer_display() {
        assert_eq!(update_writer().to_string(), "set account 115 to 3000000");
        assert_eq!(
            insert_writer().to_string(),
            "insert account 25 for customer 10 with 9000000"
        );
    }
}
