//! Command execution
//!
//! Every command runs against a fresh memory store loaded with the selected
//! dataset. Output goes to the supplied writer so commands can be tested
//! without a process.

use crate::cli::args::{CliArgs, Command};
use crate::core::{LedgerConfig, TransactionManager};
use crate::harness::{Harness, HarnessError};
use crate::io::{self, LoadError};
use crate::store::{MemoryStore, Store, StoreError};
use crate::types::{AccountId, Balance};
use std::io::Write;
use thiserror::Error;

/// Balance queries replayed by `demo`
const DEMO_BALANCES: [AccountId; 2] = [5, 150];

/// `(amount, from, to)` transfers replayed by `demo`
const DEMO_TRANSFERS: [(Balance, AccountId, AccountId); 3] =
    [(100, 7, 107), (1000, 8, 108), (1000, 17, 119)];

/// Fatal command failures
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Harness(#[from] HarnessError),

    #[error("{failed} of {total} isolation scenarios did not match their expectation")]
    ScenariosFailed { failed: usize, total: usize },

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// Run the parsed command, writing its results to `output`
///
/// # Errors
///
/// Returns an error if the dataset cannot be loaded, a session cannot be
/// opened, output cannot be written, or an isolation scenario fails.
/// Ledger validation failures (unknown account, insufficient funds) are
/// printed, not returned.
pub fn run(args: &CliArgs, output: &mut dyn Write) -> Result<(), CliError> {
    let dataset = args.dataset()?;
    let store_config = args.to_store_config();
    let manager = TransactionManager::new(LedgerConfig::default());

    if let Command::Isolation { .. } = args.command {
        let harness = Harness::new(dataset, store_config, manager);
        let reports = harness.run_all_blocking(&args.scenarios(harness.baseline()))?;
        for report in &reports {
            writeln!(output, "{}", report)?;
        }
        let failed = reports.iter().filter(|report| !report.passed()).count();
        if failed > 0 {
            return Err(CliError::ScenariosFailed {
                failed,
                total: reports.len(),
            });
        }
        return Ok(());
    }

    let store = MemoryStore::new(store_config);
    io::load(&store, &dataset)?;
    let mut conn = store.connect()?;

    match args.command {
        Command::Balance { account_id } => {
            writeln!(output, "{}", manager.query_balance(&mut conn, account_id))?;
        }
        Command::Transfer { amount, from, to } => {
            writeln!(output, "{}", manager.do_transfer(&mut conn, amount, from, to))?;
        }
        Command::Demo => {
            for account_id in DEMO_BALANCES {
                writeln!(output, "{}", manager.query_balance(&mut conn, account_id))?;
            }
            for (amount, from, to) in DEMO_TRANSFERS {
                writeln!(output, "{}", manager.do_transfer(&mut conn, amount, from, to))?;
            }
        }
        Command::Isolation { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn run_to_string(args: &[&str]) -> Result<String, CliError> {
        let args = CliArgs::try_parse_from(args).unwrap();
        let mut output = Vec::new();
        run(&args, &mut output)?;
        Ok(String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_demo_session() {
        let output = run_to_string(&["program", "demo"]).unwrap();
        assert_eq!(
            output,
            "Balance for account 5: 100\n\
             Account 150 not found.\n\
             Transferred 100 from account 7 to 107\n\
             Transfer failed because of insufficient balance.\n\
             Transfer failed because accounts do not belong to same customer.\n"
        );
    }

    #[test]
    fn test_balance_command() {
        let output = run_to_string(&["program", "balance", "115"]).unwrap();
        assert_eq!(output, "Balance for account 115: 1020\n");
    }

    #[test]
    fn test_negative_transfer_is_reported() {
        let output = run_to_string(&["program", "transfer", "-5", "7", "107"]).unwrap();
        assert_eq!(output, "Transfer failed because amount -5 is negative.\n");
    }

    #[test]
    fn test_missing_data_dir_is_fatal() {
        let result = run_to_string(&["program", "--data-dir", "/nonexistent/ledger", "demo"]);
        assert!(matches!(result, Err(CliError::Load(LoadError::Io { .. }))));
    }

    #[test]
    fn test_isolation_single_config() {
        let output = run_to_string(&["program", "isolation", "--config", "3"]).unwrap();
        assert!(output.starts_with("Config3"));
        assert!(output.trim_end().ends_with("ok"));
    }
}
