use crate::core::IsolationConfig;
use crate::harness::{scenarios_for, Baseline, Scenario};
use crate::io::{Dataset, LoadError};
use crate::store::StoreConfig;
use crate::types::{AccountId, Balance};
use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

/// Banking ledger with transaction isolation demonstrations
#[derive(Parser, Debug)]
#[command(name = "ledger-isolation")]
#[command(about = "Banking ledger with transaction isolation demonstrations", long_about = None)]
pub struct CliArgs {
    /// Directory holding customers.csv and accounts.csv
    #[arg(
        long = "data-dir",
        value_name = "DIR",
        global = true,
        help = "Load customers.csv and accounts.csv from DIR instead of the built-in dataset"
    )]
    pub data_dir: Option<PathBuf>,

    /// Lock wait timeout in milliseconds
    #[arg(
        long = "lock-timeout-ms",
        value_name = "MS",
        global = true,
        help = "How long a session waits for a lock (default: 10000, 0 uses the default)"
    )]
    pub lock_timeout_ms: Option<u64>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the balance of an account
    Balance {
        #[arg(value_name = "ID")]
        account_id: AccountId,
    },

    /// Transfer funds between two accounts of the same customer
    Transfer {
        #[arg(value_name = "AMOUNT", allow_negative_numbers = true)]
        amount: Balance,
        #[arg(value_name = "FROM")]
        from: AccountId,
        #[arg(value_name = "TO")]
        to: AccountId,
    },

    /// Replay the reference session of balance queries and transfers
    Demo,

    /// Run the isolation scenarios and compare them with their expectations
    Isolation {
        /// Run only configuration N (1-5); all scenarios otherwise
        #[arg(long = "config", value_name = "N", value_parser = clap::value_parser!(u8).range(1..=5))]
        config: Option<u8>,
    },
}

impl CliArgs {
    /// Create a StoreConfig from CLI arguments
    ///
    /// A missing or zero lock timeout falls back to the store default.
    pub fn to_store_config(&self) -> StoreConfig {
        match self.lock_timeout_ms {
            Some(ms) => StoreConfig::with_lock_timeout(Duration::from_millis(ms)),
            None => StoreConfig::default(),
        }
    }

    /// Log level selected by the `-v` count
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Dataset selected by `--data-dir`, or the built-in one
    pub fn dataset(&self) -> Result<Dataset, LoadError> {
        match &self.data_dir {
            Some(dir) => Dataset::from_dir(dir),
            None => Dataset::reference(),
        }
    }

    /// Scenarios selected by the `isolation` command
    ///
    /// Without `--config` this is every canonical scenario plus the phantom
    /// read scenario, all with expectations taken from `baseline`. Empty for
    /// other commands.
    pub fn scenarios(&self, baseline: Baseline) -> Vec<Scenario> {
        match self.command {
            Command::Isolation {
                config: Some(number),
            } => IsolationConfig::from_number(number)
                .map(|config| Scenario::reference_for(config, baseline))
                .into_iter()
                .collect(),
            Command::Isolation { config: None } => {
                let mut scenarios = scenarios_for(baseline);
                scenarios.push(Scenario::phantom_for(baseline));
                scenarios
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DEFAULT_LOCK_TIMEOUT;
    use rstest::rstest;

    // Command parsing tests
    #[rstest]
    #[case::balance(&["program", "balance", "5"], Command::Balance { account_id: 5 })]
    #[case::transfer(
        &["program", "transfer", "100", "7", "107"],
        Command::Transfer { amount: 100, from: 7, to: 107 }
    )]
    #[case::negative_transfer(
        &["program", "transfer", "-10", "7", "107"],
        Command::Transfer { amount: -10, from: 7, to: 107 }
    )]
    #[case::demo(&["program", "demo"], Command::Demo)]
    #[case::isolation_all(&["program", "isolation"], Command::Isolation { config: None })]
    #[case::isolation_one(&["program", "isolation", "--config", "4"], Command::Isolation { config: Some(4) })]
    fn test_command_parsing(#[case] args: &[&str], #[case] expected: Command) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.command, expected);
    }

    // Global options
    #[rstest]
    #[case::defaults(&["program", "demo"], None, 0)]
    #[case::before_command(&["program", "--lock-timeout-ms", "250", "demo"], Some(250), 0)]
    #[case::after_command(&["program", "demo", "-vv"], None, 2)]
    fn test_global_options(
        #[case] args: &[&str],
        #[case] lock_timeout_ms: Option<u64>,
        #[case] verbose: u8,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.lock_timeout_ms, lock_timeout_ms);
        assert_eq!(parsed.verbose, verbose);
    }

    // StoreConfig conversion; zero falls back to the default
    #[rstest]
    #[case::default(&["program", "demo"], DEFAULT_LOCK_TIMEOUT)]
    #[case::custom(&["program", "--lock-timeout-ms", "250", "demo"], Duration::from_millis(250))]
    #[case::zero(&["program", "--lock-timeout-ms", "0", "demo"], DEFAULT_LOCK_TIMEOUT)]
    fn test_store_config_conversion(#[case] args: &[&str], #[case] expected: Duration) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.to_store_config().lock_timeout, expected);
    }

    #[rstest]
    #[case(0, LevelFilter::Warn)]
    #[case(1, LevelFilter::Info)]
    #[case(2, LevelFilter::Debug)]
    #[case(5, LevelFilter::Trace)]
    fn test_log_level(#[case] verbose: u8, #[case] expected: LevelFilter) {
        let mut parsed = CliArgs::try_parse_from(["program", "demo"]).unwrap();
        parsed.verbose = verbose;
        assert_eq!(parsed.log_level(), expected);
    }

    #[rstest]
    #[case::all(&["program", "isolation"], 6)]
    #[case::one(&["program", "isolation", "--config", "2"], 1)]
    #[case::other_command(&["program", "demo"], 0)]
    fn test_scenario_selection(#[case] args: &[&str], #[case] expected: usize) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.scenarios(Baseline::REFERENCE).len(), expected);
    }

    // Error handling tests
    #[rstest]
    #[case::missing_command(&["program"])]
    #[case::missing_account(&["program", "balance"])]
    #[case::bad_account(&["program", "balance", "five"])]
    #[case::config_out_of_range(&["program", "isolation", "--config", "6"])]
    #[case::missing_transfer_target(&["program", "transfer", "100", "7"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        let result = CliArgs::try_parse_from(args);
        assert!(result.is_err());
    }
}
