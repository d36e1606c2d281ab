//! Ledger Isolation CLI
//!
//! Command-line interface for querying and transferring between ledger
//! accounts and for running the transaction isolation scenarios.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- balance 5
//! cargo run -- transfer 100 7 107
//! cargo run -- demo
//! cargo run -- isolation
//! cargo run -- -vv isolation --config 4 --lock-timeout-ms 2000
//! cargo run -- --data-dir ./data demo
//! ```
//!
//! Log output goes to stderr; `-v` raises the level and `RUST_LOG` overrides it.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (dataset not loadable, isolation scenario mismatch, etc.)

use ledger_isolation::cli;
use std::process;

fn main() {
    let args = cli::parse_args();

    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .init();

    let mut output = std::io::stdout();
    if let Err(e) = cli::run(&args, &mut output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
