//! Concurrency test harness
//!
//! Races a reader running the totals query against a writer on a second
//! connection and records what the reader saw and who committed first:
//! - `scenario` - Scenario definitions and the reference expectations
//! - `marker` - Write-once commit order record
//! - `runner` - Task orchestration on a tokio runtime

pub mod marker;
pub mod runner;
pub mod scenario;

pub use marker::{CommitMarker, CommitOrder};
pub use runner::{run_scenario, Harness, HarnessError, ScenarioReport};
pub use scenario::{
    reference_scenarios, scenarios_for, Baseline, Observation, Scenario, WriterCommit, WriterOp,
};
