//! Scenario runner
//!
//! Runs the reader and the writer of a scenario on two connections as blocking
//! tasks on a tokio multi-threaded runtime. Ordering between them is enforced
//! with channels and store session events instead of sleeps:
//!
//! ```text
//! reader: read 1 ──► first_read ──────────────► wait parked ──► read 2 ──► commit ──► open gate
//! writer:            wait first_read ──► statement ──► (blocked | hold for gate | commit) ──► parked
//! ```
//!
//! A writer that holds its commit is released when the reader finishes or
//! when the reader blocks on a lock the writer holds.

use crate::core::isolation_policy;
use crate::core::TransactionManager;
use crate::harness::marker::{CommitMarker, CommitOrder};
use crate::harness::scenario::{Baseline, Observation, Scenario, WriterCommit};
use crate::io::{self, Dataset, LoadError};
use crate::store::{Connection, MemoryStore, SessionObserver, Store, StoreConfig, StoreError};
use crate::types::{Balance, LedgerError};
use log::{debug, info};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;

/// Errors that stop a scenario from producing an observation
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A session could not be opened or configured
    #[error("Failed to prepare session: {0}")]
    Store(#[from] StoreError),

    /// The scenario dataset could not be loaded
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The reader's totals query failed
    #[error("Reader failed: {0}")]
    Reader(LedgerError),

    /// The writer's operation failed
    #[error("Writer failed: {0}")]
    Writer(LedgerError),

    /// A task panicked or was cancelled
    #[error("{role} task failed: {source}")]
    Task {
        role: &'static str,
        source: JoinError,
    },

    /// Neither side committed
    #[error("No commit was recorded")]
    NoCommit,

    /// The tokio runtime could not be created
    #[error("Failed to create tokio runtime: {0}")]
    Runtime(std::io::Error),
}

/// Releases a writer that holds its commit; fires at most once
#[derive(Clone)]
struct CommitGate(Arc<Mutex<Option<oneshot::Sender<()>>>>);

impl CommitGate {
    fn new(sender: oneshot::Sender<()>) -> Self {
        Self(Arc::new(Mutex::new(Some(sender))))
    }

    fn open(&self) {
        if let Some(sender) = self.0.lock().take() {
            let _ = sender.send(());
        }
    }
}

struct ReaderEvents {
    order: Arc<CommitOrder>,
    gate: CommitGate,
}

impl SessionObserver for ReaderEvents {
    fn lock_wait(&self) {
        debug!("Reader blocked, releasing writer commit");
        self.gate.open();
    }

    fn committed(&self) {
        if !self.order.record(CommitMarker::Query) {
            debug!("Reader committed second");
        }
    }
}

struct WriterEvents {
    order: Arc<CommitOrder>,
    parked: mpsc::UnboundedSender<()>,
}

impl SessionObserver for WriterEvents {
    fn lock_wait(&self) {
        debug!("Writer blocked");
        let _ = self.parked.send(());
    }

    fn committed(&self) {
        if !self.order.record(CommitMarker::Update) {
            debug!("Writer committed second");
        }
        let _ = self.parked.send(());
    }
}

/// Run one scenario against an already loaded store
///
/// # Arguments
///
/// * `store` - Store holding the scenario dataset
/// * `manager` - Transaction manager used by both sides
/// * `scenario` - Scenario to run
///
/// # Returns
///
/// The reader's two sums and which side committed first
///
/// # Errors
///
/// Returns an error if either session cannot be prepared, either side's
/// ledger operation fails, or a task panics.
pub async fn run_scenario<S: Store>(
    store: &S,
    manager: &TransactionManager,
    scenario: &Scenario,
) -> Result<Observation, HarnessError> {
    let order = Arc::new(CommitOrder::new());
    let (first_read_tx, first_read_rx) = oneshot::channel::<()>();
    let (parked_tx, mut parked_rx) = mpsc::unbounded_channel::<()>();
    let (gate_tx, gate_rx) = oneshot::channel::<()>();
    let gate = CommitGate::new(gate_tx);

    let mut reader = store.connect()?;
    isolation_policy::apply(&mut reader, scenario.requirement)?;
    reader.observe(Arc::new(ReaderEvents {
        order: Arc::clone(&order),
        gate: gate.clone(),
    }));

    let mut writer = store.connect()?;
    writer.observe(Arc::new(WriterEvents {
        order: Arc::clone(&order),
        parked: parked_tx.clone(),
    }));

    info!(
        "Running {}: reader at {}, writer will {}",
        scenario.name,
        reader.isolation_level(),
        scenario.writer
    );

    let reader_manager = manager.clone();
    let reader_task = tokio::task::spawn_blocking(move || {
        let totals = reader_manager.get_totals_with(&mut reader, || {
            let _ = first_read_tx.send(());
            let _ = parked_rx.blocking_recv();
        });
        gate.open();
        totals
    });

    let writer_manager = manager.clone();
    let writer_op = scenario.writer.clone();
    let writer_commit = scenario.writer_commit;
    let writer_task = tokio::task::spawn_blocking(move || {
        let _ = first_read_rx.blocking_recv();
        writer_op.run(&writer_manager, &mut writer, move || {
            if writer_commit == WriterCommit::AfterReaderFinishes {
                let _ = parked_tx.send(());
                let _ = gate_rx.blocking_recv();
            }
        })
    });

    let (reader_result, writer_result) = tokio::join!(reader_task, writer_task);

    let sums: (Balance, Balance) = reader_result
        .map_err(|source| HarnessError::Task {
            role: "reader",
            source,
        })?
        .map_err(HarnessError::Reader)?;
    writer_result
        .map_err(|source| HarnessError::Task {
            role: "writer",
            source,
        })?
        .map_err(HarnessError::Writer)?;

    let first_commit = order.first().ok_or(HarnessError::NoCommit)?;
    Ok(Observation { sums, first_commit })
}

/// Result of one scenario run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub observed: Observation,
}

impl ScenarioReport {
    /// Whether the observation matches the scenario's expectation
    pub fn passed(&self) -> bool {
        self.observed == self.scenario.expected
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (expected {}) {}",
            self.scenario.name,
            self.observed,
            self.scenario.expected,
            if self.passed() { "ok" } else { "FAILED" }
        )
    }
}

/// Runs scenarios, each on a freshly loaded memory store
#[derive(Debug, Clone)]
pub struct Harness {
    dataset: Dataset,
    store_config: StoreConfig,
    manager: TransactionManager,
}

impl Harness {
    /// Create a harness
    ///
    /// # Arguments
    ///
    /// * `dataset` - Rows loaded into every scenario's store
    /// * `store_config` - Lock timeout and deadlock settings for each store
    /// * `manager` - Transaction manager used by both sides
    pub fn new(dataset: Dataset, store_config: StoreConfig, manager: TransactionManager) -> Self {
        Self {
            dataset,
            store_config,
            manager,
        }
    }

    /// Baseline of the harness dataset, for building matching scenarios
    pub fn baseline(&self) -> Baseline {
        Baseline::of(&self.dataset)
    }

    /// Run one scenario on a new store
    pub async fn run(&self, scenario: &Scenario) -> Result<ScenarioReport, HarnessError> {
        let store = MemoryStore::new(self.store_config.clone());
        io::load(&store, &self.dataset)?;

        let observed = run_scenario(&store, &self.manager, scenario).await?;
        let report = ScenarioReport {
            scenario: scenario.clone(),
            observed,
        };
        info!("{}", report);
        Ok(report)
    }

    /// Run scenarios one after another on a dedicated runtime
    ///
    /// Stops at the first scenario that cannot produce an observation; a
    /// scenario whose observation differs from its expectation is still
    /// reported.
    pub fn run_all_blocking(&self, scenarios: &[Scenario]) -> Result<Vec<ScenarioReport>, HarnessError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .build()
            .map_err(HarnessError::Runtime)?;

        runtime.block_on(async {
            let mut reports = Vec::with_capacity(scenarios.len());
            for scenario in scenarios {
                reports.push(self.run(scenario).await?);
            }
            Ok::<_, HarnessError>(reports)
        })
    }
}
