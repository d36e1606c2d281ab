//! Benchmark suite for ledger operations
//!
//! Measures the transaction manager against the memory store using the divan
//! benchmarking framework.
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//! ```
//!
//! Every benchmark works on a store loaded with the built-in reference dataset
//! (20 customers, 40 accounts).

use ledger_isolation::io::{self, Dataset};
use ledger_isolation::store::{Connection, MemoryConnection, MemoryStore, Store};
use ledger_isolation::{IsolationLevel, LedgerConfig, TransactionManager};
use std::time::Duration;

fn main() {
    divan::main();
}

fn setup() -> (MemoryStore, MemoryConnection, TransactionManager) {
    let store = MemoryStore::default();
    io::load(&store, &Dataset::reference().expect("dataset")).expect("load");
    let conn = store.connect().expect("connect");
    let manager = TransactionManager::new(LedgerConfig::new(Duration::ZERO));
    (store, conn, manager)
}

/// Benchmark parsing and loading the reference dataset into a new store
#[divan::bench]
fn load_reference_dataset() {
    let store = MemoryStore::default();
    io::load(&store, &Dataset::reference().expect("dataset")).expect("load");
}

/// Benchmark a single balance read
#[divan::bench]
fn read_balance(bencher: divan::Bencher) {
    let (_store, mut conn, manager) = setup();
    bencher.bench_local(|| manager.read_balance(&mut conn, 5).expect("read"));
}

/// Benchmark a transfer back and forth between two accounts of one customer
#[divan::bench]
fn transfer_round_trip(bencher: divan::Bencher) {
    let (_store, mut conn, manager) = setup();
    bencher.bench_local(|| {
        manager.transfer(&mut conn, 10, 7, 107).expect("transfer");
        manager.transfer(&mut conn, 10, 107, 7).expect("transfer");
    });
}

/// Benchmark the two-read totals query at each isolation level
#[divan::bench(args = [
    IsolationLevel::ReadUncommitted,
    IsolationLevel::ReadCommitted,
    IsolationLevel::RepeatableRead,
    IsolationLevel::Snapshot,
    IsolationLevel::Serializable,
])]
fn totals(bencher: divan::Bencher, level: IsolationLevel) {
    let (_store, mut conn, manager) = setup();
    conn.set_isolation_level(level).expect("isolation level");
    bencher.bench_local(|| manager.get_totals(&mut conn).expect("totals"));
}
