//! I/O module
//!
//! Handles loading the ledger tables from CSV.
//!
//! # Components
//!
//! - `dataset` - CSV dataset reader, embedded reference dataset and store loader

pub mod dataset;

pub use dataset::{load, Dataset, LoadError};
