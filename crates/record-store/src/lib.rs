//! Rendermill Record Store
//!
//! Loads the input dataset and keeps the run manifest durable:
//! - **Dataset:** CSV rows turned into stably-identified records, with
//!   schema validation against the slot map before any rendering
//! - **Manifest:** load-or-empty, atomic write-temp-then-rename persist,
//!   and an exclusive lock so two runs never share one manifest
//! - **Selection:** row ranges and disjoint partitions for parallel workers

pub mod dataset;
pub mod manifest_store;
pub mod partition;

pub use dataset::*;
pub use manifest_store::*;
pub use partition::*;

use std::path::PathBuf;

/// Errors raised by the record store. All of them are run-level.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read dataset {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("Failed to serialize {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Dataset schema mismatch: {message}")]
    Schema { message: String },

    #[error("Manifest {path} is locked by another run ({holder}); use --force if it is stale")]
    Locked { path: PathBuf, holder: String },

    #[error("Invalid partition '{spec}': expected k/n with 1 <= k <= n")]
    InvalidPartition { spec: String },
}

impl StoreError {
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema {
            message: msg.into(),
        }
    }
}
