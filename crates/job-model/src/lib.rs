//! Rendermill Job Model
//!
//! Defines the core data contracts for a batch render run:
//! - **Records:** raw input rows and their per-record job state
//! - **Slots:** the template slot map a render job must fill
//! - **Job specs:** a record resolved against the slot map
//! - **Manifest:** the durable, resumable status checkpoint
//! - **Report:** the operator-facing summary emitted at run end

pub mod failure;
pub mod job_spec;
pub mod manifest;
pub mod record;
pub mod report;
pub mod slots;

pub use failure::*;
pub use job_spec::*;
pub use manifest::*;
pub use record::*;
pub use report::*;
pub use slots::*;

use std::path::PathBuf;

/// Errors that can occur when loading model files.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid slot map: {message}")]
    ValidationError { message: String },
}
