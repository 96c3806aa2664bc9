//! Rendermill Common Utilities
//!
//! Shared infrastructure for all Rendermill crates:
//! - Error types and result aliases
//! - Run clock for report timing and manifest timestamps
//! - Tracing/logging initialization
//! - Run configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
