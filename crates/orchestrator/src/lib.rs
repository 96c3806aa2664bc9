//! Rendermill Orchestrator
//!
//! The batch state machine and the pure pieces it is built from:
//! - **Resolver:** raw record + slot map → resolved job spec, before any
//!   engine time is spent
//! - **Validator:** fail-fast checks on a rendered file
//! - **Policy:** retry eligibility, engine restarts, backoff, and the
//!   consecutive-failure ceiling
//! - **Batch:** the resumable run loop that persists after every record

pub mod batch;
pub mod policy;
pub mod resolver;
pub mod validator;

pub use batch::{BatchOrchestrator, BatchSettings, RunError};
pub use policy::{BackoffStrategy, RetryPolicy};
pub use resolver::{resolve, ResolutionError};
pub use validator::{validate, InvalidReason, OutputExpectations, Validation};
