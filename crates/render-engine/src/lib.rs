//! Rendermill Render Engine
//!
//! Drives a single, stateful external rendering engine one job at a time.
//!
//! # Render Flow
//!
//! ```text
//! ResolvedJobSpec ──┐
//!                   ├── ensure engine launched (project)
//!                   ├── inject bindings (placeholders + bindings.json)
//!                   ├── clear stale staging output
//!                   ├── run render command (bounded by timeout)
//!                   │        │
//!                   │        ├── timeout      → kill, RenderFailure::Timeout
//!                   │        ├── exit != 0    → ProjectState | EngineCrash
//!                   │        └── exit == 0    → staging file present?
//!                   │                               │
//!                   ▼                               ▼
//!            RenderFailure                 rename → final output
//! ```
//!
//! After a timeout or crash the caller must [`RenderDriver::restart`] the
//! engine before the next job.

pub mod command;
pub mod driver;
pub mod engine;
pub mod inject;
pub mod probe;

pub use driver::*;
pub use engine::CommandEngine;
pub use probe::{FfprobeProbe, MediaInfo, MediaProbe};
