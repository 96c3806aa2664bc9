//! Error types shared across Rendermill crates.

use std::path::PathBuf;

/// Top-level error type for Rendermill operations.
#[derive(Debug, thiserror::Error)]
pub enum RendermillError {
    #[error("Engine error: {message}")]
    Engine { message: String },

    #[error("Probe error: {message}")]
    Probe { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using RendermillError.
pub type RendermillResult<T> = Result<T, RendermillError>;

impl RendermillError {
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine {
            message: msg.into(),
        }
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}
