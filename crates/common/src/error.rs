//! Common error types for the disruption sampler crates.

use std::fmt;

/// A specialized Result type for sampler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle and configuration errors.
///
/// Per-check failures are not represented here: they are data folded into
/// disruption intervals, never surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("cannot monitor {0} twice at the same time")]
    AlreadyRunning(String),

    #[error("not finished writing all samples for {locator} ({remaining} remaining), but we're told to close")]
    UnconsumedSamples { locator: String, remaining: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Whether the error points at a logic bug rather than bad input.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Error::UnconsumedSamples { .. })
    }
}
