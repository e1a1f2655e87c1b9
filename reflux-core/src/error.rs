//! Error types for the reactive runtime.
//!
//! `ReactiveError` is `Clone + PartialEq` because a failed computation caches
//! its error exactly like a value: every reader gets the same error back until
//! an upstream dependency changes.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors produced while reading, writing or evaluating reactive values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A user computation failed.
    #[error("computation failed: {0}")]
    Compute(Arc<str>),

    /// A node read itself, directly or transitively, while being evaluated.
    #[error("dependency cycle detected: {}", path.join(" -> "))]
    Cycle {
        /// Labels of the nodes on the cycle, starting and ending with the
        /// node that was read re-entrantly.
        path: Vec<String>,
    },

    /// A signal created without a value was read before its first `set`.
    #[error("signal `{0}` was read before a value was set")]
    Unset(String),

    /// A signal was written from inside a derived computation.
    #[error("signal `{0}` cannot be written while a derived value is being computed")]
    WriteDuringDerivation(String),

    /// The node has been disposed.
    #[error("node `{0}` has been disposed")]
    Disposed(String),

    /// An event was sent to a session that has stopped.
    #[error("the session has stopped accepting events")]
    SessionClosed,

    /// The runtime that owns the node has been dropped.
    #[error("the reactive runtime has been dropped")]
    RuntimeDropped,

    /// Effects kept invalidating each other past the configured pass limit.
    #[error("update cycle did not settle after {0} flush passes")]
    Unsettled(usize),
}

impl ReactiveError {
    /// Build a computation failure from any displayable message or error.
    pub fn compute(message: impl fmt::Display) -> Self {
        Self::Compute(Arc::from(message.to_string()))
    }

    /// Whether this error was raised by user code rather than the runtime.
    pub fn is_compute(&self) -> bool {
        matches!(self, Self::Compute(_))
    }
}

/// Errors produced while loading a [`RuntimeConfig`](crate::config::RuntimeConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
