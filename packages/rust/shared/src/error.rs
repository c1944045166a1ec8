//! Error types for the buyer-group pipeline.
//!
//! Library crates use [`BuyerGroupError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//! Pipeline-level fatal outcomes are modelled separately as
//! [`PipelineFailure`](crate::PipelineFailure).

use std::path::PathBuf;

/// Top-level error type for all buyer-group operations.
#[derive(Debug, thiserror::Error)]
pub enum BuyerGroupError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// An external provider call failed (transport, HTTP status, bad payload).
    #[error("provider error: {0}")]
    Provider(String),

    /// An external provider call exceeded its per-call deadline.
    #[error("timed out after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Parsing of a deal file, fixture, or provider payload failed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (deal context bounds, weights, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BuyerGroupError>;

impl BuyerGroupError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a timeout error for a named operation.
    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = BuyerGroupError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = BuyerGroupError::validation("sizing.max must be at least 1");
        assert!(err.to_string().contains("sizing.max"));
    }

    #[test]
    fn timeout_reports_millis() {
        let err = BuyerGroupError::timeout("enrich jane doe", std::time::Duration::from_secs(2));
        assert_eq!(err.to_string(), "timed out after 2000ms: enrich jane doe");
    }
}
