//! Error types for issue-sync
//!
//! This module provides the error handling for the library, including:
//! - Per-attempt failures observed by the request executor (network, HTTP status)
//! - Retry exhaustion, carrying the last observed failure for diagnostics
//! - Fetch aborts that report how many records were retrieved before the abort
//! - Configuration and checkpoint persistence errors

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for issue-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for issue-sync
///
/// Each variant includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "batch_size")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error (connect failure, timeout, body decode failure)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The remote API answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code of the response
        status: u16,
        /// Response body, kept for diagnostics
        body: String,
    },

    /// Every attempt of a request failed
    #[error("request failed {attempts} times in a row: {last_error}")]
    ExhaustedRetries {
        /// Number of attempts made
        attempts: u32,
        /// The failure observed on the final attempt
        last_error: Box<Error>,
    },

    /// The fetch loop stopped before reaching the last page
    ///
    /// The checkpoint is left in place, so the next run resumes after the
    /// last persisted page.
    #[error("fetch aborted after {retrieved} records: {source}")]
    FetchAborted {
        /// Records retrieved and persisted before the abort
        retrieved: usize,
        /// The failure that stopped the loop
        #[source]
        source: Box<Error>,
    },

    /// Checkpoint could not be read or written
    #[error("checkpoint error at {path}: {reason}")]
    Checkpoint {
        /// Location of the checkpoint file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Operation stopped because shutdown was requested
    #[error("operation cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for the given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// HTTP status carried by this error, looking through retry exhaustion
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            Error::ExhaustedRetries { last_error, .. } => last_error.status(),
            Error::FetchAborted { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Number of records retrieved before a fetch abort (zero for other errors)
    pub fn retrieved(&self) -> usize {
        match self {
            Error::FetchAborted { retrieved, .. } => *retrieved,
            _ => 0,
        }
    }
}
