//! Error types for streamproc
//!
//! This module provides the crate's error taxonomy, split into two
//! layers:
//! - [`Error`] — operational failures (config, storage, decode) that
//!   can abort a request before any record is processed.
//! - [`ProcessError`] — per-record outcomes returned by a user
//!   [`crate::processor::Processor`]. These never abort the request;
//!   the worker pool classifies them (see [`ProcessError::kind`]) and
//!   routes the record to the retry or corruption sink accordingly.
//!
//! [`ToHttpStatus`] maps both into the metrics/status HTTP surface.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for streamproc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Operational error type for streamproc
///
/// Each variant includes contextual information to help diagnose
/// issues. `Config` errors are detected at `Config::validate()` time
/// and abort before any I/O; the rest surface while a request is
/// running.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is invalid; detected at `validate()` time, aborts before any I/O
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description of the invalid setting
        message: String,
        /// The configuration key that caused the error (e.g. "retryUrl")
        key: Option<String>,
    },

    /// Object-store backend failure (open/list/delete/put)
    #[error("object store error: {0}")]
    Store(#[from] object_store::Error),

    /// Object-store URL could not be resolved into (store, path)
    #[error("invalid object store URL {url}: {reason}")]
    InvalidUrl {
        /// The URL that failed to parse
        url: String,
        /// Why the URL could not be resolved
        reason: String,
    },

    /// I/O error unrelated to object storage (local buffers, codecs)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parquet/Arrow decode error for columnar sources
    #[error("columnar decode error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow error for columnar sources
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// JSON (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV (de)serialization error
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The configured row type has no registered constructor
    #[error("row type not registered: {0}")]
    UnknownRowType(String),

    /// A quorum-merge precondition could not complete
    #[error("quorum merge failed for {path}: {reason}")]
    QuorumMerge {
        /// Directory or file the merge was operating on
        path: PathBuf,
        /// Why the merge failed
        reason: String,
    },

    /// Encoded resource string could not be decoded (see `resource` module)
    #[error("invalid encoded resource {input:?}: {reason}")]
    InvalidResource {
        /// The raw encoded string that failed to parse
        input: String,
        /// Why it was rejected
        reason: String,
    },

    /// The request deadline elapsed before loading/processing completed
    #[error("deadline exceeded: {stage}")]
    DeadlineExceeded {
        /// Which pipeline stage detected the deadline (e.g. "loader", "worker")
        stage: String,
    },

    /// Failed to write to the retry sink (never fatal to the request, but
    /// returned here when the caller needs the underlying cause)
    #[error("failed to write retry data: {0}")]
    RetryWrite(String),

    /// Failed to write to the corruption sink
    #[error("failed to write corrupted data: {0}")]
    CorruptionWrite(String),

    /// A decode step (structured-line or columnar-row) classified its
    /// own failure; wraps a [`ProcessError`] so loader decode errors
    /// and worker processor errors share one classification path
    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Per-record outcome of a [`crate::processor::Processor::process`] call
///
/// Distinct from [`Error`]: a `ProcessError` never aborts the request.
/// The worker pool matches on this via [`ProcessError::kind`] to
/// decide which sink receives the record and which status bit the
/// reporter sets.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The record is structurally invalid; routed to the corruption sink, no retry
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// A subset of the record (or the original) must be retried
    ///
    /// When `data` is `Some`, it replaces the original bytes in the
    /// retry write; the original record still counts as processed.
    #[error("partial retry: {message}")]
    PartialRetry {
        /// Description of what could not be completed
        message: String,
        /// Replacement bytes to write to retry, if any
        data: Option<Vec<u8>>,
    },

    /// Whole record routed to retry — the default classification for
    /// any processor error that isn't `DataCorruption`/`PartialRetry`
    #[error("retriable error: {0}")]
    Retriable(String),
}

/// Classification of a [`ProcessError`], used to pick a sink and a
/// reporter status bit without matching on the error variant directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Route to the corruption sink; never retried
    Corrupted,
    /// Route (replacement or original bytes) to the retry sink
    Retry,
}

impl ProcessError {
    /// Construct a `DataCorruption` error
    pub fn corruption(message: impl Into<String>) -> Self {
        ProcessError::DataCorruption(message.into())
    }

    /// Construct a `PartialRetry` error carrying no replacement data
    pub fn partial_retry(message: impl Into<String>) -> Self {
        ProcessError::PartialRetry {
            message: message.into(),
            data: None,
        }
    }

    /// Construct a `PartialRetry` error carrying replacement data
    pub fn partial_retry_with(message: impl Into<String>, data: Vec<u8>) -> Self {
        ProcessError::PartialRetry {
            message: message.into(),
            data: Some(data),
        }
    }

    /// Classify this error for sink routing and status reporting
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::DataCorruption(_) => ErrorKind::Corrupted,
            ProcessError::PartialRetry { .. } | ProcessError::Retriable(_) => ErrorKind::Retry,
        }
    }

    /// Replacement bytes to persist to the retry sink, if this error
    /// carries them (only `PartialRetry { data: Some(_), .. }` does)
    pub fn retry_data(&self) -> Option<&[u8]> {
        match self {
            ProcessError::PartialRetry { data: Some(d), .. } => Some(d),
            _ => None,
        }
    }
}

/// API error response format
///
/// Returned by the metrics/status HTTP endpoint when a request fails.
/// Mirrors a standard machine-readable-code-plus-message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "config_error")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;
    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::InvalidUrl { .. } => 400,
            Error::InvalidResource { .. } => 400,
            Error::UnknownRowType(_) => 400,
            Error::DeadlineExceeded { .. } => 504,
            Error::Store(_) => 502,
            Error::Io(_) => 500,
            Error::Parquet(_) => 422,
            Error::Arrow(_) => 422,
            Error::Serialization(_) => 422,
            Error::Csv(_) => 422,
            Error::QuorumMerge { .. } => 500,
            Error::RetryWrite(_) => 500,
            Error::CorruptionWrite(_) => 500,
            Error::Process(_) => 422,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidUrl { .. } => "invalid_url",
            Error::InvalidResource { .. } => "invalid_resource",
            Error::UnknownRowType(_) => "unknown_row_type",
            Error::DeadlineExceeded { .. } => "deadline_exceeded",
            Error::Store(_) => "store_error",
            Error::Io(_) => "io_error",
            Error::Parquet(_) => "parquet_error",
            Error::Arrow(_) => "arrow_error",
            Error::Serialization(_) => "serialization_error",
            Error::Csv(_) => "csv_error",
            Error::QuorumMerge { .. } => "quorum_merge_error",
            Error::RetryWrite(_) => "retry_write_error",
            Error::CorruptionWrite(_) => "corruption_write_error",
            Error::Process(_) => "process_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();
        let details = match &error {
            Error::InvalidUrl { url, .. } => Some(serde_json::json!({ "url": url })),
            Error::QuorumMerge { path, .. } => Some(serde_json::json!({ "path": path })),
            Error::UnknownRowType(name) => Some(serde_json::json!({ "row_type": name })),
            Error::DeadlineExceeded { stage } => Some(serde_json::json!({ "stage": stage })),
            _ => None,
        };
        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
