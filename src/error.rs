//! Error types for the rollup core
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias for rollup operations
pub type Result<T> = std::result::Result<T, RollupError>;

/// Main error type for rollup operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RollupError {
    /// State or auxiliary value could not be decoded
    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),

    /// The durable store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A read-side computation had nothing to work with
    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),

    /// Caller broke an operation's precondition
    #[error("Contract violation: {0}")]
    Contract(#[from] ContractError),

    /// Stored state for a key failed to decode too many times in a row
    #[error("State corruption on key '{key}': {failures} consecutive decode failures")]
    StateCorruption { key: String, failures: u32 },
}

impl RollupError {
    /// Whether the caller may retry the failed operation
    pub fn is_retryable(&self) -> bool {
        match self {
            RollupError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Errors while decoding a persisted state blob
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Buffer too short
    #[error("Buffer too short: need at least {needed} bytes, got {available}")]
    BufferTooShort { needed: usize, available: usize },

    /// Blob written by an unknown format version
    #[error("Unsupported state format version: {0}")]
    UnsupportedVersion(u8),

    /// Invalid checksum
    #[error("Invalid checksum: expected {expected:08x}, got {actual:08x}")]
    InvalidChecksum { expected: u32, actual: u32 },

    /// Structurally invalid content
    #[error("Malformed state at offset {offset}: {reason}")]
    MalformedState { offset: usize, reason: String },

    /// Bytes left over after a complete value
    #[error("{count} trailing bytes after encoded value")]
    TrailingBytes { count: usize },

    /// Identifier bytes are not UTF-8
    #[error("Invalid UTF-8 in encoded identifier")]
    InvalidUtf8,

    /// JSON wire record could not be parsed
    #[error("Malformed wire record at line {line}, column {column}: {reason}")]
    Wire {
        line: usize,
        column: usize,
        reason: String,
    },
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Wire {
            line: e.line(),
            column: e.column(),
            reason: e.to_string(),
        }
    }
}

/// Errors from the durable key-value or time-series substrate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// I/O failure talking to the substrate
    #[error("I/O failure: {0}")]
    Io(String),

    /// Backend-specific failure
    #[error("Backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Store failures are always handed back to the caller for retry
    pub fn is_retryable(&self) -> bool {
        true
    }
}

/// Errors from trend and distribution queries
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    /// No records to average
    #[error("Insufficient data for '{identifier}'")]
    InsufficientData { identifier: String },

    /// Trend baseline averages to zero
    #[error("Zero baseline average for '{identifier}'")]
    ZeroBaseline { identifier: String },

    /// Histogram requested with zero buckets
    #[error("Invalid bucket count: {0}")]
    InvalidBucketCount(usize),
}

/// Programming-contract violations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractError {
    /// `subtract` was called with no current aggregate
    #[error("Cannot subtract from absent aggregate '{identifier}'")]
    SubtractFromAbsent { identifier: String },
}
