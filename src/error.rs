//! Error types for hashdl
//!
//! Per-article failures (fetch retries, decode failures) are absorbed into
//! the missing-part ledger and never surface here; this module covers the
//! errors that end a job: bad configuration, connection-pool exhaustion,
//! payloads that cannot be repaired, and fatal external-tool outcomes.

use thiserror::Error;

use crate::parity::RepairOutcome;

/// Result type alias for hashdl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hashdl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "dest_dir")
        key: Option<String>,
    },

    /// The shared header string could not be decoded into a payload layout
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// NNTP protocol or connection error
    #[error("NNTP error: {0}")]
    Nntp(String),

    /// Every connection slot exhausted its connect retries
    #[error("all {pool_size} connections failed")]
    AllConnectionsFailed {
        /// The configured connection pool size
        pool_size: usize,
    },

    /// More parts are missing than the recovery data could ever repair
    #[error(
        "payload unrecoverable: {missing} parts missing, {recovery_parts} recovery parts available"
    )]
    Unrecoverable {
        /// Number of unresolved part identifiers in the ledger
        missing: usize,
        /// Total recovery parts declared by the payload header
        recovery_parts: u32,
    },

    /// The repair tool reported a fatal outcome
    #[error("repair failed: {}", .0.describe())]
    RepairFailed(RepairOutcome),

    /// External tool execution failed (par2, unrar)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
