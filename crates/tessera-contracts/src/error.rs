//! Error types for the Tessera audit chain.
//!
//! All fallible operations return `LedgerResult<T>`.  Integrity violations
//! found during verification are NOT errors: they are reported through
//! `VerificationReport` so a verification pass always completes.

use thiserror::Error;

/// The unified error type for the Tessera crates.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A required entry field is missing or malformed.  Raised before any
    /// hashing, so the chain is never touched.
    #[error("invalid entry field '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// The durable write or read of an entry or block failed.
    ///
    /// Always propagated: a silently dropped write would leave a gap in the
    /// hash chain that can never be repaired.
    #[error("audit storage failed: {reason}")]
    Storage { reason: String },

    /// A seal attempt raced another sealer on the same chain head.
    #[error("seal conflict: attempted height {attempted_height} but store head is at {head_height}")]
    SealConflict { attempted_height: u64, head_height: u64 },

    /// `seal_block` was called with nothing pending.
    #[error("no pending entries to seal")]
    EmptySeal,

    /// A configuration document is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// The supplied authentication key is unusable.
    #[error("invalid authentication key: {reason}")]
    InvalidKey { reason: String },

    /// Encoding or decoding of a stored record failed.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

impl LedgerError {
    /// Shorthand for a `Validation` error on `field`.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a `Storage` error.
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the Tessera crates.
pub type LedgerResult<T> = Result<T, LedgerError>;
