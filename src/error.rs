//! Error types for strata.

use std::io;
use thiserror::Error;

/// Result type alias for strata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for session, manifest and compaction operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// I/O error from storage operations.
    #[error("I/O error: {0}")]
    Io(String),

    /// Data corruption detected outside the manifest (journal framing, keys).
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Storage lock is held elsewhere or could not be acquired.
    #[error("Lock error: {0}")]
    LockError(String),

    /// No manifest was found but the storage holds other database files.
    #[error("Manifest error: manifest file missing")]
    ManifestMissing,

    /// A manifest record failed to decode or apply.
    #[error("Manifest error: {0}")]
    ManifestCorrupt(String),

    /// Replay finished without ever seeing a required field.
    #[error("Manifest error: manifest missing {0}")]
    ManifestIncomplete(&'static str),

    /// The manifest was written with a different comparator.
    #[error("Manifest error: comparer mismatch, want '{want}', got '{got}'")]
    ComparerMismatch { want: String, got: String },

    /// The session has been closed.
    #[error("Session is closed")]
    SessionClosed,

    /// A caller-built record names something that cannot exist.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a corruption error with the given message.
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        Error::Corruption(msg.into())
    }

    /// Create a manifest corruption error.
    pub fn manifest<S: Into<String>>(msg: S) -> Self {
        Error::ManifestCorrupt(msg.into())
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Check if this error belongs to the manifest class.
    ///
    /// Every manifest-class error is fatal for recovery.
    pub fn is_manifest(&self) -> bool {
        matches!(
            self,
            Error::ManifestMissing
                | Error::ManifestCorrupt(_)
                | Error::ManifestIncomplete(_)
                | Error::ComparerMismatch { .. }
        )
    }

    /// Check if this error indicates corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::ManifestCorrupt(_))
    }
}
