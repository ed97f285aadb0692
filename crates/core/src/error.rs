//! Error types for the Chronicle database
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Error Categories
//!
//! - **Document**: nil documents, missing ids, malformed JSON
//! - **Path**: identifiers that cannot be encoded or path segments that
//!   cannot be decoded back
//! - **Conflict**: ref updates rejected by compare-and-swap, version
//!   mismatches (both retriable by the OCC layer)
//! - **Durability**: WAL write and parse failures
//! - **Storage**: low-level Git failures, closed handles
//!
//! Retriable errors are identified by [`Error::is_retriable`]; only those are
//! retried by the OCC wrapper, everything else propagates immediately.

use std::io;
use thiserror::Error;

/// Result type alias for Chronicle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the Chronicle database
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations, fsync, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation attempted on a closed repository handle
    #[error("repository is closed")]
    RepositoryClosed,

    /// Document is nil, has no `id`, or is not a JSON object
    #[error("invalid document: {0}")]
    DocumentInvalid(String),

    /// A stored path is malformed (e.g. leading `/`)
    #[error("invalid path: {0}")]
    PathInvalid(String),

    /// A path segment contains a malformed encoder token
    #[error("cannot decode path segment: {0}")]
    PathDecode(String),

    /// Branch ref advanced between head resolution and the ref update.
    /// Retriable: the OCC layer treats this as a version conflict.
    #[error("ref update rejected on {branch}: expected {expected}, found {actual}")]
    RefUpdateRejected {
        /// Branch whose ref was being advanced
        branch: String,
        /// Expected old oid (zero-oid when the branch was new)
        expected: String,
        /// Actual oid found at update time
        actual: String,
    },

    /// Version counter did not match the caller's expectation. Retriable.
    #[error("version conflict for {id} on {branch}: expected {expected}, actual {actual}")]
    VersionConflict {
        /// Document identifier
        id: String,
        /// Branch name
        branch: String,
        /// Version the caller expected
        expected: u64,
        /// Version actually observed
        actual: u64,
    },

    /// Note attachment failed after the commit was created. Fatal to the
    /// containing mutation: note integrity is a core invariant.
    #[error("failed to write note for commit {commit_id}: {reason}")]
    NoteWriteFailed {
        /// The commit that was abandoned
        commit_id: String,
        /// Underlying failure
        reason: String,
    },

    /// WAL entry could not be written or fsynced
    #[error("WAL write failed: {0}")]
    WalWriteFailed(String),

    /// WAL entry file is unparsable (torn write, corruption)
    #[error("WAL entry is corrupt: {0}")]
    WalParseError(String),

    /// Index update failed; logged and compensated by recovery
    #[error("index update failed: {0}")]
    IndexUpdateFailed(String),

    /// Entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored content could not be parsed as JSON
    #[error("parse error: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Git object-database error
    #[error("git error: {0}")]
    Git(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ParseError(e.to_string())
    }
}

impl Error {
    /// Check if this error is retriable by the OCC wrapper.
    ///
    /// Only ref-update rejections and version conflicts are retried;
    /// everything else propagates to the caller immediately.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::RefUpdateRejected { .. } | Error::VersionConflict { .. }
        )
    }
}
