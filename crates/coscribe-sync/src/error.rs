//! Error types for the sync layer.

use coscribe_model::StoreError;
use thiserror::Error;

/// Errors surfaced by sync operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The authoritative document moved past our base version.
    #[error("version conflict: authoritative document is at version {current}")]
    VersionConflict { current: u64 },

    /// Network or storage failure. Already retried with backoff by the
    /// time callers see it.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Server-side validation rejection, surfaced verbatim. Never retried;
    /// resending an invalid request cannot succeed.
    #[error("patch rejected at operation {index}: {message}")]
    Validation { index: usize, message: String },

    /// An authoritative snapshot failed local validation.
    #[error("authoritative snapshot rejected: {0}")]
    Snapshot(#[from] StoreError),

    /// Two consecutive version conflicts on the same batch. Automatic
    /// reconciliation gave up; the caller should refresh.
    #[error("unrecoverable edit conflict, refresh required")]
    EditConflict,
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
