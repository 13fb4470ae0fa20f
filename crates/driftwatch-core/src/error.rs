// crates/driftwatch-core/src/error.rs

use thiserror::Error;

use crate::version::VersionId;

/// Controller-wide error types for Driftwatch.
///
/// `InsufficientData` and `NotificationFailure` are absorbed where they occur
/// and only logged. `Conflict` always propagates to the caller, which must
/// re-run its promotion decision against fresh registry state.
#[derive(Debug, Error)]
pub enum DriftwatchError {
    /// A window held fewer samples than the configured minimum.
    #[error("Insufficient data: {got} samples, {required} required")]
    InsufficientData { got: usize, required: usize },

    /// The training procedure failed, timed out, or was cancelled.
    #[error("Training failure: {0}")]
    TrainingFailure(String),

    /// The production pointer moved under a concurrent promotion.
    #[error("Promotion conflict for model {model}: expected production {expected:?}, found {actual:?}")]
    Conflict {
        model: String,
        expected: Option<VersionId>,
        actual: Option<VersionId>,
    },

    /// The deployment notifier could not be reached.
    #[error("Notification failure: {0}")]
    NotificationFailure(String),

    /// Storage layer error (RocksDB, in-memory registry).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid or inconsistent configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid state transition.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The live sample feed could not be read.
    #[error("Feed error: {0}")]
    Feed(String),
}

impl From<serde_json::Error> for DriftwatchError {
    fn from(e: serde_json::Error) -> Self {
        DriftwatchError::Serialization(e.to_string())
    }
}
