// crates/driftwatch-store/src/lib.rs
//
// driftwatch-store: Storage layer for Driftwatch.
//
// Provides the model registry (versions, the per-model production pointer,
// and the current baseline) in two flavours: an in-memory registry for tests
// and embedding, and a RocksDB-backed durable registry for the daemon. Also
// provides append-only audit logs with the same two backends, plus a
// tracing-only sink for when no durable log is available.

pub mod audit;
pub mod memory;
pub mod rocks;

// Re-export key types for ergonomic access from downstream crates.
pub use audit::{InMemoryAuditLog, RocksAuditLog, TracingAuditSink};
pub use memory::InMemoryRegistry;
pub use rocks::RocksRegistry;

use driftwatch_core::{DriftwatchError, ModelVersion, Stage, VersionId};

/// Check that `candidate` may become production for `model`.
pub(crate) fn check_promotable(
    model: &str,
    version_id: VersionId,
    candidate: &ModelVersion,
) -> Result<(), DriftwatchError> {
    if candidate.model != model {
        return Err(DriftwatchError::InvalidState(format!(
            "version {} belongs to model {}, not {}",
            version_id, candidate.model, model
        )));
    }
    if candidate.stage == Stage::Archived {
        return Err(DriftwatchError::InvalidState(format!(
            "version {} is archived and cannot be promoted",
            version_id
        )));
    }
    Ok(())
}

/// Archive reason recorded on a production version when it is replaced.
pub(crate) fn superseded_reason(successor: VersionId) -> String {
    format!("superseded by version {}", successor)
}
