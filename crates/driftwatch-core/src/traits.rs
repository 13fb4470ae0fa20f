// crates/driftwatch-core/src/traits.rs
//
// Narrow interfaces to the collaborators the controller consumes but does
// not design: the inference service, the training procedure, the
// deployment mechanism, the audit sink, and durable registry storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::AuditEvent;
use crate::baseline::Baseline;
use crate::error::DriftwatchError;
use crate::job::TrainingOutput;
use crate::version::{ModelVersion, VersionId};
use crate::window::Sample;

/// Pull feed of live samples from the inference service.
///
/// Each call returns the samples observed since the previous call.
#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn sample(&self) -> Result<Vec<Sample>, DriftwatchError>;
}

/// Domain-specific training procedure: data validation, feature
/// preparation, fitting, and evaluation.
///
/// Implemented by the daemon as an external command. The orchestrator
/// always wraps calls in a timeout, so implementations must be cancel-safe.
#[async_trait]
pub trait TrainingProcedure: Send + Sync {
    async fn train(&self, dataset_ref: &str) -> Result<TrainingOutput, DriftwatchError>;
}

/// Deployment mechanism invoked once per promotion.
///
/// Fire-and-forget from the controller's point of view: an error is logged
/// and audited but never reverses the promotion.
#[async_trait]
pub trait DeploymentNotifier: Send + Sync {
    async fn notify(
        &self,
        model: &str,
        version_id: VersionId,
        artifact_ref: &str,
    ) -> Result<(), DriftwatchError>;
}

/// Append-only sink for audit events.
pub trait AuditSink: Send + Sync {
    /// Append an event. Returns the assigned sequence number.
    fn record(
        &self,
        recorded_at: DateTime<Utc>,
        model: &str,
        event: AuditEvent,
    ) -> Result<u64, DriftwatchError>;
}

/// Durable record of model versions, the per-model production pointer,
/// and the current baseline.
///
/// Implemented by driftwatch-store (in-memory and RocksDB backends).
#[async_trait]
pub trait Registry: Send + Sync {
    /// Store a new version. Assigns and returns a monotonically increasing
    /// id that is never reused, ignoring any id already set on `version`.
    async fn register(&self, version: ModelVersion) -> Result<VersionId, DriftwatchError>;

    /// Atomically archive the current production version of `model` and make
    /// `version_id` production.
    ///
    /// Fails with `DriftwatchError::Conflict` if the production pointer is not
    /// `expected_current`. Either both stage changes are visible or neither is.
    async fn promote(
        &self,
        model: &str,
        version_id: VersionId,
        expected_current: Option<VersionId>,
    ) -> Result<(), DriftwatchError>;

    /// The current production version, or `None` before the first promotion.
    async fn get_production(&self, model: &str) -> Result<Option<ModelVersion>, DriftwatchError>;

    /// Look up a version by id.
    async fn get(&self, version_id: VersionId) -> Result<Option<ModelVersion>, DriftwatchError>;

    /// Archive a version. Archiving an archived version is a no-op.
    async fn archive(&self, version_id: VersionId, reason: &str) -> Result<(), DriftwatchError>;

    /// All versions of a model, ordered by id.
    async fn list(&self, model: &str) -> Result<Vec<ModelVersion>, DriftwatchError>;

    /// The current baseline of a model.
    async fn baseline(&self, model: &str) -> Result<Option<Baseline>, DriftwatchError>;

    /// Replace the baseline of `baseline.model`.
    async fn set_baseline(&self, baseline: Baseline) -> Result<(), DriftwatchError>;
}
