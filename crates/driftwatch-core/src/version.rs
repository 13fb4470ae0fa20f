// crates/driftwatch-core/src/version.rs
//
// Registered model versions and their stage lifecycle.
//
//   Staging --> Production --> Archived
//      |                          ^
//      +--------------------------+   (rejected candidates)
//
// Versions are never deleted, only archived. Stage changes happen only
// through the promotion gate and the registry's atomic promote.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::Metrics;

/// Monotonic, never-reused version identifier assigned by the registry.
pub type VersionId = u64;

/// Deployment stage of a model version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Registered candidate awaiting a promotion decision.
    Staging,
    /// The single version serving production traffic.
    Production,
    /// Superseded or rejected.
    Archived,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Staging => "Staging",
            Stage::Production => "Production",
            Stage::Archived => "Archived",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A trained model artifact tracked by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Assigned by `Registry::register`; 0 until registered.
    pub version_id: VersionId,
    pub model: String,
    pub artifact_ref: String,
    pub metrics: Metrics,
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub promoted_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub archive_reason: Option<String>,
    /// The retrain job that produced this version, if any.
    pub job_id: Option<Uuid>,
}

impl ModelVersion {
    /// An unregistered Staging candidate.
    pub fn candidate(
        model: &str,
        artifact_ref: &str,
        metrics: Metrics,
        job_id: Option<Uuid>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version_id: 0,
            model: model.to_string(),
            artifact_ref: artifact_ref.to_string(),
            metrics,
            stage: Stage::Staging,
            created_at,
            promoted_at: None,
            archived_at: None,
            archive_reason: None,
            job_id,
        }
    }

    /// Set stage to Production.
    pub fn mark_production(&mut self, at: DateTime<Utc>) {
        self.stage = Stage::Production;
        self.promoted_at = Some(at);
    }

    /// Set stage to Archived. Returns `false` (and changes nothing) when the
    /// version is already archived, which keeps archiving idempotent.
    pub fn mark_archived(&mut self, reason: &str, at: DateTime<Utc>) -> bool {
        if self.stage == Stage::Archived {
            return false;
        }
        self.stage = Stage::Archived;
        self.archived_at = Some(at);
        self.archive_reason = Some(reason.to_string());
        true
    }
}
