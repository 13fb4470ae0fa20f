// crates/driftwatch-core/src/job.rs
//
// Retrain jobs: created by the retrain trigger, exclusively mutated by the
// training orchestrator until they reach a terminal status, then handed to
// the promotion gate.
//
//   Running --> Succeeded   (artifact + metrics attached)
//      |
//      +------> Failed      (timeout | cancelled | procedure error)

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::version::VersionId;

/// Why a retrain job was started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TriggerReason {
    /// A drift verdict exceeded the threshold.
    Drift {
        score: f64,
        window_seq: u64,
        affected_features: BTreeSet<String>,
    },
    /// The periodic retrain schedule elapsed.
    Scheduled,
    /// An operator asked for a retrain.
    Manual { force: bool },
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerReason::Drift {
                score, window_seq, ..
            } => write!(f, "drift(score={:.4}, window={})", score, window_seq),
            TriggerReason::Scheduled => write!(f, "scheduled"),
            TriggerReason::Manual { force: true } => write!(f, "manual(force)"),
            TriggerReason::Manual { force: false } => write!(f, "manual"),
        }
    }
}

/// Lifecycle status of a retrain job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Succeeded => write!(f, "Succeeded"),
            JobStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Captured reason for a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The training procedure exceeded the mandatory timeout.
    Timeout { after_secs: u64 },
    /// An operator cancelled the job.
    Cancelled,
    /// The training procedure returned an error.
    Procedure(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Timeout { after_secs } => write!(f, "timeout after {}s", after_secs),
            FailureReason::Cancelled => write!(f, "cancelled"),
            FailureReason::Procedure(msg) => write!(f, "procedure: {}", msg),
        }
    }
}

/// What a successful training procedure hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingOutput {
    /// Stable reference into the artifact store / container registry.
    pub artifact_ref: String,
    /// Evaluation metrics of the trained candidate.
    pub metrics: Metrics,
}

/// A single retraining run for one monitored model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainJob {
    /// Unique identifier (UUID v7 for time-ordering).
    pub id: Uuid,
    pub model: String,
    pub trigger_reason: TriggerReason,
    pub start_time: DateTime<Utc>,
    pub finish_time: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub failure: Option<FailureReason>,
    pub candidate_artifact_ref: Option<String>,
    pub metrics: Option<Metrics>,
    /// The version that was Production when the job was triggered. The
    /// candidate is judged against exactly this version.
    pub expected_production: Option<VersionId>,
}

impl RetrainJob {
    /// Create a Running job.
    pub fn new(
        model: &str,
        trigger_reason: TriggerReason,
        start_time: DateTime<Utc>,
        expected_production: Option<VersionId>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            model: model.to_string(),
            trigger_reason,
            start_time,
            finish_time: None,
            status: JobStatus::Running,
            failure: None,
            candidate_artifact_ref: None,
            metrics: None,
            expected_production,
        }
    }

    /// Move to Succeeded with the training output attached.
    pub fn succeed(mut self, output: TrainingOutput, at: DateTime<Utc>) -> Self {
        self.status = JobStatus::Succeeded;
        self.finish_time = Some(at);
        self.candidate_artifact_ref = Some(output.artifact_ref);
        self.metrics = Some(output.metrics);
        self
    }

    /// Move to Failed with a captured reason.
    pub fn fail(mut self, reason: FailureReason, at: DateTime<Utc>) -> Self {
        self.status = JobStatus::Failed;
        self.finish_time = Some(at);
        self.failure = Some(reason);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status != JobStatus::Running
    }

    pub fn was_cancelled(&self) -> bool {
        matches!(self.failure, Some(FailureReason::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_running_and_not_terminal() {
        let job = RetrainJob::new("churn", TriggerReason::Scheduled, Utc::now(), Some(2));
        assert_eq!(job.status, JobStatus::Running);
        assert!(!job.is_terminal());
        assert_eq!(job.expected_production, Some(2));
    }

    #[test]
    fn succeed_attaches_output() {
        let now = Utc::now();
        let job = RetrainJob::new("churn", TriggerReason::Scheduled, now, None).succeed(
            TrainingOutput {
                artifact_ref: "registry/churn:7".to_string(),
                metrics: Metrics::new().with("accuracy", 0.9),
            },
            now,
        );
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.candidate_artifact_ref.as_deref(), Some("registry/churn:7"));
        assert_eq!(job.metrics.unwrap().get("accuracy"), Some(0.9));
    }

    #[test]
    fn cancelled_failure_is_detected() {
        let now = Utc::now();
        let job = RetrainJob::new("churn", TriggerReason::Manual { force: false }, now, None)
            .fail(FailureReason::Cancelled, now);
        assert!(job.is_terminal());
        assert!(job.was_cancelled());
        assert_eq!(job.failure.unwrap().to_string(), "cancelled");
    }
}
