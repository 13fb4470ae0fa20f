// crates/driftwatch-core/src/audit.rs
//
// Audit event vocabulary. Every drift verdict, trigger decision, job
// outcome, and promotion decision is emitted as an immutable event so
// operators can observe the controller without talking to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::{JobStatus, TriggerReason};
use crate::verdict::DriftVerdict;
use crate::version::VersionId;

/// Something the controller decided or observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A window was evaluated.
    Verdict { verdict: DriftVerdict },
    /// A new baseline replaced the previous one.
    BaselineInstalled { window_seq: u64, fingerprint: String },
    /// The trigger started a retrain job.
    TriggerStarted { job_id: Uuid, reason: TriggerReason },
    /// A trigger request was coalesced instead of starting a job.
    TriggerCoalesced { reason: TriggerReason, cause: String },
    /// A retrain job reached a terminal status.
    JobFinished {
        job_id: Uuid,
        status: JobStatus,
        failure: Option<String>,
    },
    /// The promotion gate reached a decision.
    PromotionDecided {
        job_id: Uuid,
        candidate: Option<VersionId>,
        previous: Option<VersionId>,
        promoted: bool,
        reason: Option<String>,
    },
    /// A promotion lost a compare-and-swap race on the production pointer.
    PromotionConflict {
        job_id: Uuid,
        expected: Option<VersionId>,
        actual: Option<VersionId>,
    },
    /// The deployment notifier could not be reached.
    NotificationFailed { version_id: VersionId, error: String },
}

impl AuditEvent {
    /// Short snake_case label used in logs and CLI tables.
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::Verdict { .. } => "verdict",
            AuditEvent::BaselineInstalled { .. } => "baseline_installed",
            AuditEvent::TriggerStarted { .. } => "trigger_started",
            AuditEvent::TriggerCoalesced { .. } => "trigger_coalesced",
            AuditEvent::JobFinished { .. } => "job_finished",
            AuditEvent::PromotionDecided { .. } => "promotion_decided",
            AuditEvent::PromotionConflict { .. } => "promotion_conflict",
            AuditEvent::NotificationFailed { .. } => "notification_failed",
        }
    }
}

/// An event as stored by an audit sink, with its append position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Append position; strictly increasing within one sink.
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
    pub model: String,
    pub event: AuditEvent,
}
