// crates/driftwatch-control/src/gate.rs
//
// Promotion gate. `decide` is the pure comparison of a finished job's
// metrics against the absolute floors and the current production version;
// `PromotionGate` applies that decision to the registry, the baseline, the
// deployment notifier, and the audit log.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use driftwatch_core::{
    AuditEvent, AuditSink, Baseline, Clock, DeploymentNotifier, DriftwatchError, JobStatus,
    Metrics, ModelVersion, Registry, RetrainJob, VersionId,
};

/// Rules a candidate must satisfy to replace production.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionPolicy {
    /// Absolute floors; every listed metric must be present and `>=` its floor.
    pub min_quality: Metrics,
    /// Metric compared against the production version.
    pub primary_metric: String,
    /// Allowed regression of the primary metric before rejecting.
    pub tolerance: f64,
    /// Promote when the primary metric equals production (within tolerance).
    pub promote_on_tie: bool,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self {
            min_quality: Metrics::new().with("accuracy", 0.85),
            primary_metric: "accuracy".to_string(),
            tolerance: 0.0,
            promote_on_tie: false,
        }
    }
}

impl PromotionPolicy {
    pub fn validate(&self) -> Result<(), DriftwatchError> {
        if self.primary_metric.trim().is_empty() {
            return Err(DriftwatchError::Config(
                "primary_metric must not be empty".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(DriftwatchError::Config(format!(
                "tolerance must be a finite number >= 0, got {}",
                self.tolerance
            )));
        }
        for (name, floor) in self.min_quality.iter() {
            if !floor.is_finite() {
                return Err(DriftwatchError::Config(format!(
                    "min_quality floor for {} is not finite",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Why a candidate was not promoted.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    NotSucceeded,
    MissingMetric(String),
    BelowMinQuality { metric: String, value: f64, floor: f64 },
    NonFiniteMetric { metric: String, value: f64 },
    Regression { candidate: f64, production: f64 },
    NoImprovement { candidate: f64, production: f64 },
}

impl RejectReason {
    /// Stable short code, used as the archive reason.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::NotSucceeded => "not_succeeded",
            RejectReason::MissingMetric(_) => "missing_metric",
            RejectReason::BelowMinQuality { .. } => "below_min_quality",
            RejectReason::NonFiniteMetric { .. } => "non_finite_metric",
            RejectReason::Regression { .. } => "regression",
            RejectReason::NoImprovement { .. } => "no_improvement",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingMetric(name) => write!(f, "missing_metric:{}", name),
            RejectReason::NonFiniteMetric { metric, .. } => {
                write!(f, "non_finite_metric:{}", metric)
            }
            other => write!(f, "{}", other.code()),
        }
    }
}

/// Result of the pure promotion decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Promote,
    Reject(RejectReason),
}

/// Decide whether `candidate` should replace `current_production`.
pub fn decide(
    candidate: &RetrainJob,
    current_production: Option<&ModelVersion>,
    policy: &PromotionPolicy,
) -> Decision {
    let metrics = match (&candidate.status, &candidate.metrics) {
        (JobStatus::Succeeded, Some(metrics)) => metrics,
        _ => return Decision::Reject(RejectReason::NotSucceeded),
    };

    let required =
        std::iter::once(policy.primary_metric.as_str()).chain(policy.min_quality.names());
    for name in required {
        if !metrics.contains(name) {
            return Decision::Reject(RejectReason::MissingMetric(name.to_string()));
        }
    }

    for (name, floor) in policy.min_quality.iter() {
        let value = metrics.get(name).unwrap_or(f64::NAN);
        // NaN never clears a floor.
        if !(value >= floor) {
            return Decision::Reject(RejectReason::BelowMinQuality {
                metric: name.to_string(),
                value,
                floor,
            });
        }
    }

    let value = metrics.get(&policy.primary_metric).unwrap_or(f64::NAN);
    if !value.is_finite() {
        return Decision::Reject(RejectReason::NonFiniteMetric {
            metric: policy.primary_metric.clone(),
            value,
        });
    }

    // A production value that cannot be compared counts as absent.
    let production_value = current_production
        .and_then(|version| version.metrics.get(&policy.primary_metric))
        .filter(|v| v.is_finite());
    let production = match production_value {
        Some(value) => value,
        None => return Decision::Promote,
    };

    if value < production - policy.tolerance {
        Decision::Reject(RejectReason::Regression {
            candidate: value,
            production,
        })
    } else if value > production || policy.promote_on_tie {
        Decision::Promote
    } else {
        Decision::Reject(RejectReason::NoImprovement {
            candidate: value,
            production,
        })
    }
}

/// What the gate did with a finished job.
#[derive(Debug, Clone, PartialEq)]
pub enum PromotionOutcome {
    Promoted {
        version_id: VersionId,
        previous: Option<VersionId>,
    },
    Rejected {
        version_id: Option<VersionId>,
        reason: RejectReason,
    },
}

/// Applies promotion decisions for one model.
pub struct PromotionGate {
    registry: Arc<dyn Registry>,
    notifier: Arc<dyn DeploymentNotifier>,
    audit: Arc<dyn AuditSink>,
    policy: PromotionPolicy,
    clock: Arc<dyn Clock>,
    notifications: Mutex<Vec<JoinHandle<()>>>,
}

impl PromotionGate {
    pub fn new(
        registry: Arc<dyn Registry>,
        notifier: Arc<dyn DeploymentNotifier>,
        audit: Arc<dyn AuditSink>,
        policy: PromotionPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            notifier,
            audit,
            policy,
            clock,
            notifications: Mutex::new(Vec::new()),
        }
    }

    pub fn policy(&self) -> &PromotionPolicy {
        &self.policy
    }

    fn audit(&self, model: &str, event: AuditEvent) {
        if let Err(e) = self.audit.record(self.clock.now(), model, event) {
            tracing::error!("Audit write failed for {}: {}", model, e);
        }
    }

    /// Register a succeeded job's artifact as a Staging version.
    ///
    /// Returns `None` for jobs that produced no artifact.
    pub async fn register_candidate(
        &self,
        job: &RetrainJob,
    ) -> Result<Option<VersionId>, DriftwatchError> {
        let artifact_ref = match (&job.status, &job.candidate_artifact_ref) {
            (JobStatus::Succeeded, Some(artifact_ref)) => artifact_ref,
            _ => return Ok(None),
        };
        let version = ModelVersion::candidate(
            &job.model,
            artifact_ref,
            job.metrics.clone().unwrap_or_default(),
            Some(job.id),
            self.clock.now(),
        );
        let version_id = self.registry.register(version).await?;
        tracing::info!(
            "Registered candidate version {} for {} from job {}",
            version_id,
            job.model,
            job.id
        );
        Ok(Some(version_id))
    }

    /// Decide against `expected` production and apply the decision.
    ///
    /// On promotion the production pointer is swapped with a compare-and-swap
    /// from `expected`; a `Conflict` is returned untouched so the caller can
    /// re-decide against fresh state. `baseline`, when given, replaces the
    /// model's baseline after a successful swap. The notifier is invoked
    /// exactly once per promotion, in a background task, and its failure
    /// never reverses the promotion.
    pub async fn settle(
        &self,
        job: &RetrainJob,
        candidate: Option<VersionId>,
        expected: Option<VersionId>,
        baseline: Option<Baseline>,
    ) -> Result<PromotionOutcome, DriftwatchError> {
        let production = match expected {
            Some(id) => self.registry.get(id).await?,
            None => None,
        };

        let decision = match candidate {
            Some(_) => decide(job, production.as_ref(), &self.policy),
            None => Decision::Reject(RejectReason::NotSucceeded),
        };

        match (decision, candidate) {
            (Decision::Promote, Some(version_id)) => {
                self.registry.promote(&job.model, version_id, expected).await?;
                tracing::info!(
                    "Promoted {} version {} (previous {:?})",
                    job.model,
                    version_id,
                    expected
                );
                self.audit(
                    &job.model,
                    AuditEvent::PromotionDecided {
                        job_id: job.id,
                        candidate: Some(version_id),
                        previous: expected,
                        promoted: true,
                        reason: None,
                    },
                );

                if let Some(baseline) = baseline {
                    self.install_baseline(baseline).await;
                }
                let artifact_ref = job.candidate_artifact_ref.clone().unwrap_or_default();
                self.notify(&job.model, version_id, artifact_ref);

                Ok(PromotionOutcome::Promoted {
                    version_id,
                    previous: expected,
                })
            }
            (decision, _) => {
                let reason = match decision {
                    Decision::Reject(reason) => reason,
                    Decision::Promote => RejectReason::NotSucceeded,
                };
                if let Some(version_id) = candidate {
                    self.registry.archive(version_id, reason.code()).await?;
                }
                tracing::info!(
                    "Rejected {} candidate {:?} from job {}: {:?}",
                    job.model,
                    candidate,
                    job.id,
                    reason
                );
                self.audit(
                    &job.model,
                    AuditEvent::PromotionDecided {
                        job_id: job.id,
                        candidate,
                        previous: expected,
                        promoted: false,
                        reason: Some(reason.to_string()),
                    },
                );
                Ok(PromotionOutcome::Rejected {
                    version_id: candidate,
                    reason,
                })
            }
        }
    }

    async fn install_baseline(&self, baseline: Baseline) {
        let model = baseline.model.clone();
        let window_seq = baseline.source_window;
        let fingerprint = baseline.fingerprint();
        match self.registry.set_baseline(baseline).await {
            Ok(()) => {
                tracing::info!(
                    "Baseline for {} refreshed from window {} ({})",
                    model,
                    window_seq,
                    fingerprint
                );
                self.audit(
                    &model,
                    AuditEvent::BaselineInstalled {
                        window_seq,
                        fingerprint,
                    },
                );
            }
            Err(e) => tracing::error!("Baseline refresh for {} failed: {}", model, e),
        }
    }

    /// Hand the promotion to the deployment notifier without waiting for it.
    fn notify(&self, model: &str, version_id: VersionId, artifact_ref: String) {
        let notifier = self.notifier.clone();
        let audit = self.audit.clone();
        let clock = self.clock.clone();
        let model = model.to_string();

        let task = tokio::spawn(async move {
            let Err(e) = notifier.notify(&model, version_id, &artifact_ref).await else {
                return;
            };
            tracing::warn!(
                "Deployment notification for {} version {} failed: {}",
                model,
                version_id,
                e
            );
            let event = AuditEvent::NotificationFailed {
                version_id,
                error: e.to_string(),
            };
            if let Err(e) = audit.record(clock.now(), &model, event) {
                tracing::error!("Audit write failed for {}: {}", model, e);
            }
        });

        let mut pending = self.notifications.lock().expect("notification list poisoned");
        pending.retain(|task| !task.is_finished());
        pending.push(task);
    }

    /// Wait for every notification started so far.
    pub async fn flush_notifications(&self) {
        let pending = std::mem::take(
            &mut *self.notifications.lock().expect("notification list poisoned"),
        );
        for task in pending {
            if let Err(e) = task.await {
                tracing::error!("Notification task failed: {}", e);
            }
        }
    }
}
