// crates/driftwatch-control/src/trigger.rs
//
// Retrain trigger state machine for one monitored model.
//
// Valid transitions:
//   Idle -> Triggering -> Cooldown -> Idle
//
// Requests arriving while a job is in flight are coalesced (never queued),
// and requests arriving during Cooldown are coalesced unless forced.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use driftwatch_core::{DriftVerdict, RetrainJob, TriggerReason, VersionId};

/// Lifecycle states of the retrain trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    /// Ready to start a job.
    Idle,
    /// A job was dispatched recently; new requests wait out the interval.
    Cooldown,
    /// A job has been created but not yet handed to the orchestrator.
    Triggering,
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerState::Idle => write!(f, "Idle"),
            TriggerState::Cooldown => write!(f, "Cooldown"),
            TriggerState::Triggering => write!(f, "Triggering"),
        }
    }
}

/// Minimum spacing between two triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownState {
    pub last_trigger_time: Option<DateTime<Utc>>,
    pub min_interval: Duration,
}

impl CooldownState {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_trigger_time: None,
            min_interval,
        }
    }

    /// Whether a trigger at `now` is allowed. A trigger exactly at the
    /// boundary is accepted; a clock that went backwards is not.
    pub fn allows(&self, now: DateTime<Utc>) -> bool {
        match self.last_trigger_time {
            None => true,
            Some(last) => match (now - last).to_std() {
                Ok(elapsed) => elapsed >= self.min_interval,
                Err(_) => false,
            },
        }
    }

    /// Time left before `allows(now)` becomes true.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        match self.last_trigger_time {
            None => Duration::ZERO,
            Some(last) => {
                let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
                self.min_interval.saturating_sub(elapsed)
            }
        }
    }

    pub fn record(&mut self, at: DateTime<Utc>) {
        self.last_trigger_time = Some(at);
    }

    pub fn release(&mut self) {
        self.last_trigger_time = None;
    }
}

/// Why a request did not start a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoalesceCause {
    /// A job for this model is still running.
    JobInFlight { job_id: Uuid },
    /// The cooldown interval has not elapsed.
    Cooldown { remaining: Duration },
}

impl fmt::Display for CoalesceCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoalesceCause::JobInFlight { job_id } => write!(f, "job {} in flight", job_id),
            CoalesceCause::Cooldown { remaining } => {
                write!(f, "cooldown ({}s remaining)", remaining.as_secs())
            }
        }
    }
}

/// Outcome of a trigger request.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerDecision {
    Start(RetrainJob),
    Coalesced {
        reason: TriggerReason,
        cause: CoalesceCause,
    },
}

/// Decides when a retrain job may start for one model.
#[derive(Debug)]
pub struct RetrainTrigger {
    model: String,
    state: TriggerState,
    cooldown: CooldownState,
    in_flight: Option<Uuid>,
    retry_on_failure: bool,
}

impl RetrainTrigger {
    pub fn new(model: &str, min_interval: Duration, retry_on_failure: bool) -> Self {
        Self {
            model: model.to_string(),
            state: TriggerState::Idle,
            cooldown: CooldownState::new(min_interval),
            in_flight: None,
            retry_on_failure,
        }
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn cooldown(&self) -> &CooldownState {
        &self.cooldown
    }

    pub fn in_flight(&self) -> Option<Uuid> {
        self.in_flight
    }

    fn transition(&mut self, next: TriggerState) {
        if self.state != next {
            tracing::debug!("Trigger {}: {} -> {}", self.model, self.state, next);
            self.state = next;
        }
    }

    /// Move Cooldown -> Idle once the interval has elapsed.
    pub fn refresh(&mut self, now: DateTime<Utc>) {
        if self.state == TriggerState::Cooldown && self.cooldown.allows(now) {
            self.transition(TriggerState::Idle);
        }
    }

    /// Ask for a retrain. `force` bypasses cooldown but never an in-flight job.
    ///
    /// On `Start` the trigger is in `Triggering` and the caller must report
    /// the dispatch through `dispatched`.
    pub fn request(
        &mut self,
        reason: TriggerReason,
        force: bool,
        now: DateTime<Utc>,
        expected_production: Option<VersionId>,
    ) -> TriggerDecision {
        self.refresh(now);

        if let Some(job_id) = self.in_flight {
            return TriggerDecision::Coalesced {
                reason,
                cause: CoalesceCause::JobInFlight { job_id },
            };
        }
        if !force && !self.cooldown.allows(now) {
            return TriggerDecision::Coalesced {
                reason,
                cause: CoalesceCause::Cooldown {
                    remaining: self.cooldown.remaining(now),
                },
            };
        }

        let job = RetrainJob::new(&self.model, reason, now, expected_production);
        self.in_flight = Some(job.id);
        self.transition(TriggerState::Triggering);
        TriggerDecision::Start(job)
    }

    /// React to a verdict. Returns `None` unless the verdict exceeded the
    /// threshold.
    pub fn on_verdict(
        &mut self,
        verdict: &DriftVerdict,
        now: DateTime<Utc>,
        expected_production: Option<VersionId>,
    ) -> Option<TriggerDecision> {
        if !verdict.exceeded {
            return None;
        }
        let reason = TriggerReason::Drift {
            score: verdict.score,
            window_seq: verdict.window_seq,
            affected_features: verdict.affected_features.clone(),
        };
        Some(self.request(reason, false, now, expected_production))
    }

    /// The job created by the last `Start` was handed to the orchestrator.
    pub fn dispatched(&mut self, job_id: Uuid, now: DateTime<Utc>) {
        if self.state != TriggerState::Triggering || self.in_flight != Some(job_id) {
            tracing::warn!(
                "Trigger {}: dispatch of unknown job {} ignored (state {})",
                self.model,
                job_id,
                self.state
            );
            return;
        }
        self.cooldown.record(now);
        self.transition(TriggerState::Cooldown);
    }

    /// The in-flight job reached a terminal status.
    ///
    /// Cancellation always releases cooldown; a failure releases it only
    /// with `retry_on_failure`.
    pub fn finished(&mut self, job: &RetrainJob, now: DateTime<Utc>) {
        if self.in_flight != Some(job.id) {
            tracing::warn!(
                "Trigger {}: completion of unknown job {} ignored",
                self.model,
                job.id
            );
            return;
        }
        self.in_flight = None;

        let failed = job.failure.is_some();
        if job.was_cancelled() || (failed && self.retry_on_failure) {
            self.cooldown.release();
            tracing::info!("Trigger {}: cooldown released after job {}", self.model, job.id);
        }
        if self.state == TriggerState::Triggering {
            self.transition(TriggerState::Cooldown);
        }
        self.refresh(now);
    }
}
