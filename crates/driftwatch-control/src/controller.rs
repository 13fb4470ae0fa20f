// crates/driftwatch-control/src/controller.rs
//
// Per-model controller: owns the sampler, evaluator, trigger, orchestrator
// and gate for one monitored model and drives them from a single task.
//
// The loop multiplexes four event sources:
//   - the evaluation cadence (collect samples, close a window, evaluate)
//   - completion of the background training job
//   - operator commands (retrain, cancel, status)
//   - shutdown
//
// Controllers for different models share no mutable state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use driftwatch_core::{
    AuditEvent, AuditSink, Baseline, Clock, DeploymentNotifier, DriftVerdict, DriftwatchError,
    FeatureWindow, JobStatus, Registry, RetrainJob, SampleSource, TrainingProcedure,
    TriggerReason, VersionId,
};
use driftwatch_drift::{build_baseline, DriftEvaluator, EvaluatorConfig, MetricSampler};

use crate::gate::{PromotionGate, PromotionOutcome, PromotionPolicy};
use crate::orchestrator::{JobHandle, TrainingOrchestrator};
use crate::trigger::{CoalesceCause, RetrainTrigger, TriggerDecision, TriggerState};

/// How many times a promotion is re-decided after losing the production
/// compare-and-swap before the candidate is archived.
pub const MAX_PROMOTION_ATTEMPTS: usize = 3;

/// How long shutdown waits for a cancelled job to report back.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Everything one controller needs to know about its model.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub model: String,
    pub evaluator: EvaluatorConfig,
    /// Bins per feature when building a baseline.
    pub histogram_bins: usize,
    pub cooldown_interval: Duration,
    /// A failed job releases cooldown instead of waiting it out.
    pub retry_on_failure: bool,
    pub policy: PromotionPolicy,
    pub training_timeout: Duration,
    /// Evaluation cadence; one window closes per tick.
    pub sample_interval: Duration,
    /// Start a `Scheduled` retrain whenever this much time has passed.
    pub periodic_retrain: Option<Duration>,
    /// Handed to the training procedure on every job.
    pub dataset_ref: String,
}

impl ControllerConfig {
    /// Configuration with default thresholds for `model`.
    pub fn new(model: &str, dataset_ref: &str) -> Self {
        Self {
            model: model.to_string(),
            evaluator: EvaluatorConfig::default(),
            histogram_bins: 10,
            cooldown_interval: Duration::from_secs(3600),
            retry_on_failure: false,
            policy: PromotionPolicy::default(),
            training_timeout: Duration::from_secs(3600),
            sample_interval: Duration::from_secs(60),
            periodic_retrain: None,
            dataset_ref: dataset_ref.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), DriftwatchError> {
        if self.model.trim().is_empty() {
            return Err(DriftwatchError::Config("model name must not be empty".to_string()));
        }
        self.evaluator.validate()?;
        self.policy.validate()?;
        if self.histogram_bins < 2 {
            return Err(DriftwatchError::Config(format!(
                "histogram_bins must be at least 2, got {}",
                self.histogram_bins
            )));
        }
        if self.training_timeout.is_zero() {
            return Err(DriftwatchError::Config(
                "training_timeout must be greater than zero".to_string(),
            ));
        }
        if self.sample_interval.is_zero() {
            return Err(DriftwatchError::Config(
                "sample_interval must be greater than zero".to_string(),
            ));
        }
        if matches!(self.periodic_retrain, Some(p) if p.is_zero()) {
            return Err(DriftwatchError::Config(
                "periodic_retrain must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// External collaborators injected into a controller.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn SampleSource>,
    pub procedure: Arc<dyn TrainingProcedure>,
    pub notifier: Arc<dyn DeploymentNotifier>,
    pub registry: Arc<dyn Registry>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
}

/// Result of a retrain request.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Started(Uuid),
    Coalesced(CoalesceCause),
}

/// A finished job together with what the gate did with it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub job: RetrainJob,
    pub outcome: PromotionOutcome,
}

/// Point-in-time view of a controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStatus {
    pub model: String,
    pub trigger_state: TriggerState,
    pub cooldown_remaining: Duration,
    pub running_job: Option<Uuid>,
    pub production: Option<VersionId>,
    pub baseline_fingerprint: Option<String>,
    pub last_verdict: Option<DriftVerdict>,
    pub windows_observed: u64,
}

/// Requests accepted by a running controller task.
#[derive(Debug)]
pub enum ControlCommand {
    Retrain {
        force: bool,
        reply: oneshot::Sender<TriggerOutcome>,
    },
    Cancel {
        reply: oneshot::Sender<Option<Uuid>>,
    },
    Status {
        reply: oneshot::Sender<ControllerStatus>,
    },
}

struct RunningJob {
    handle: JobHandle,
    /// Window that becomes the baseline if this job's candidate is promoted.
    window: Option<FeatureWindow>,
}

/// Drift-triggered retraining and promotion for one model.
pub struct ModelController {
    config: ControllerConfig,
    evaluator: DriftEvaluator,
    sampler: MetricSampler,
    trigger: RetrainTrigger,
    orchestrator: Arc<TrainingOrchestrator>,
    gate: PromotionGate,
    source: Arc<dyn SampleSource>,
    registry: Arc<dyn Registry>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    baseline: Option<Baseline>,
    production: Option<VersionId>,
    last_verdict: Option<DriftVerdict>,
    last_window: Option<FeatureWindow>,
    last_scheduled: DateTime<Utc>,
    windows_observed: u64,
    running: Option<RunningJob>,
    done_tx: mpsc::Sender<RetrainJob>,
    done_rx: mpsc::Receiver<RetrainJob>,
}

impl ModelController {
    /// Validate `config` and load the model's baseline and production
    /// pointer from the registry.
    pub async fn start(
        config: ControllerConfig,
        collaborators: Collaborators,
    ) -> Result<Self, DriftwatchError> {
        config.validate()?;
        let Collaborators {
            source,
            procedure,
            notifier,
            registry,
            audit,
            clock,
        } = collaborators;

        let evaluator = DriftEvaluator::with_config(config.evaluator.clone())?;
        let orchestrator = Arc::new(TrainingOrchestrator::new(
            procedure,
            config.training_timeout,
            clock.clone(),
        )?);
        let gate = PromotionGate::new(
            registry.clone(),
            notifier,
            audit.clone(),
            config.policy.clone(),
            clock.clone(),
        );

        let baseline = registry.baseline(&config.model).await?;
        let production = registry
            .get_production(&config.model)
            .await?
            .map(|v| v.version_id);
        let now = clock.now();

        tracing::info!(
            "Controller {} starting: production {:?}, baseline {}",
            config.model,
            production,
            match &baseline {
                Some(b) => b.fingerprint(),
                None => "none (bootstrap from first full window)".to_string(),
            }
        );

        let (done_tx, done_rx) = mpsc::channel(4);
        Ok(Self {
            evaluator,
            sampler: MetricSampler::new(&config.model, now),
            trigger: RetrainTrigger::new(
                &config.model,
                config.cooldown_interval,
                config.retry_on_failure,
            ),
            orchestrator,
            gate,
            source,
            registry,
            audit,
            clock,
            baseline,
            production,
            last_verdict: None,
            last_window: None,
            last_scheduled: now,
            windows_observed: 0,
            running: None,
            done_tx,
            done_rx,
            config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(self.clock.now(), &self.config.model, event) {
            tracing::error!("Audit write failed for {}: {}", self.config.model, e);
        }
    }

    /// One evaluation cycle: pull samples, close the window, evaluate it,
    /// and fire the periodic retrain when due.
    pub async fn tick(&mut self) -> Option<DriftVerdict> {
        if let Err(e) = self.sampler.collect(self.source.as_ref()).await {
            tracing::warn!("Sample feed for {} failed: {}", self.config.model, e);
        }
        let now = self.clock.now();
        let window = self.sampler.rotate(now);
        let verdict = self.observe_window(window).await;

        if let Some(period) = self.config.periodic_retrain {
            let due = (now - self.last_scheduled)
                .to_std()
                .map(|elapsed| elapsed >= period)
                .unwrap_or(false);
            if due {
                self.last_scheduled = now;
                self.request(TriggerReason::Scheduled, false);
            }
        }
        verdict
    }

    /// Evaluate a closed window against the baseline and react to the verdict.
    ///
    /// Without a baseline the first sufficiently large window becomes the
    /// baseline and no verdict is produced.
    pub async fn observe_window(&mut self, window: FeatureWindow) -> Option<DriftVerdict> {
        self.windows_observed += 1;
        let now = self.clock.now();
        self.trigger.refresh(now);

        if self.baseline.is_none() {
            self.bootstrap(&window).await;
            return None;
        }
        let baseline = self.baseline.as_ref()?;

        let verdict = self.evaluator.evaluate(baseline, &window);
        if verdict.insufficient_data {
            tracing::debug!(
                "Window {} of {}: insufficient data ({} samples)",
                verdict.window_seq,
                self.config.model,
                verdict.sample_count
            );
        } else {
            tracing::info!(
                "Window {} of {}: score {:.4} (exceeded={}, affected={:?}, missing={:?})",
                verdict.window_seq,
                self.config.model,
                verdict.score,
                verdict.exceeded,
                verdict.affected_features,
                verdict.missing_features
            );
            self.last_window = Some(window);
        }
        self.audit(AuditEvent::Verdict {
            verdict: verdict.clone(),
        });

        if verdict.exceeded {
            let reason = TriggerReason::Drift {
                score: verdict.score,
                window_seq: verdict.window_seq,
                affected_features: verdict.affected_features.clone(),
            };
            self.request(reason, false);
        }

        self.last_verdict = Some(verdict.clone());
        Some(verdict)
    }

    async fn bootstrap(&mut self, window: &FeatureWindow) {
        let built = build_baseline(
            window,
            self.config.histogram_bins,
            self.config.evaluator.min_sample_count,
            self.clock.now(),
        );
        let baseline = match built {
            Ok(baseline) => baseline,
            Err(e) => {
                tracing::debug!(
                    "No baseline for {} yet, window {} skipped: {}",
                    self.config.model,
                    window.seq(),
                    e
                );
                return;
            }
        };

        let fingerprint = baseline.fingerprint();
        if let Err(e) = self.registry.set_baseline(baseline.clone()).await {
            tracing::error!("Storing bootstrap baseline for {} failed: {}", self.config.model, e);
            return;
        }
        tracing::info!(
            "Baseline for {} bootstrapped from window {} ({} features, {})",
            self.config.model,
            window.seq(),
            baseline.features.len(),
            fingerprint
        );
        self.audit(AuditEvent::BaselineInstalled {
            window_seq: window.seq(),
            fingerprint,
        });
        self.last_window = Some(window.clone());
        self.baseline = Some(baseline);
    }

    /// Operator request for a retrain. `force` bypasses cooldown but not a
    /// job that is already running.
    pub fn request_retrain(&mut self, force: bool) -> TriggerOutcome {
        self.request(TriggerReason::Manual { force }, force)
    }

    fn request(&mut self, reason: TriggerReason, force: bool) -> TriggerOutcome {
        let now = self.clock.now();
        match self.trigger.request(reason, force, now, self.production) {
            TriggerDecision::Start(job) => {
                let job_id = job.id;
                tracing::info!(
                    "Retrain triggered for {}: job {} ({})",
                    self.config.model,
                    job_id,
                    job.trigger_reason
                );
                self.audit(AuditEvent::TriggerStarted {
                    job_id,
                    reason: job.trigger_reason.clone(),
                });
                let handle =
                    self.orchestrator
                        .spawn(job, &self.config.dataset_ref, self.done_tx.clone());
                self.trigger.dispatched(job_id, now);
                self.running = Some(RunningJob {
                    handle,
                    window: self.last_window.clone(),
                });
                TriggerOutcome::Started(job_id)
            }
            TriggerDecision::Coalesced { reason, cause } => {
                tracing::info!(
                    "Retrain request for {} coalesced: {} ({})",
                    self.config.model,
                    reason,
                    cause
                );
                self.audit(AuditEvent::TriggerCoalesced {
                    reason,
                    cause: cause.to_string(),
                });
                TriggerOutcome::Coalesced(cause)
            }
        }
    }

    /// Cancel the running job, if any. The job still completes through
    /// `complete_job` as `Failed(Cancelled)`, which releases cooldown.
    pub fn cancel_running_job(&mut self) -> Option<Uuid> {
        let running = self.running.as_ref()?;
        tracing::info!(
            "Cancelling job {} for {}",
            running.handle.job_id,
            self.config.model
        );
        running.handle.cancel();
        Some(running.handle.job_id)
    }

    /// Wait for the running job to reach a terminal status.
    pub async fn next_completion(&mut self) -> Option<RetrainJob> {
        self.running.as_ref()?;
        self.done_rx.recv().await
    }

    /// Hand a terminal job to the gate and apply its decision.
    ///
    /// A lost production race is re-decided against the fresh production
    /// version, up to `MAX_PROMOTION_ATTEMPTS` times.
    pub async fn complete_job(&mut self, job: RetrainJob) -> Result<JobReport, DriftwatchError> {
        let now = self.clock.now();
        let window = match self.running.take() {
            Some(running) if running.handle.job_id == job.id => running.window,
            other => {
                self.running = other;
                None
            }
        };
        self.trigger.finished(&job, now);

        tracing::info!(
            "Job {} for {} finished: {}{}",
            job.id,
            self.config.model,
            job.status,
            job.failure
                .as_ref()
                .map(|f| format!(" ({})", f))
                .unwrap_or_default()
        );
        self.audit(AuditEvent::JobFinished {
            job_id: job.id,
            status: job.status,
            failure: job.failure.as_ref().map(|f| f.to_string()),
        });

        let candidate = match self.gate.register_candidate(&job).await {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::error!(
                    "Registering the candidate of job {} for {} failed: {}",
                    job.id,
                    self.config.model,
                    e
                );
                self.audit(AuditEvent::PromotionDecided {
                    job_id: job.id,
                    candidate: None,
                    previous: job.expected_production,
                    promoted: false,
                    reason: Some(format!("registration_failed: {}", e)),
                });
                return Err(e);
            }
        };
        let baseline = match (&job.status, window) {
            (JobStatus::Succeeded, Some(window)) => self.refreshed_baseline(&window),
            _ => None,
        };

        let mut expected = job.expected_production;
        let mut attempts = 0;
        let outcome = loop {
            match self.gate.settle(&job, candidate, expected, baseline.clone()).await {
                Ok(outcome) => break outcome,
                Err(DriftwatchError::Conflict {
                    model,
                    expected: lost,
                    actual,
                }) => {
                    attempts += 1;
                    tracing::warn!(
                        "Promotion of job {} lost the race for {}: expected {:?}, found {:?} (attempt {}/{})",
                        job.id,
                        model,
                        lost,
                        actual,
                        attempts,
                        MAX_PROMOTION_ATTEMPTS
                    );
                    self.audit(AuditEvent::PromotionConflict {
                        job_id: job.id,
                        expected: lost,
                        actual,
                    });
                    let fresh = self
                        .registry
                        .get_production(&model)
                        .await?
                        .map(|v| v.version_id);
                    self.production = fresh;
                    if attempts >= MAX_PROMOTION_ATTEMPTS {
                        if let Some(version_id) = candidate {
                            self.registry.archive(version_id, "conflict").await?;
                        }
                        return Err(DriftwatchError::Conflict {
                            model,
                            expected: lost,
                            actual,
                        });
                    }
                    expected = fresh;
                }
                Err(e) => return Err(e),
            }
        };

        if let PromotionOutcome::Promoted { version_id, .. } = &outcome {
            self.production = Some(*version_id);
            self.baseline = self.registry.baseline(&self.config.model).await?;
        }

        Ok(JobReport { job, outcome })
    }

    /// Wait for the deployment notifications of past promotions.
    pub async fn flush_notifications(&self) {
        self.gate.flush_notifications().await;
    }

    fn refreshed_baseline(&self, window: &FeatureWindow) -> Option<Baseline> {
        match build_baseline(
            window,
            self.config.histogram_bins,
            self.config.evaluator.min_sample_count,
            self.clock.now(),
        ) {
            Ok(baseline) => Some(baseline),
            Err(e) => {
                tracing::debug!(
                    "Window {} of {} cannot serve as a baseline: {}",
                    window.seq(),
                    self.config.model,
                    e
                );
                None
            }
        }
    }

    pub fn status(&self) -> ControllerStatus {
        let now = self.clock.now();
        ControllerStatus {
            model: self.config.model.clone(),
            trigger_state: self.trigger.state(),
            cooldown_remaining: self.trigger.cooldown().remaining(now),
            running_job: self.running.as_ref().map(|r| r.handle.job_id),
            production: self.production,
            baseline_fingerprint: self.baseline.as_ref().map(|b| b.fingerprint()),
            last_verdict: self.last_verdict.clone(),
            windows_observed: self.windows_observed,
        }
    }

    async fn handle_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Retrain { force, reply } => {
                let _ = reply.send(self.request_retrain(force));
            }
            ControlCommand::Cancel { reply } => {
                let _ = reply.send(self.cancel_running_job());
            }
            ControlCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    async fn finish(&mut self, job: RetrainJob) {
        match self.complete_job(job).await {
            Ok(report) => tracing::info!(
                "Job {} for {} settled: {:?}",
                report.job.id,
                self.config.model,
                report.outcome
            ),
            Err(e) => tracing::error!("Settling job for {} failed: {}", self.config.model, e),
        }
    }

    /// Drive the controller until `shutdown` flips to true (or its sender
    /// is dropped). A running job is cancelled and drained before returning.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<ControlCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let period = self.config.sample_interval;
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        tracing::info!(
            "Controller {} running (interval {}s)",
            self.config.model,
            period.as_secs()
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Controller {} received shutdown signal", self.config.model);
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
                Some(job) = self.done_rx.recv() => {
                    self.finish(job).await;
                }
                command = commands.recv(), if commands_open => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => commands_open = false,
                    }
                }
            }
        }

        if self.cancel_running_job().is_some() {
            match tokio::time::timeout(SHUTDOWN_GRACE, self.done_rx.recv()).await {
                Ok(Some(job)) => self.finish(job).await,
                _ => {
                    tracing::warn!(
                        "Controller {}: running job did not stop within {}s, aborting it",
                        self.config.model,
                        SHUTDOWN_GRACE.as_secs()
                    );
                    if let Some(running) = self.running.take() {
                        if !running.handle.is_finished() {
                            running.handle.abort();
                        }
                    }
                }
            }
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, self.gate.flush_notifications())
            .await
            .is_err()
        {
            tracing::warn!(
                "Controller {}: deployment notifications still pending after {}s",
                self.config.model,
                SHUTDOWN_GRACE.as_secs()
            );
        }
        tracing::info!("Controller {} stopped", self.config.model);
    }

    /// Run the controller in a background task.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> (ControllerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(32);
        let handle = ControllerHandle {
            model: self.config.model.clone(),
            commands: tx,
        };
        let task = tokio::spawn(self.run(rx, shutdown));
        (handle, task)
    }
}

/// Cloneable handle for talking to a spawned controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    model: String,
    commands: mpsc::Sender<ControlCommand>,
}

impl ControllerHandle {
    pub fn model(&self) -> &str {
        &self.model
    }

    fn stopped(&self) -> DriftwatchError {
        DriftwatchError::InvalidState(format!("controller for {} has stopped", self.model))
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ControlCommand,
    ) -> Result<T, DriftwatchError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| self.stopped())?;
        rx.await.map_err(|_| self.stopped())
    }

    pub async fn request_retrain(&self, force: bool) -> Result<TriggerOutcome, DriftwatchError> {
        self.call(|reply| ControlCommand::Retrain { force, reply }).await
    }

    pub async fn cancel_running_job(&self) -> Result<Option<Uuid>, DriftwatchError> {
        self.call(|reply| ControlCommand::Cancel { reply }).await
    }

    pub async fn status(&self) -> Result<ControllerStatus, DriftwatchError> {
        self.call(|reply| ControlCommand::Status { reply }).await
    }
}
