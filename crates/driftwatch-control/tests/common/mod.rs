// crates/driftwatch-control/tests/common/mod.rs
//
// Shared fixtures for the controller integration tests: scripted
// collaborators, deterministic sample generation, and a harness that wires
// a controller to the in-memory registry and audit log.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use driftwatch_control::{Collaborators, ControllerConfig, ModelController};
use driftwatch_core::{
    AuditEvent, Baseline, Clock, DeploymentNotifier, DriftwatchError, FeatureWindow, ManualClock,
    Metrics, ModelVersion, Registry, Sample, SampleSource, TrainingOutput, TrainingProcedure,
    VersionId,
};
use driftwatch_store::{InMemoryAuditLog, InMemoryRegistry};

pub const MODEL: &str = "churn";

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// `n` evenly spread values covering mean ± 2 std.
pub fn spread(mean: f64, std: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| mean + std * (-2.0 + 4.0 * i as f64 / (n - 1) as f64))
        .collect()
}

pub fn age_samples(mean: f64, n: usize, at: DateTime<Utc>) -> Vec<Sample> {
    spread(mean, 5.0, n)
        .into_iter()
        .map(|age| Sample::new(at).with_feature("age", age))
        .collect()
}

pub fn age_window(seq: u64, mean: f64, n: usize, closed_at: DateTime<Utc>) -> FeatureWindow {
    FeatureWindow::new(
        MODEL,
        seq,
        closed_at - chrono::Duration::minutes(1),
        closed_at,
        age_samples(mean, n, closed_at),
    )
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Hands out pre-loaded batches, then empty ones.
#[derive(Default)]
pub struct ScriptedSource {
    batches: Mutex<VecDeque<Vec<Sample>>>,
}

impl ScriptedSource {
    pub fn push(&self, batch: Vec<Sample>) {
        self.batches.lock().unwrap().push_back(batch);
    }
}

#[async_trait]
impl SampleSource for ScriptedSource {
    async fn sample(&self) -> Result<Vec<Sample>, DriftwatchError> {
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// How the stub training procedure behaves.
pub enum Training {
    /// Return the given accuracy immediately.
    Accuracy(f64),
    /// Wait for the notify, then return the accuracy.
    Held(f64, Arc<Notify>),
    /// Never return.
    Hang,
}

pub struct StubProcedure {
    behaviour: Training,
    pub calls: AtomicUsize,
}

impl StubProcedure {
    pub fn new(behaviour: Training) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrainingProcedure for StubProcedure {
    async fn train(&self, dataset_ref: &str) -> Result<TrainingOutput, DriftwatchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let accuracy = match &self.behaviour {
            Training::Accuracy(a) => *a,
            Training::Held(a, release) => {
                release.notified().await;
                *a
            }
            Training::Hang => std::future::pending().await,
        };
        Ok(TrainingOutput {
            artifact_ref: format!("{}/candidate-{}", dataset_ref, n),
            metrics: Metrics::new().with("accuracy", accuracy),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub fail: bool,
    /// Sleep this long (tokio time) before answering.
    pub delay: Option<Duration>,
    calls: Mutex<Vec<(String, VersionId, String)>>,
    delivered: AtomicUsize,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, VersionId, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Notifications that ran to completion.
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeploymentNotifier for RecordingNotifier {
    async fn notify(
        &self,
        model: &str,
        version_id: VersionId,
        artifact_ref: &str,
    ) -> Result<(), DriftwatchError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), version_id, artifact_ref.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.delivered.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DriftwatchError::NotificationFailure(
                "deploy hook returned 503".to_string(),
            ));
        }
        Ok(())
    }
}

/// Delegates to an in-memory registry but refuses to register versions.
pub struct RefusingRegistry {
    inner: Arc<InMemoryRegistry>,
}

#[async_trait]
impl Registry for RefusingRegistry {
    async fn register(&self, _version: ModelVersion) -> Result<VersionId, DriftwatchError> {
        Err(DriftwatchError::Storage("disk full".to_string()))
    }

    async fn promote(
        &self,
        model: &str,
        version_id: VersionId,
        expected_current: Option<VersionId>,
    ) -> Result<(), DriftwatchError> {
        self.inner.promote(model, version_id, expected_current).await
    }

    async fn get_production(&self, model: &str) -> Result<Option<ModelVersion>, DriftwatchError> {
        self.inner.get_production(model).await
    }

    async fn get(&self, version_id: VersionId) -> Result<Option<ModelVersion>, DriftwatchError> {
        self.inner.get(version_id).await
    }

    async fn archive(&self, version_id: VersionId, reason: &str) -> Result<(), DriftwatchError> {
        self.inner.archive(version_id, reason).await
    }

    async fn list(&self, model: &str) -> Result<Vec<ModelVersion>, DriftwatchError> {
        self.inner.list(model).await
    }

    async fn baseline(&self, model: &str) -> Result<Option<Baseline>, DriftwatchError> {
        self.inner.baseline(model).await
    }

    async fn set_baseline(&self, baseline: Baseline) -> Result<(), DriftwatchError> {
        self.inner.set_baseline(baseline).await
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub controller: ModelController,
    pub registry: Arc<InMemoryRegistry>,
    pub audit: Arc<InMemoryAuditLog>,
    pub notifier: Arc<RecordingNotifier>,
    pub procedure: Arc<StubProcedure>,
    pub source: Arc<ScriptedSource>,
    pub clock: Arc<ManualClock>,
}

pub struct HarnessBuilder {
    config: ControllerConfig,
    training: Training,
    notifier: RecordingNotifier,
    production_accuracy: Option<f64>,
    refuse_registration: bool,
}

impl HarnessBuilder {
    pub fn new(training: Training) -> Self {
        Self {
            config: ControllerConfig::new(MODEL, "s3://datasets/churn"),
            training,
            notifier: RecordingNotifier::default(),
            production_accuracy: None,
            refuse_registration: false,
        }
    }

    /// The controller sees a registry whose `register` always fails.
    pub fn refuse_registration(mut self) -> Self {
        self.refuse_registration = true;
        self
    }

    /// Seed the registry with a production version at this accuracy.
    pub fn production(mut self, accuracy: f64) -> Self {
        self.production_accuracy = Some(accuracy);
        self
    }

    pub fn notifier(mut self, notifier: RecordingNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn configure(mut self, f: impl FnOnce(&mut ControllerConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub async fn build(self) -> Harness {
        let registry = Arc::new(InMemoryRegistry::new());
        if let Some(accuracy) = self.production_accuracy {
            let seed = ModelVersion::candidate(
                MODEL,
                "s3://models/churn/seed",
                Metrics::new().with("accuracy", accuracy),
                None,
                t0(),
            );
            let id = registry.register(seed).await.unwrap();
            registry.promote(MODEL, id, None).await.unwrap();
        }

        let audit = Arc::new(InMemoryAuditLog::new());
        let notifier = Arc::new(self.notifier);
        let procedure = Arc::new(StubProcedure::new(self.training));
        let source = Arc::new(ScriptedSource::default());
        let clock = Arc::new(ManualClock::new(t0()));

        let controller_registry: Arc<dyn Registry> = if self.refuse_registration {
            Arc::new(RefusingRegistry {
                inner: registry.clone(),
            })
        } else {
            registry.clone()
        };
        let collaborators = Collaborators {
            source: source.clone(),
            procedure: procedure.clone(),
            notifier: notifier.clone(),
            registry: controller_registry,
            audit: audit.clone(),
            clock: clock.clone() as Arc<dyn Clock>,
        };
        let controller = ModelController::start(self.config, collaborators)
            .await
            .unwrap();

        Harness {
            controller,
            registry,
            audit,
            notifier,
            procedure,
            source,
            clock,
        }
    }
}

impl Harness {
    pub fn advance(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Audit event kinds for the model, in append order.
    pub fn audit_kinds(&self) -> Vec<&'static str> {
        self.audit
            .events_for(MODEL)
            .iter()
            .map(AuditEvent::kind)
            .collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.audit_kinds().iter().filter(|k| **k == kind).count()
    }

    /// Feed the reference window (age mean 30) so the baseline bootstraps.
    pub async fn bootstrap(&mut self) {
        let window = age_window(0, 30.0, 200, self.now());
        assert!(self.controller.observe_window(window).await.is_none());
    }
}
