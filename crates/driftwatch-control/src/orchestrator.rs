// crates/driftwatch-control/src/orchestrator.rs
//
// Training orchestrator: drives one retrain job to a terminal status by
// invoking the injected training procedure under a mandatory timeout.
// It never decides promotion; the finished job goes back to the owning
// controller over an mpsc channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use driftwatch_core::{Clock, DriftwatchError, FailureReason, RetrainJob, TrainingProcedure};

/// Runs retrain jobs for one model.
pub struct TrainingOrchestrator {
    procedure: Arc<dyn TrainingProcedure>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

/// Handle to a job running in a background task.
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: Uuid,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl JobHandle {
    /// Ask the job to stop. The job still reports back through the
    /// completion channel, as `Failed(Cancelled)`.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Drop the job's task outright. The procedure future is dropped with
    /// it and nothing is reported on the completion channel.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Resolve once the cancel flag is raised. A dropped sender means nobody
/// can cancel any more, so the future stays pending.
async fn wait_for_cancel(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl TrainingOrchestrator {
    /// Create an orchestrator. A zero timeout is rejected: every job must
    /// be bounded.
    pub fn new(
        procedure: Arc<dyn TrainingProcedure>,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DriftwatchError> {
        if timeout.is_zero() {
            return Err(DriftwatchError::Config(
                "training_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            procedure,
            timeout,
            clock,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `job` to a terminal status.
    pub async fn run(
        &self,
        job: RetrainJob,
        dataset_ref: &str,
        cancel: watch::Receiver<bool>,
    ) -> RetrainJob {
        tracing::info!(
            "Job {} ({}): training started, reason {}, timeout {}s",
            job.id,
            job.model,
            job.trigger_reason,
            self.timeout.as_secs()
        );

        let outcome = tokio::select! {
            result = tokio::time::timeout(self.timeout, self.procedure.train(dataset_ref)) => {
                match result {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(e)) => Err(FailureReason::Procedure(e.to_string())),
                    Err(_) => Err(FailureReason::Timeout { after_secs: self.timeout.as_secs() }),
                }
            }
            _ = wait_for_cancel(cancel) => Err(FailureReason::Cancelled),
        };

        let now = self.clock.now();
        match outcome {
            Ok(output) => {
                tracing::info!(
                    "Job {} ({}): succeeded, artifact {} [{}]",
                    job.id,
                    job.model,
                    output.artifact_ref,
                    output.metrics
                );
                job.succeed(output, now)
            }
            Err(reason) => {
                tracing::warn!("Job {} ({}): failed: {}", job.id, job.model, reason);
                job.fail(reason, now)
            }
        }
    }

    /// Run `job` in a background task and deliver the terminal job on `done`.
    pub fn spawn(
        self: &Arc<Self>,
        job: RetrainJob,
        dataset_ref: &str,
        done: mpsc::Sender<RetrainJob>,
    ) -> JobHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let job_id = job.id;
        let this = Arc::clone(self);
        let dataset_ref = dataset_ref.to_string();

        let task = tokio::spawn(async move {
            let finished = this.run(job, &dataset_ref, cancel_rx).await;
            if done.send(finished).await.is_err() {
                tracing::warn!("Job {}: controller gone, result dropped", job_id);
            }
        });

        JobHandle {
            job_id,
            cancel: cancel_tx,
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use driftwatch_core::{JobStatus, Metrics, SystemClock, TrainingOutput, TriggerReason};

    struct Instant(f64);

    #[async_trait]
    impl TrainingProcedure for Instant {
        async fn train(&self, dataset_ref: &str) -> Result<TrainingOutput, DriftwatchError> {
            Ok(TrainingOutput {
                artifact_ref: format!("{}/model.bin", dataset_ref),
                metrics: Metrics::new().with("accuracy", self.0),
            })
        }
    }

    struct Hangs;

    #[async_trait]
    impl TrainingProcedure for Hangs {
        async fn train(&self, _dataset_ref: &str) -> Result<TrainingOutput, DriftwatchError> {
            std::future::pending().await
        }
    }

    struct Broken;

    #[async_trait]
    impl TrainingProcedure for Broken {
        async fn train(&self, _dataset_ref: &str) -> Result<TrainingOutput, DriftwatchError> {
            Err(DriftwatchError::TrainingFailure("label column missing".to_string()))
        }
    }

    fn orchestrator(
        procedure: impl TrainingProcedure + 'static,
        timeout: Duration,
    ) -> Arc<TrainingOrchestrator> {
        let orch =
            TrainingOrchestrator::new(Arc::new(procedure), timeout, Arc::new(SystemClock)).unwrap();
        Arc::new(orch)
    }

    fn job() -> RetrainJob {
        RetrainJob::new("churn", TriggerReason::Manual { force: false }, Utc::now(), None)
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let result =
            TrainingOrchestrator::new(Arc::new(Broken), Duration::ZERO, Arc::new(SystemClock));
        assert!(matches!(result, Err(DriftwatchError::Config(_))));
    }

    #[tokio::test]
    async fn success_attaches_artifact_and_metrics() {
        let orch = orchestrator(Instant(0.91), Duration::from_secs(5));
        let (_tx, rx) = watch::channel(false);
        let finished = orch.run(job(), "s3://data/churn", rx).await;
        assert_eq!(finished.status, JobStatus::Succeeded);
        assert_eq!(
            finished.candidate_artifact_ref.as_deref(),
            Some("s3://data/churn/model.bin")
        );
        assert_eq!(finished.metrics.unwrap().get("accuracy"), Some(0.91));
    }

    #[tokio::test]
    async fn procedure_errors_fail_the_job() {
        let orch = orchestrator(Broken, Duration::from_secs(5));
        let (_tx, rx) = watch::channel(false);
        let finished = orch.run(job(), "d", rx).await;
        assert_eq!(finished.status, JobStatus::Failed);
        assert!(matches!(
            finished.failure,
            Some(FailureReason::Procedure(ref m)) if m.contains("label column")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_procedure_times_out() {
        let orch = orchestrator(Hangs, Duration::from_secs(30));
        let (_tx, rx) = watch::channel(false);
        let finished = orch.run(job(), "d", rx).await;
        assert_eq!(finished.failure, Some(FailureReason::Timeout { after_secs: 30 }));
    }

    #[tokio::test]
    async fn spawned_job_can_be_cancelled() {
        let orch = orchestrator(Hangs, Duration::from_secs(3600));
        let (done_tx, mut done_rx) = mpsc::channel(1);
        let handle = orch.spawn(job(), "d", done_tx);
        handle.cancel();
        let finished = done_rx.recv().await.unwrap();
        assert_eq!(finished.id, handle.job_id);
        assert!(finished.was_cancelled());
    }

    #[tokio::test]
    async fn aborted_job_stops_without_reporting() {
        let orch = orchestrator(Hangs, Duration::from_secs(3600));
        let (done_tx, mut done_rx) = mpsc::channel(1);
        let handle = orch.spawn(job(), "d", done_tx);
        assert!(!handle.is_finished());

        handle.abort();
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
        // The sender died with the task, so the channel closes empty.
        assert!(done_rx.recv().await.is_none());
    }
}
