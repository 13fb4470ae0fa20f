// crates/driftwatch-daemon/src/supervisor.rs
//
// Starts one controller task per configured model, logs a periodic status
// heartbeat, and on shutdown signals every controller and waits for it to
// cancel and drain its running job.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use driftwatch_control::{Collaborators, ControllerHandle, ModelController};
use driftwatch_core::{
    AuditSink, Clock, DeploymentNotifier, DriftwatchError, Registry, SystemClock,
};

use crate::config::{DaemonConfig, ModelConfig};
use crate::feed::HttpSampleSource;
use crate::notifier::{LogNotifier, WebhookNotifier};
use crate::training::CommandTrainingProcedure;

/// Owns the running controllers.
pub struct Supervisor {
    controllers: Vec<(ControllerHandle, JoinHandle<()>)>,
    shutdown: watch::Sender<bool>,
}

/// Wire the daemon's collaborator adapters for one model.
fn collaborators_for(
    model: &ModelConfig,
    registry: Arc<dyn Registry>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
) -> Result<Collaborators, DriftwatchError> {
    let notifier: Arc<dyn DeploymentNotifier> = match &model.notify_url {
        Some(url) => Arc::new(WebhookNotifier::new(url)),
        None => Arc::new(LogNotifier),
    };
    Ok(Collaborators {
        source: Arc::new(HttpSampleSource::new(&model.sample_url)),
        procedure: Arc::new(CommandTrainingProcedure::new(&model.train_command)?),
        notifier,
        registry,
        audit,
        clock,
    })
}

impl Supervisor {
    /// Start a controller for every model in `config`.
    ///
    /// If any controller fails to start, the ones already running are
    /// stopped when the returned error drops the shutdown sender.
    pub async fn start(
        config: &DaemonConfig,
        registry: Arc<dyn Registry>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, DriftwatchError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let mut controllers = Vec::with_capacity(config.models.len());

        for model in &config.models {
            let collaborators =
                collaborators_for(model, registry.clone(), audit.clone(), clock.clone())?;
            let controller =
                ModelController::start(config.controller_config(model), collaborators).await?;
            tracing::info!(
                "Model {}: feed {}, notify {}",
                model.name,
                model.sample_url,
                model.notify_url.as_deref().unwrap_or("(log only)")
            );
            controllers.push(controller.spawn(shutdown_rx.clone()));
        }

        Ok(Self {
            controllers,
            shutdown: shutdown_tx,
        })
    }

    pub fn handles(&self) -> Vec<ControllerHandle> {
        self.controllers.iter().map(|(h, _)| h.clone()).collect()
    }

    /// Log one status line per controller.
    pub async fn log_status(&self) {
        for (handle, _) in &self.controllers {
            match handle.status().await {
                Ok(status) => tracing::info!(
                    "Status {}: trigger {}, cooldown {}s, job {:?}, production {:?}, last score {}, windows {}",
                    status.model,
                    status.trigger_state,
                    status.cooldown_remaining.as_secs(),
                    status.running_job,
                    status.production,
                    status
                        .last_verdict
                        .as_ref()
                        .map(|v| format!("{:.4}", v.score))
                        .unwrap_or_else(|| "-".to_string()),
                    status.windows_observed
                ),
                Err(e) => tracing::warn!("Status of {} unavailable: {}", handle.model(), e),
            }
        }
    }

    /// Run until Ctrl-C, logging a heartbeat every `status_interval`.
    pub async fn run(self, status_interval: Duration) {
        let mut heartbeat = tokio::time::interval(status_interval);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Supervisor received shutdown signal");
                    break;
                }
                _ = heartbeat.tick() => {
                    self.log_status().await;
                }
            }
        }

        self.shutdown().await;
    }

    /// Stop every controller and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (handle, task) in self.controllers {
            if let Err(e) = task.await {
                tracing::error!("Controller {} task failed: {}", handle.model(), e);
            }
        }
        tracing::info!("All controllers stopped");
    }
}
