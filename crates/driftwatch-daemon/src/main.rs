// crates/driftwatch-daemon/src/main.rs
//
// Binary entrypoint for the Driftwatch daemon.
//
// Parses CLI arguments, loads and validates configuration, initializes
// tracing, opens the registry and audit log, and supervises one controller
// per monitored model until Ctrl-C.

mod config;
mod feed;
mod notifier;
mod state;
mod supervisor;
mod training;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use config::DaemonConfig;
use state::{DaemonState, DaemonStateMachine};
use supervisor::Supervisor;

use driftwatch_core::{AuditSink, Registry};
use driftwatch_store::{RocksAuditLog, RocksRegistry, TracingAuditSink};

/// Driftwatch daemon: watches model inputs for drift and retrains on demand.
#[derive(Parser, Debug)]
#[command(
    name = "driftwatch-daemon",
    version = "0.1.0",
    about = "Drift-triggered retraining and promotion controller"
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "~/.driftwatch/config.toml")]
    config: String,

    /// Override the configured data directory.
    #[arg(long)]
    data_dir: Option<String>,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config_path = expand_tilde(&args.config);

    // Configuration is read before tracing starts so `log_level` can apply;
    // the outcome is logged once the subscriber is up.
    let loaded = DaemonConfig::load(&config_path);
    let mut daemon_config = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(_) => DaemonConfig::default(),
    };
    if let Some(dir) = args.data_dir {
        daemon_config.data_dir = dir;
    }
    if let Some(level) = args.log_level {
        daemon_config.log_level = level;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&daemon_config.log_level)),
        )
        .init();

    match loaded {
        Ok(_) => tracing::info!("Loaded configuration from {}", config_path),
        Err(e) => tracing::warn!(
            "Could not load config from {}: {}. Using defaults.",
            config_path,
            e
        ),
    }

    let mut state_machine = DaemonStateMachine::new();
    daemon_config.validate()?;

    tracing::info!("Driftwatch Daemon v0.1.0");
    tracing::info!("Data directory: {}", daemon_config.data_dir);
    tracing::info!("Monitored models: {}", daemon_config.models.len());

    state_machine.transition(DaemonState::Loading)?;

    let data_dir = expand_tilde(&daemon_config.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let registry_path = format!("{}/registry", data_dir);
    let registry: Arc<dyn Registry> = Arc::new(RocksRegistry::open(&registry_path)?);
    tracing::info!("Registry opened at {}", registry_path);

    let audit_path = format!("{}/audit", data_dir);
    let audit: Arc<dyn AuditSink> = match RocksAuditLog::open(&audit_path) {
        Ok(log) => {
            tracing::info!("Audit log opened at {}", audit_path);
            Arc::new(log)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to open audit log at {}: {}. Audit records go to the log only.",
                audit_path,
                e
            );
            Arc::new(TracingAuditSink::new())
        }
    };

    let supervisor = match Supervisor::start(&daemon_config, registry, audit).await {
        Ok(supervisor) => supervisor,
        Err(e) => {
            let _ = state_machine.transition(DaemonState::ShuttingDown);
            return Err(e.into());
        }
    };
    state_machine.transition(DaemonState::Running)?;
    supervisor.log_status().await;

    supervisor
        .run(Duration::from_secs(daemon_config.status_interval_secs))
        .await;

    let _ = state_machine.transition(DaemonState::ShuttingDown);
    tracing::info!("Driftwatch daemon stopped");
    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{}", home.display(), &path[1..]);
        }
    }
    path.to_string()
}
