// crates/driftwatch-daemon/src/config.rs
//
// Runtime configuration for the Driftwatch daemon.
// Loaded from a TOML file or populated with sensible defaults, then
// validated eagerly before any controller starts.
//
// Global knobs live at the top level; each `[[models]]` table names one
// monitored model and may override any of them.

use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use driftwatch_control::{ControllerConfig, PromotionPolicy};
use driftwatch_core::Metrics;
use driftwatch_drift::{Aggregation, Distance, EvaluatorConfig};

/// Errors raised while loading or validating the daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Directory for local data storage (registry and audit RocksDB).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Log level: "trace", "debug", "info", "warn", "error".
    /// `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between controller status heartbeats in the log.
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,

    /// Defaults shared by every model.
    #[serde(flatten)]
    pub settings: ControlSettings,

    /// Monitored models.
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

/// Drift, trigger and promotion knobs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ControlSettings {
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: f64,
    #[serde(default = "default_per_feature_subthreshold")]
    pub per_feature_subthreshold: f64,
    #[serde(default = "default_min_sample_count")]
    pub min_sample_count: usize,
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,
    #[serde(default)]
    pub distance: Distance,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default = "default_cooldown_interval_secs")]
    pub cooldown_interval_secs: u64,
    #[serde(default)]
    pub retry_on_failure: bool,
    #[serde(default = "default_min_quality")]
    pub min_quality: Metrics,
    #[serde(default = "default_primary_metric")]
    pub primary_metric: String,
    #[serde(default)]
    pub tolerance: f64,
    #[serde(default)]
    pub promote_on_tie: bool,
    #[serde(default = "default_training_timeout_secs")]
    pub training_timeout_secs: u64,
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,
}

/// Per-model overrides of `ControlSettings`. Unset fields inherit.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SettingsOverride {
    pub drift_threshold: Option<f64>,
    pub per_feature_subthreshold: Option<f64>,
    pub min_sample_count: Option<usize>,
    pub histogram_bins: Option<usize>,
    pub distance: Option<Distance>,
    pub aggregation: Option<Aggregation>,
    pub cooldown_interval_secs: Option<u64>,
    pub retry_on_failure: Option<bool>,
    pub min_quality: Option<Metrics>,
    pub primary_metric: Option<String>,
    pub tolerance: Option<f64>,
    pub promote_on_tie: Option<bool>,
    pub training_timeout_secs: Option<u64>,
    pub sample_interval_secs: Option<u64>,
}

/// One monitored model.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub name: String,

    /// URL returning the samples observed since the previous pull (JSON array).
    pub sample_url: String,

    /// Training command and arguments. The dataset reference is appended as
    /// the final argument.
    pub train_command: Vec<String>,

    /// Dataset reference handed to the training command.
    pub dataset_ref: String,

    /// Deployment webhook. Promotions are only logged when unset.
    #[serde(default)]
    pub notify_url: Option<String>,

    /// Start a scheduled retrain this often, regardless of drift.
    #[serde(default)]
    pub periodic_retrain_secs: Option<u64>,

    #[serde(flatten)]
    pub overrides: SettingsOverride,
}

fn default_data_dir() -> String {
    "~/.driftwatch/data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_status_interval_secs() -> u64 {
    300
}

fn default_drift_threshold() -> f64 {
    0.2
}

fn default_per_feature_subthreshold() -> f64 {
    0.1
}

fn default_min_sample_count() -> usize {
    30
}

fn default_histogram_bins() -> usize {
    10
}

fn default_cooldown_interval_secs() -> u64 {
    3600
}

fn default_min_quality() -> Metrics {
    Metrics::new().with("accuracy", 0.85)
}

fn default_primary_metric() -> String {
    "accuracy".to_string()
}

fn default_training_timeout_secs() -> u64 {
    3600
}

fn default_sample_interval_secs() -> u64 {
    60
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            drift_threshold: default_drift_threshold(),
            per_feature_subthreshold: default_per_feature_subthreshold(),
            min_sample_count: default_min_sample_count(),
            histogram_bins: default_histogram_bins(),
            distance: Distance::default(),
            aggregation: Aggregation::default(),
            cooldown_interval_secs: default_cooldown_interval_secs(),
            retry_on_failure: false,
            min_quality: default_min_quality(),
            primary_metric: default_primary_metric(),
            tolerance: 0.0,
            promote_on_tie: false,
            training_timeout_secs: default_training_timeout_secs(),
            sample_interval_secs: default_sample_interval_secs(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            status_interval_secs: default_status_interval_secs(),
            settings: ControlSettings::default(),
            models: Vec::new(),
        }
    }
}

impl ControlSettings {
    /// These settings with `overrides` applied.
    pub fn merged(&self, overrides: &SettingsOverride) -> ControlSettings {
        let o = overrides.clone();
        ControlSettings {
            drift_threshold: o.drift_threshold.unwrap_or(self.drift_threshold),
            per_feature_subthreshold: o
                .per_feature_subthreshold
                .unwrap_or(self.per_feature_subthreshold),
            min_sample_count: o.min_sample_count.unwrap_or(self.min_sample_count),
            histogram_bins: o.histogram_bins.unwrap_or(self.histogram_bins),
            distance: o.distance.unwrap_or(self.distance),
            aggregation: o.aggregation.unwrap_or(self.aggregation),
            cooldown_interval_secs: o
                .cooldown_interval_secs
                .unwrap_or(self.cooldown_interval_secs),
            retry_on_failure: o.retry_on_failure.unwrap_or(self.retry_on_failure),
            min_quality: o.min_quality.unwrap_or_else(|| self.min_quality.clone()),
            primary_metric: o
                .primary_metric
                .unwrap_or_else(|| self.primary_metric.clone()),
            tolerance: o.tolerance.unwrap_or(self.tolerance),
            promote_on_tie: o.promote_on_tie.unwrap_or(self.promote_on_tie),
            training_timeout_secs: o
                .training_timeout_secs
                .unwrap_or(self.training_timeout_secs),
            sample_interval_secs: o.sample_interval_secs.unwrap_or(self.sample_interval_secs),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(path, &contents)
    }

    fn parse(path: &str, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Controller configuration for one model, with overrides applied.
    pub fn controller_config(&self, model: &ModelConfig) -> ControllerConfig {
        let s = self.settings.merged(&model.overrides);
        let mut config = ControllerConfig::new(&model.name, &model.dataset_ref);
        config.evaluator = EvaluatorConfig {
            drift_threshold: s.drift_threshold,
            per_feature_subthreshold: s.per_feature_subthreshold,
            min_sample_count: s.min_sample_count,
            distance: s.distance,
            aggregation: s.aggregation,
        };
        config.histogram_bins = s.histogram_bins;
        config.cooldown_interval = Duration::from_secs(s.cooldown_interval_secs);
        config.retry_on_failure = s.retry_on_failure;
        config.policy = PromotionPolicy {
            min_quality: s.min_quality,
            primary_metric: s.primary_metric,
            tolerance: s.tolerance,
            promote_on_tie: s.promote_on_tie,
        };
        config.training_timeout = Duration::from_secs(s.training_timeout_secs);
        config.sample_interval = Duration::from_secs(s.sample_interval_secs);
        config.periodic_retrain = model.periodic_retrain_secs.map(Duration::from_secs);
        config
    }

    /// Reject configurations the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [[models]] entry is required".to_string(),
            ));
        }
        if self.status_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "status_interval_secs must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for model in &self.models {
            if !seen.insert(model.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate model name {}",
                    model.name
                )));
            }
            if model.sample_url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "model {}: sample_url must not be empty",
                    model.name
                )));
            }
            if model.train_command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "model {}: train_command must not be empty",
                    model.name
                )));
            }
            self.controller_config(model)
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("model {}: {}", model.name, e)))?;
        }
        Ok(())
    }
}
