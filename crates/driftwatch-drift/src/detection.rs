// crates/driftwatch-drift/src/detection.rs
//
// Distribution drift detection between a live window and a baseline.

use std::collections::{BTreeMap, BTreeSet};

use driftwatch_core::{Baseline, DriftVerdict, DriftwatchError, FeatureWindow};
use serde::{Deserialize, Serialize};

use crate::histogram::{check_sample_count, proportions};

/// Floor applied to bin proportions before taking logarithms, so an empty
/// bin on either side yields a large but finite distance.
pub const PROPORTION_FLOOR: f64 = 1e-4;

/// Per-feature distributional distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Population stability index: sum((a - e) * ln(a / e)).
    #[default]
    Psi,
    /// KL divergence of the live distribution from the baseline: sum(a * ln(a / e)).
    Kl,
}

impl Distance {
    /// Distance between baseline proportions `expected` and live `actual`.
    pub fn between(self, expected: &[f64], actual: &[f64]) -> f64 {
        match self {
            Distance::Psi => psi(expected, actual),
            Distance::Kl => kl_divergence(expected, actual),
        }
    }
}

/// How per-feature distances combine into the verdict score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Max,
    Mean,
}

impl Aggregation {
    pub fn combine(self, distances: &[f64]) -> f64 {
        if distances.is_empty() {
            return 0.0;
        }
        match self {
            Aggregation::Max => distances.iter().cloned().fold(0.0, f64::max),
            Aggregation::Mean => distances.iter().sum::<f64>() / distances.len() as f64,
        }
    }
}

/// Thresholds and knobs for drift evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Verdict is exceeded when the score is strictly above this value.
    pub drift_threshold: f64,
    /// A feature is listed as affected when its distance is strictly above this value.
    pub per_feature_subthreshold: f64,
    /// Windows (and features) with fewer samples are not scored.
    pub min_sample_count: usize,
    pub distance: Distance,
    pub aggregation: Aggregation,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            drift_threshold: 0.2,
            per_feature_subthreshold: 0.1,
            min_sample_count: 30,
            distance: Distance::Psi,
            aggregation: Aggregation::Max,
        }
    }
}

impl EvaluatorConfig {
    /// Reject thresholds that would make every or no window drift.
    pub fn validate(&self) -> Result<(), DriftwatchError> {
        if !self.drift_threshold.is_finite() || self.drift_threshold <= 0.0 {
            return Err(DriftwatchError::Config(format!(
                "drift_threshold must be a positive number, got {}",
                self.drift_threshold
            )));
        }
        if !self.per_feature_subthreshold.is_finite() || self.per_feature_subthreshold < 0.0 {
            return Err(DriftwatchError::Config(format!(
                "per_feature_subthreshold must be >= 0, got {}",
                self.per_feature_subthreshold
            )));
        }
        if self.min_sample_count == 0 {
            return Err(DriftwatchError::Config(
                "min_sample_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Population stability index between two binned distributions.
pub fn psi(expected: &[f64], actual: &[f64]) -> f64 {
    expected
        .iter()
        .zip(actual.iter())
        .map(|(e, a)| {
            let e = e.max(PROPORTION_FLOOR);
            let a = a.max(PROPORTION_FLOOR);
            (a - e) * (a / e).ln()
        })
        .sum()
}

/// KL(actual || expected) between two binned distributions, clamped at 0
/// (flooring empty bins can push it marginally negative).
pub fn kl_divergence(expected: &[f64], actual: &[f64]) -> f64 {
    let kl: f64 = expected
        .iter()
        .zip(actual.iter())
        .map(|(e, a)| {
            if *a <= 0.0 {
                return 0.0;
            }
            let e = e.max(PROPORTION_FLOOR);
            a * (a / e).ln()
        })
        .sum();
    kl.max(0.0)
}

/// Score `window` against `baseline`.
///
/// Pure and deterministic: identical inputs always produce identical
/// verdicts, and nothing outside the returned value is touched. A window
/// below `min_sample_count` yields a verdict flagged `insufficient_data`
/// with `exceeded = false`, whatever its actual distance.
pub fn evaluate(
    baseline: &Baseline,
    window: &FeatureWindow,
    config: &EvaluatorConfig,
) -> DriftVerdict {
    let fingerprint = baseline.fingerprint();

    if check_sample_count(window, config.min_sample_count).is_err() {
        return DriftVerdict::insufficient(
            window.model(),
            window.seq(),
            window.closed_at(),
            window.sample_count(),
            fingerprint,
        );
    }

    let mut per_feature = BTreeMap::new();
    let mut missing_features = BTreeSet::new();

    for (id, hist) in &baseline.features {
        let values = window.values(id);
        if values.len() < config.min_sample_count {
            missing_features.insert(id.clone());
            continue;
        }
        let actual = proportions(&hist.edges, &values);
        per_feature.insert(id.clone(), config.distance.between(&hist.proportions, &actual));
    }

    let distances: Vec<f64> = per_feature.values().copied().collect();
    let score = config.aggregation.combine(&distances);

    let affected_features = per_feature
        .iter()
        .filter(|(_, d)| **d > config.per_feature_subthreshold)
        .map(|(id, _)| id.clone())
        .collect();

    DriftVerdict {
        model: window.model().to_string(),
        window_seq: window.seq(),
        timestamp: window.closed_at(),
        score,
        exceeded: score > config.drift_threshold,
        affected_features,
        insufficient_data: false,
        sample_count: window.sample_count(),
        per_feature,
        missing_features,
        baseline_fingerprint: fingerprint,
    }
}

/// Evaluates windows against baselines with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct DriftEvaluator {
    config: EvaluatorConfig,
}

impl DriftEvaluator {
    /// Create an evaluator with default thresholds (PSI, max, 0.2 / 0.1, 30 samples).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an evaluator with a validated configuration.
    pub fn with_config(config: EvaluatorConfig) -> Result<Self, DriftwatchError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn evaluate(&self, baseline: &Baseline, window: &FeatureWindow) -> DriftVerdict {
        evaluate(baseline, window, &self.config)
    }
}
