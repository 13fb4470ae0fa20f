// crates/driftwatch-core/src/verdict.rs

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of comparing one closed window against the current baseline.
///
/// Produced once per evaluation period, never modified afterwards, and
/// appended to the audit log after the trigger has consumed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftVerdict {
    /// Monitored model the window belongs to.
    pub model: String,
    /// Sequence number of the evaluated window.
    pub window_seq: u64,
    /// Close time of the evaluated window.
    pub timestamp: DateTime<Utc>,
    /// Aggregated distance (max or mean of per-feature distances), >= 0.
    pub score: f64,
    /// `score > drift_threshold` (always false when data is insufficient).
    pub exceeded: bool,
    /// Features whose individual distance exceeded the per-feature sub-threshold.
    pub affected_features: BTreeSet<String>,
    /// The window held fewer than `min_sample_count` samples.
    pub insufficient_data: bool,
    /// Number of samples in the evaluated window.
    pub sample_count: usize,
    /// Distance per evaluated feature.
    pub per_feature: BTreeMap<String, f64>,
    /// Baseline features with no finite value in the window.
    pub missing_features: BTreeSet<String>,
    /// Fingerprint of the baseline the window was compared against.
    pub baseline_fingerprint: String,
}

impl DriftVerdict {
    /// A flagged verdict for a window too sparse to score.
    pub fn insufficient(
        model: &str,
        window_seq: u64,
        timestamp: DateTime<Utc>,
        sample_count: usize,
        baseline_fingerprint: String,
    ) -> Self {
        Self {
            model: model.to_string(),
            window_seq,
            timestamp,
            score: 0.0,
            exceeded: false,
            affected_features: BTreeSet::new(),
            insufficient_data: true,
            sample_count,
            per_feature: BTreeMap::new(),
            missing_features: BTreeSet::new(),
            baseline_fingerprint,
        }
    }
}
