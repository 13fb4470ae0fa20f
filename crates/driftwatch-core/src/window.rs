// crates/driftwatch-core/src/window.rs
//
// Live samples and the closed, time-bounded windows the drift evaluator
// compares against a baseline.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pseudo-feature id under which model outputs are tracked, so output drift
/// is measured with the same machinery as input drift.
pub const OUTPUT_FEATURE: &str = "model_output";

/// One observation pulled from the inference service: the input feature
/// vector and, when available, the model's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// When the inference service served this request.
    pub observed_at: DateTime<Utc>,
    /// Numeric input features keyed by feature id.
    #[serde(default)]
    pub features: BTreeMap<String, f64>,
    /// Scalar model output (score, probability, regression value).
    #[serde(default)]
    pub output: Option<f64>,
}

impl Sample {
    /// Create an empty sample observed at the given time.
    pub fn new(observed_at: DateTime<Utc>) -> Self {
        Self {
            observed_at,
            features: BTreeMap::new(),
            output: None,
        }
    }

    /// Builder-style feature insert.
    pub fn with_feature(mut self, id: &str, value: f64) -> Self {
        self.features.insert(id.to_string(), value);
        self
    }

    /// Builder-style output setter.
    pub fn with_output(mut self, output: f64) -> Self {
        self.output = Some(output);
        self
    }

    /// Value of a feature, with `OUTPUT_FEATURE` resolving to the model output.
    pub fn value(&self, feature: &str) -> Option<f64> {
        if feature == OUTPUT_FEATURE {
            return self.output;
        }
        self.features.get(feature).copied()
    }
}

/// An ordered, time-bounded collection of samples from one evaluation period.
///
/// Windows are immutable once closed: fields are private and there are no
/// mutators. Build one incrementally with the sampler's `WindowBuilder`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWindow {
    model: String,
    seq: u64,
    opened_at: DateTime<Utc>,
    closed_at: DateTime<Utc>,
    samples: Vec<Sample>,
}

impl FeatureWindow {
    /// Close a window over the given samples.
    pub fn new(
        model: &str,
        seq: u64,
        opened_at: DateTime<Utc>,
        closed_at: DateTime<Utc>,
        samples: Vec<Sample>,
    ) -> Self {
        Self {
            model: model.to_string(),
            seq,
            opened_at,
            closed_at,
            samples,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sequence number; windows of one model close in increasing order.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn closed_at(&self) -> DateTime<Utc> {
        self.closed_at
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// All feature ids observed in the window, including `OUTPUT_FEATURE`
    /// when any sample carried an output.
    pub fn feature_ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        for sample in &self.samples {
            ids.extend(sample.features.keys().cloned());
            if sample.output.is_some() {
                ids.insert(OUTPUT_FEATURE.to_string());
            }
        }
        ids
    }

    /// Finite values of one feature, in sample order.
    pub fn values(&self, feature: &str) -> Vec<f64> {
        self.samples
            .iter()
            .filter_map(|s| s.value(feature))
            .filter(|v| v.is_finite())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn output_is_exposed_as_pseudo_feature() {
        let s = Sample::new(t0()).with_feature("age", 30.0).with_output(0.7);
        assert_eq!(s.value("age"), Some(30.0));
        assert_eq!(s.value(OUTPUT_FEATURE), Some(0.7));
        assert_eq!(s.value("income"), None);
    }

    #[test]
    fn feature_ids_and_values_skip_non_finite() {
        let samples = vec![
            Sample::new(t0()).with_feature("age", 30.0),
            Sample::new(t0()).with_feature("age", f64::NAN).with_output(1.0),
            Sample::new(t0()).with_feature("income", 10.0),
        ];
        let w = FeatureWindow::new("m", 0, t0(), t0(), samples);
        let ids: Vec<String> = w.feature_ids().into_iter().collect();
        assert_eq!(ids, vec!["age", "income", OUTPUT_FEATURE]);
        assert_eq!(w.values("age"), vec![30.0]);
        assert_eq!(w.sample_count(), 3);
    }
}
