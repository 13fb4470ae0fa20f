// crates/driftwatch-core/src/baseline.rs
//
// Reference distributions that live windows are compared against.
//
// A baseline is established from the window that preceded the last
// successful promotion (or the first sufficiently large window at bootstrap).
// It is replaced wholesale on promotion and never mutated in place.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Binned distribution and summary statistics for one feature.
///
/// `edges` are the interior cut points; bin `i` holds values `v` with
/// `edges[i-1] <= v < edges[i]`, and the outer bins are open-ended.
/// `proportions.len() == edges.len() + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureHistogram {
    pub edges: Vec<f64>,
    pub proportions: Vec<f64>,
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

/// Per-feature reference distribution for one monitored model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// The monitored model this baseline belongs to.
    pub model: String,
    /// When the baseline was built.
    pub created_at: DateTime<Utc>,
    /// Sequence number of the window it was built from.
    pub source_window: u64,
    /// Histograms keyed by feature id.
    pub features: BTreeMap<String, FeatureHistogram>,
}

impl Baseline {
    pub fn feature(&self, id: &str) -> Option<&FeatureHistogram> {
        self.features.get(id)
    }

    /// Stable content fingerprint, recorded on every verdict so an audit
    /// reader can tell which baseline a score was computed against.
    ///
    /// Returns hex SHA-256 over model, creation time, source window, and
    /// every feature's edges and proportions (little-endian f64 bytes).
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.model.as_bytes());
        hasher.update(self.created_at.to_rfc3339().as_bytes());
        hasher.update(self.source_window.to_le_bytes());

        for (id, hist) in &self.features {
            hasher.update(id.as_bytes());
            for edge in &hist.edges {
                hasher.update(edge.to_le_bytes());
            }
            for p in &hist.proportions {
                hasher.update(p.to_le_bytes());
            }
        }

        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}
