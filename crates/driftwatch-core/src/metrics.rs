// crates/driftwatch-core/src/metrics.rs
//
// Named evaluation metrics (accuracy, f1, auc, ...) attached to retrain jobs
// and model versions, and used as absolute quality floors by the promotion gate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A set of named scalar metrics.
///
/// Backed by a `BTreeMap` so iteration order (and therefore serialized
/// output and rejection reasons) is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metrics(BTreeMap<String, f64>);

impl Metrics {
    /// Create an empty metric set.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    /// Insert or overwrite a metric.
    pub fn insert(&mut self, name: &str, value: f64) {
        self.0.insert(name.to_string(), value);
    }

    /// Look up a metric by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterate metrics in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Metrics {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{}={:.4}", k, v)).collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_lookup() {
        let m = Metrics::new().with("accuracy", 0.91).with("f1", 0.7);
        assert_eq!(m.get("accuracy"), Some(0.91));
        assert!(m.contains("f1"));
        assert_eq!(m.get("auc"), None);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn serializes_as_plain_map() {
        let m: Metrics = vec![("accuracy", 0.88)].into_iter().collect();
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"accuracy":0.88}"#);
        let back: Metrics = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn display_is_name_ordered() {
        let m = Metrics::new().with("f1", 0.5).with("accuracy", 0.25);
        assert_eq!(m.to_string(), "accuracy=0.2500 f1=0.5000");
    }
}
