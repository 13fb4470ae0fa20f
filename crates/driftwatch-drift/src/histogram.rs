// crates/driftwatch-drift/src/histogram.rs
//
// Equal-width histograms and baseline construction.
//
// Bin edges are derived from the baseline window's observed range; the two
// outer bins are open-ended so live values outside that range still land in
// a bin (and show up as drift) instead of being dropped.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use driftwatch_core::{Baseline, DriftwatchError, FeatureHistogram, FeatureWindow};

/// Index of the bin `value` falls into: the number of edges `<= value`.
pub fn bin_index(edges: &[f64], value: f64) -> usize {
    edges.partition_point(|edge| *edge <= value)
}

/// Fraction of `values` in each bin defined by `edges`.
///
/// Returns `edges.len() + 1` proportions summing to 1.0 (all zeros when
/// `values` is empty).
pub fn proportions(edges: &[f64], values: &[f64]) -> Vec<f64> {
    let mut counts = vec![0usize; edges.len() + 1];
    for v in values {
        counts[bin_index(edges, *v)] += 1;
    }
    if values.is_empty() {
        return vec![0.0; counts.len()];
    }
    let n = values.len() as f64;
    counts.into_iter().map(|c| c as f64 / n).collect()
}

/// Build an equal-width histogram with `bins` bins over the range of `values`.
///
/// A constant feature gets a single cut point at its value, so any later
/// shift below it is still visible.
pub fn histogram(values: &[f64], bins: usize) -> FeatureHistogram {
    let count = values.len();
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });

    let edges = if count == 0 {
        Vec::new()
    } else if (max - min).abs() <= f64::EPSILON {
        vec![min]
    } else {
        let width = (max - min) / bins as f64;
        (1..bins).map(|i| min + width * i as f64).collect()
    };

    let mean = if count == 0 {
        0.0
    } else {
        values.iter().sum::<f64>() / count as f64
    };
    let std_dev = if count < 2 {
        0.0
    } else {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64).sqrt()
    };

    FeatureHistogram {
        proportions: proportions(&edges, values),
        edges,
        count,
        mean,
        std_dev,
    }
}

/// Fail with `InsufficientData` when a window is below the minimum sample count.
pub fn check_sample_count(
    window: &FeatureWindow,
    min_sample_count: usize,
) -> Result<(), DriftwatchError> {
    if window.sample_count() < min_sample_count {
        return Err(DriftwatchError::InsufficientData {
            got: window.sample_count(),
            required: min_sample_count,
        });
    }
    Ok(())
}

/// Build a baseline from a closed window.
///
/// Every feature with at least `min_sample_count` finite values gets a
/// histogram; sparser features are left out of the baseline.
pub fn build_baseline(
    window: &FeatureWindow,
    bins: usize,
    min_sample_count: usize,
    created_at: DateTime<Utc>,
) -> Result<Baseline, DriftwatchError> {
    if bins < 2 {
        return Err(DriftwatchError::Config(format!(
            "histogram needs at least 2 bins, got {}",
            bins
        )));
    }
    check_sample_count(window, min_sample_count)?;

    let mut features = BTreeMap::new();
    for id in window.feature_ids() {
        let values = window.values(&id);
        if values.len() < min_sample_count {
            tracing::debug!(
                "Baseline for {}: skipping sparse feature {} ({} values)",
                window.model(),
                id,
                values.len()
            );
            continue;
        }
        features.insert(id, histogram(&values, bins));
    }

    Ok(Baseline {
        model: window.model().to_string(),
        created_at,
        source_window: window.seq(),
        features,
    })
}
