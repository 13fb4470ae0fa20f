// crates/driftwatch-drift/src/sampler.rs
//
// Metric sampler: accumulates live samples into the currently open window
// and closes it on the evaluation cadence.

use chrono::{DateTime, Utc};
use driftwatch_core::{DriftwatchError, FeatureWindow, Sample, SampleSource};

/// An open window that is still accepting samples.
///
/// `close` consumes the builder, so a closed `FeatureWindow` can never
/// receive more samples.
#[derive(Debug)]
pub struct WindowBuilder {
    model: String,
    seq: u64,
    opened_at: DateTime<Utc>,
    samples: Vec<Sample>,
}

impl WindowBuilder {
    pub fn new(model: &str, seq: u64, opened_at: DateTime<Utc>) -> Self {
        Self {
            model: model.to_string(),
            seq,
            opened_at,
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn extend<I: IntoIterator<Item = Sample>>(&mut self, samples: I) {
        self.samples.extend(samples);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Close the window at `closed_at`.
    pub fn close(self, closed_at: DateTime<Utc>) -> FeatureWindow {
        FeatureWindow::new(&self.model, self.seq, self.opened_at, closed_at, self.samples)
    }
}

/// Collects periodic windows of live samples for one monitored model.
///
/// Windows are numbered consecutively from 0, so verdicts can be consumed
/// in the order their windows closed.
#[derive(Debug)]
pub struct MetricSampler {
    model: String,
    current: WindowBuilder,
}

impl MetricSampler {
    /// Open the first window at `opened_at`.
    pub fn new(model: &str, opened_at: DateTime<Utc>) -> Self {
        Self {
            model: model.to_string(),
            current: WindowBuilder::new(model, 0, opened_at),
        }
    }

    /// Add samples to the open window.
    pub fn record<I: IntoIterator<Item = Sample>>(&mut self, samples: I) {
        self.current.extend(samples);
    }

    /// Number of samples in the open window.
    pub fn pending(&self) -> usize {
        self.current.len()
    }

    /// Pull one batch from `source` into the open window.
    ///
    /// Returns the number of samples added.
    pub async fn collect(&mut self, source: &dyn SampleSource) -> Result<usize, DriftwatchError> {
        let batch = source.sample().await?;
        let n = batch.len();
        self.record(batch);
        tracing::trace!("Sampler {}: pulled {} samples", self.model, n);
        Ok(n)
    }

    /// Close the open window at `now` and open the next one.
    pub fn rotate(&mut self, now: DateTime<Utc>) -> FeatureWindow {
        let next = WindowBuilder::new(&self.model, self.current.seq() + 1, now);
        let closed = std::mem::replace(&mut self.current, next);
        closed.close(now)
    }
}
