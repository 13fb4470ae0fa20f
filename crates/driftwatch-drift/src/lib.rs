// crates/driftwatch-drift/src/lib.rs
//
// driftwatch-drift: Metric sampling, baselines, and drift evaluation.
//
// The sampler turns the live sample feed into closed, sequence-numbered
// windows; the histogram module turns a window into a reference baseline;
// the detection module scores a window against a baseline with a
// distributional distance (PSI or KL divergence) and yields a verdict.

pub mod detection;
pub mod histogram;
pub mod sampler;

pub use detection::{evaluate, Aggregation, Distance, DriftEvaluator, EvaluatorConfig};
pub use histogram::build_baseline;
pub use sampler::{MetricSampler, WindowBuilder};
