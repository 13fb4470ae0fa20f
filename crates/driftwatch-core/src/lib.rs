// crates/driftwatch-core/src/lib.rs
//
// driftwatch-core: Core types, traits, and error taxonomy for Driftwatch.
//
// This is the leaf crate that all other crates in the workspace depend on.
// It defines the controller's data model (windows, baselines, verdicts,
// retrain jobs, model versions), the audit event vocabulary, and the narrow
// trait interfaces through which the controller talks to the inference
// service, the training procedure, the deployment mechanism, and storage.

pub mod audit;
pub mod baseline;
pub mod clock;
pub mod error;
pub mod job;
pub mod metrics;
pub mod traits;
pub mod verdict;
pub mod version;
pub mod window;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use driftwatch_core::RetrainJob;`

pub use audit::{AuditEvent, AuditRecord};
pub use baseline::{Baseline, FeatureHistogram};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DriftwatchError;
pub use job::{FailureReason, JobStatus, RetrainJob, TrainingOutput, TriggerReason};
pub use metrics::Metrics;
pub use verdict::DriftVerdict;
pub use version::{ModelVersion, Stage, VersionId};
pub use window::{FeatureWindow, Sample, OUTPUT_FEATURE};

pub use traits::{AuditSink, DeploymentNotifier, Registry, SampleSource, TrainingProcedure};
