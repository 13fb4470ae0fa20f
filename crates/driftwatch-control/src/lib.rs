// crates/driftwatch-control/src/lib.rs
//
// driftwatch-control: The control loop of Driftwatch.
//
// Wires the drift evaluator to the retrain trigger, the training
// orchestrator and the promotion gate, one `ModelController` per monitored
// model. Everything outside the loop (sample feed, training procedure,
// deployment, storage, audit) arrives through the traits in driftwatch-core.

pub mod controller;
pub mod gate;
pub mod orchestrator;
pub mod trigger;

pub use controller::{
    Collaborators, ControlCommand, ControllerConfig, ControllerHandle, ControllerStatus,
    JobReport, ModelController, TriggerOutcome, MAX_PROMOTION_ATTEMPTS,
};
pub use gate::{decide, Decision, PromotionGate, PromotionOutcome, PromotionPolicy, RejectReason};
pub use orchestrator::{JobHandle, TrainingOrchestrator};
pub use trigger::{CoalesceCause, CooldownState, RetrainTrigger, TriggerDecision, TriggerState};
