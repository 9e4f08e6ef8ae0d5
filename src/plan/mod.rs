//! Plan state machine: what a guided session will do, step by step.
//!
//! The [`SessionPlan`] is the session's source of truth.  It is built from a
//! [`SessionContext`] (goal + ego state) with an inferred [`PlanIntent`],
//! carries the four canonical step kinds, and is advanced exclusively
//! through the copying transition methods on the plan itself.

pub mod intent;
pub mod model;

pub use intent::{infer_intent, PlanIntent};
pub use model::{
    play_step_id, PlanOptions, PlanStep, SessionContext, SessionPlan, StepFeedback, StepPatch,
    StepStatus, StepType,
};
