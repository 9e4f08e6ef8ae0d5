//! Plan review: advisory quality checks that never block the session.
//!
//! The [`ReviewProtocol`] sits between the session engine and the
//! [`PlanReviewer`]: it confirms plans heuristically first, lets the
//! reviewer refine them in the background, and degrades step feedback to
//! approval whenever the reviewer is unreachable.

pub mod prompt;
pub mod protocol;
pub mod reviewer;

pub use prompt::ReviewPromptBuilder;
pub use protocol::{
    apply_transitions, PlanResolution, ResolutionPhase, ReviewProtocol, ReviewResolution,
};
pub use reviewer::{
    ApiReviewer, PlanReview, PlanReviewer, ReviewError, StepReview, StepTransition,
};

#[cfg(test)]
pub use reviewer::MockReviewer;
