//! Review protocol: how reviewer verdicts become plan mutations.
//!
//! Confirmation is two-phase.  The instant a plan is confirmed, a local
//! heuristic resolution bumps `gather_context` to complete and
//! `generate_script` to in-progress and clears the confirmation flag, so the
//! session starts without waiting on the network.  The reviewer then runs in
//! the background over the bumped plan; on success a second resolution
//! applies its subset of step transitions.  On failure there is no second
//! resolution: the plan stays confirmed exactly once.
//!
//! All resolutions flow through one mpsc channel into the session engine's
//! command loop, which is the only place plan state actually changes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::mpsc;

use crate::plan::{PlanStep, SessionPlan, StepFeedback, StepPatch, StepStatus, StepType};

use super::reviewer::{PlanReviewer, StepTransition};

// ---------------------------------------------------------------------------
// Resolutions
// ---------------------------------------------------------------------------

/// Which phase of plan confirmation a resolution belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPhase {
    /// Immediate local confirmation; clears `needs_confirmation`.
    Heuristic,
    /// The reviewer's verdict over the heuristically bumped plan.
    Reviewed,
}

/// A batch of plan-step transitions to apply, tagged with its plan so late
/// arrivals for superseded plans can be discarded.
#[derive(Debug, Clone)]
pub struct PlanResolution {
    pub plan_id: String,
    pub phase: ResolutionPhase,
    pub transitions: Vec<StepTransition>,
    pub summary_note: Option<String>,
}

/// A reviewer-originated decision heading for the engine's mutation queue.
#[derive(Debug, Clone)]
pub enum ReviewResolution {
    Plan(PlanResolution),
    Feedback(StepFeedback),
}

/// Apply a batch of transitions to a plan, step by step.
///
/// Unknown step ids fall through [`SessionPlan::with_step_status`]'s no-op
/// behaviour, so a transition aimed at a step that was re-materialized away
/// is silently dropped.
pub fn apply_transitions(plan: &SessionPlan, transitions: &[StepTransition]) -> SessionPlan {
    let mut plan = plan.clone();
    for t in transitions {
        plan = plan.with_step_status(
            &t.step_id,
            t.status,
            StepPatch {
                details: t.notes.clone(),
                data: t.data.clone(),
            },
        );
    }
    plan
}

fn heuristic_transitions(plan: &SessionPlan) -> Vec<StepTransition> {
    let mut transitions = Vec::new();
    if let Some(step) = plan.step_of_type(StepType::GatherContext) {
        transitions.push(StepTransition {
            step_id: step.id.clone(),
            status: StepStatus::Complete,
            notes: None,
            data: None,
        });
    }
    if let Some(step) = plan.step_of_type(StepType::GenerateScript) {
        transitions.push(StepTransition {
            step_id: step.id.clone(),
            status: StepStatus::InProgress,
            notes: None,
            data: None,
        });
    }
    transitions
}

// ---------------------------------------------------------------------------
// ReviewProtocol
// ---------------------------------------------------------------------------

/// Drives reviews in the background and feeds their outcomes into the
/// engine's resolution channel.
///
/// Cheap to clone; the in-flight set is shared.
#[derive(Clone)]
pub struct ReviewProtocol {
    reviewer: Arc<dyn PlanReviewer>,
    resolution_tx: mpsc::Sender<ReviewResolution>,
    in_flight: Arc<StdMutex<HashSet<String>>>,
}

impl ReviewProtocol {
    pub fn new(reviewer: Arc<dyn PlanReviewer>, resolution_tx: mpsc::Sender<ReviewResolution>) -> Self {
        Self {
            reviewer,
            resolution_tx,
            in_flight: Arc::new(StdMutex::new(HashSet::new())),
        }
    }

    /// True while a plan review for this id is still running.
    pub fn is_under_review(&self, plan_id: &str) -> bool {
        self.in_flight.lock().unwrap().contains(plan_id)
    }

    /// Confirm a plan: send the heuristic resolution immediately, then let
    /// the reviewer refine it in the background.
    ///
    /// A confirmation for a plan already under review is ignored, so a
    /// double-confirm cannot race two reviews of the same plan.
    pub fn handle_plan_confirmation(&self, plan: SessionPlan) {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if !in_flight.insert(plan.id.clone()) {
                log::debug!("review: plan {} already under review, ignoring", plan.id);
                return;
            }
        }

        let this = self.clone();
        tokio::spawn(async move {
            let transitions = heuristic_transitions(&plan);
            let bumped = apply_transitions(&plan, &transitions).with_confirmation_cleared();

            let heuristic = PlanResolution {
                plan_id: plan.id.clone(),
                phase: ResolutionPhase::Heuristic,
                transitions,
                summary_note: None,
            };
            if this
                .resolution_tx
                .send(ReviewResolution::Plan(heuristic))
                .await
                .is_err()
            {
                this.in_flight.lock().unwrap().remove(&plan.id);
                return;
            }

            match this.reviewer.review_plan(&bumped).await {
                Ok(review) => {
                    if review.confirm == Some(false) {
                        // The plan is already running; a late veto is advisory.
                        log::debug!(
                            "review: reviewer declined plan {}, keeping heuristic confirmation",
                            plan.id
                        );
                    }
                    let reviewed = PlanResolution {
                        plan_id: plan.id.clone(),
                        phase: ResolutionPhase::Reviewed,
                        transitions: review.step_transitions,
                        summary_note: review.plan_notes,
                    };
                    let _ = this.resolution_tx.send(ReviewResolution::Plan(reviewed)).await;
                }
                Err(e) => {
                    log::warn!(
                        "review: plan review failed ({e}); plan {} keeps its heuristic confirmation",
                        plan.id
                    );
                }
            }

            this.in_flight.lock().unwrap().remove(&plan.id);
        });
    }

    /// Collect feedback for a finished step.
    ///
    /// Reviewer failure degrades to approval so playback never stalls on the
    /// review service.
    pub fn handle_step_feedback(&self, step: PlanStep) {
        let this = self.clone();
        tokio::spawn(async move {
            let feedback = match this.reviewer.review_step(&step).await {
                Ok(review) => StepFeedback {
                    step_id: step.id.clone(),
                    approved: review.approved,
                    notes: review.notes,
                    reason: review.reason,
                    adjustments: review.adjustments,
                },
                Err(e) => {
                    log::warn!(
                        "review: step feedback failed ({e}); auto-approving '{}'",
                        step.title
                    );
                    StepFeedback::auto_approved(
                        &step.id,
                        format!("auto-approved: reviewer unavailable ({e})"),
                    )
                }
            };
            let _ = this
                .resolution_tx
                .send(ReviewResolution::Feedback(feedback))
                .await;
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
