//! Prompt construction for the plan reviewer.
//!
//! The reviewer is an LLM-backed service; these builders produce the
//! system/user message pair for each review mode.  Keeping the wording here,
//! away from the HTTP plumbing, makes prompt changes reviewable in one
//! place.

use crate::plan::{PlanStep, SessionPlan};

const SYSTEM_INSTRUCTION_PLAN_REVIEW: &str = "\
You are a quality reviewer for guided audio sessions. You receive a session \
plan as JSON: an ordered list of steps (gather_context, generate_script, \
play_segment, wrap_up) with statuses. Assess whether the plan fits the \
user's goal and ego state. Respond with JSON only, no prose, in the shape: \
{\"confirm\": true, \"planNotes\": \"optional one-line note\", \
\"stepTransitions\": [{\"stepId\": \"...\", \"status\": \"complete\", \
\"notes\": \"optional\"}]}. Mention only the steps you want changed; \
unmentioned steps keep their current status. Valid statuses: pending, \
in-progress, awaiting-feedback, complete, needs-revision.";

const SYSTEM_INSTRUCTION_STEP_FEEDBACK: &str = "\
You are a quality reviewer for guided audio sessions. You receive one \
just-finished plan step as JSON. Decide whether its result should stand. \
Respond with JSON only, no prose, in the shape: {\"approved\": true, \
\"notes\": \"optional\", \"reason\": \"required when approved is false\", \
\"adjustments\": {\"optional\": \"key-value hints for later steps\"}}.";

/// Builds the (system, user) message pairs sent to the reviewer.
pub struct ReviewPromptBuilder;

impl ReviewPromptBuilder {
    /// Prompt for reviewing a whole plan at confirmation time.
    pub fn build_plan_review(plan: &SessionPlan) -> (String, String) {
        let plan_json = serde_json::to_string_pretty(plan).unwrap_or_else(|_| "{}".into());
        let user = format!(
            "Review this session plan (intent: {}).\n\nPlan:\n{plan_json}",
            plan.intent.as_str()
        );
        (SYSTEM_INSTRUCTION_PLAN_REVIEW.to_string(), user)
    }

    /// Prompt for judging one finished step.
    pub fn build_step_feedback(step: &PlanStep) -> (String, String) {
        let step_json = serde_json::to_string_pretty(step).unwrap_or_else(|_| "{}".into());
        let user = format!(
            "This {} step just finished.\n\nStep:\n{step_json}",
            step.step_type.as_str()
        );
        (SYSTEM_INSTRUCTION_STEP_FEEDBACK.to_string(), user)
    }
}
