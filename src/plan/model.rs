//! Session plan data model and status transitions.
//!
//! [`SessionPlan`] owns an ordered list of [`PlanStep`]s; exactly one
//! `gather_context`, one `generate_script` and one `wrap_up` step, plus one
//! or more `play_segment` steps (a single placeholder before the script is
//! materialized, one per segment afterwards).
//!
//! Step statuses move through:
//!
//! ```text
//! pending ──started──▶ in-progress ──finished──▶ awaiting-feedback
//!                                                    │ approved
//!                                                    ▼
//!                                                complete
//!                                                    │ rejected
//!                                                    ▼
//!                                              needs-revision
//! ```
//!
//! All mutating operations return a new plan; callers racing against plan
//! replacement therefore never observe a half-applied transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::script::ScriptSegment;

use super::intent::{infer_intent, PlanIntent};

// ---------------------------------------------------------------------------
// StepType
// ---------------------------------------------------------------------------

/// The four kinds of plan work, serialised in snake_case as `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Collect the user's goal and archetype preference.
    GatherContext,
    /// Ask the script provider for the session's narration segments.
    GenerateScript,
    /// Narrate one segment of the session.
    PlaySegment,
    /// Close the session out.
    WrapUp,
}

impl StepType {
    /// The snake_case wire label for this step type.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::GatherContext => "gather_context",
            StepType::GenerateScript => "generate_script",
            StepType::PlaySegment => "play_segment",
            StepType::WrapUp => "wrap_up",
        }
    }
}

// ---------------------------------------------------------------------------
// StepStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of one plan step, serialised in kebab-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    /// Not started yet.
    Pending,
    /// Currently being worked on.
    InProgress,
    /// Finished, waiting on the reviewer's feedback decision.
    AwaitingFeedback,
    /// Done and approved.
    Complete,
    /// The reviewer rejected the result; the step needs another pass.
    NeedsRevision,
}

impl StepStatus {
    /// The kebab-case wire label for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in-progress",
            StepStatus::AwaitingFeedback => "awaiting-feedback",
            StepStatus::Complete => "complete",
            StepStatus::NeedsRevision => "needs-revision",
        }
    }
}

impl Default for StepStatus {
    fn default() -> Self {
        StepStatus::Pending
    }
}

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

/// What the user asked for: a goal and an archetype (ego state) preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    /// Free-text goal, e.g. `"release the stress from today"`.
    pub goal: String,
    /// Archetype the narration should speak as, e.g. `"sage"`.
    pub ego_state: String,
}

impl SessionContext {
    pub fn new(goal: impl Into<String>, ego_state: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            ego_state: ego_state.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// PlanStep
// ---------------------------------------------------------------------------

/// One unit of plan work, owned by exactly one [`SessionPlan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    /// Stable identifier; materialized `play_segment` steps derive theirs
    /// from the segment id (see [`play_step_id`]).
    pub id: String,
    /// Which of the four step kinds this is.
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Short human-readable title.
    pub title: String,
    /// Current lifecycle status.
    pub status: StepStatus,
    /// Optional free-text detail (reviewer notes land here).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Structured attachments (segment links, reviewer adjustments).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    /// Dense zero-based position, re-issued whenever steps are replaced.
    ///
    /// Do not cache across plan mutations.
    pub index: usize,
}

impl PlanStep {
    fn new(step_type: StepType, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            step_type,
            title: title.into(),
            status: StepStatus::Pending,
            details: None,
            data: Map::new(),
            index: 0,
        }
    }
}

/// Derive the plan-step id for a materialized segment.
///
/// Deterministic so that re-materializing the same segments reproduces the
/// same step ids, which is what makes [`SessionPlan::materialize_segments`]
/// idempotent.
pub fn play_step_id(segment_id: &str) -> String {
    format!("play-{segment_id}")
}

// ---------------------------------------------------------------------------
// StepPatch
// ---------------------------------------------------------------------------

/// Optional extras applied alongside a status transition.
///
/// `details` replaces the step's details; `data` entries are merged key-wise
/// into the step's existing data map.
#[derive(Debug, Clone, Default)]
pub struct StepPatch {
    pub details: Option<String>,
    pub data: Option<Map<String, Value>>,
}

// ---------------------------------------------------------------------------
// StepFeedback
// ---------------------------------------------------------------------------

/// Ephemeral reviewer decision about one finished step.
///
/// Consumed once by the status transition it triggers; feedback for a step
/// that is not awaiting feedback is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFeedback {
    pub step_id: String,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustments: Option<Map<String, Value>>,
}

impl StepFeedback {
    /// The synthesized approval used when the reviewer cannot be reached.
    pub fn auto_approved(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            approved: true,
            notes: None,
            reason: Some(reason.into()),
            adjustments: None,
        }
    }
}

// ---------------------------------------------------------------------------
// PlanOptions
// ---------------------------------------------------------------------------

/// Extras for [`SessionPlan::from_context`] when building a revision.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Id of the plan this one supersedes.
    pub revision_of: Option<String>,
    /// Free-text feedback that motivated the revision; recorded in the new
    /// plan's metadata.
    pub feedback: Option<String>,
}

// ---------------------------------------------------------------------------
// SessionPlan
// ---------------------------------------------------------------------------

/// The ordered set of steps describing how a session will proceed.
///
/// One active instance per session.  Mutated only through the transition
/// methods below, all of which return a new plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPlan {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub intent: PlanIntent,
    /// Human-readable plan summary; reviewer notes may be appended.
    pub summary: String,
    /// True until the plan has been confirmed (heuristically or by the
    /// reviewer).
    pub needs_confirmation: bool,
    /// Id of the plan this one supersedes, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_of: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Execution order; `index` fields always mirror positions here.
    pub steps: Vec<PlanStep>,
}

impl SessionPlan {
    /// Build a fresh plan from a session context.
    ///
    /// Infers the intent from goal/archetype keywords and lays out the four
    /// canonical steps, all `pending`, with a single placeholder
    /// `play_segment` step standing in until the script is materialized.
    /// The plan starts with `needs_confirmation = true`.
    pub fn from_context(context: &SessionContext, options: PlanOptions) -> Self {
        let intent = infer_intent(&context.goal, &context.ego_state);

        let mut metadata = Map::new();
        metadata.insert("goal".into(), Value::String(context.goal.clone()));
        metadata.insert("egoState".into(), Value::String(context.ego_state.clone()));
        if let Some(feedback) = options.feedback {
            metadata.insert("revisionNotes".into(), Value::String(feedback));
        }

        let mut gather = PlanStep::new(StepType::GatherContext, "Gather context");
        gather.details = Some(format!(
            "Goal: {}. Ego state: {}.",
            context.goal, context.ego_state
        ));

        let mut steps = vec![
            gather,
            PlanStep::new(StepType::GenerateScript, "Generate script"),
            PlanStep::new(StepType::PlaySegment, "Guided narration"),
            PlanStep::new(StepType::WrapUp, "Wrap up"),
        ];
        re_index(&mut steps);

        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            intent,
            summary: format!("Guided {} session: {}", intent.as_str(), context.goal),
            needs_confirmation: true,
            revision_of: options.revision_of,
            metadata,
            steps,
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Replace all `play_segment` steps with one step per supplied segment,
    /// at the position of the first replaced step, and re-index the list.
    ///
    /// Steps whose derived id matches an existing step keep that step's
    /// status, details and data, so calling this twice with the same
    /// segments yields an identical plan.
    pub fn materialize_segments(&self, segments: &[ScriptSegment]) -> SessionPlan {
        let mut steps: Vec<PlanStep> = Vec::with_capacity(self.steps.len() + segments.len());
        let mut inserted = false;

        for step in &self.steps {
            if step.step_type == StepType::PlaySegment {
                if !inserted {
                    inserted = true;
                    steps.extend(self.play_steps_for(segments));
                }
                // old play steps are dropped
            } else {
                steps.push(step.clone());
            }
        }

        // No play step present (already materialized to zero segments):
        // insert in front of wrap-up.
        if !inserted {
            let pos = steps
                .iter()
                .position(|s| s.step_type == StepType::WrapUp)
                .unwrap_or(steps.len());
            steps.splice(pos..pos, self.play_steps_for(segments));
        }

        re_index(&mut steps);
        SessionPlan {
            steps,
            ..self.clone()
        }
    }

    fn play_steps_for(&self, segments: &[ScriptSegment]) -> Vec<PlanStep> {
        segments
            .iter()
            .enumerate()
            .map(|(n, seg)| {
                let id = play_step_id(&seg.id);
                if let Some(existing) = self.step(&id) {
                    existing.clone()
                } else {
                    let mut data = Map::new();
                    data.insert("segmentId".into(), Value::String(seg.id.clone()));
                    PlanStep {
                        id,
                        step_type: StepType::PlaySegment,
                        title: format!("Segment {}", n + 1),
                        status: StepStatus::Pending,
                        details: None,
                        data,
                        index: 0,
                    }
                }
            })
            .collect()
    }

    /// Return a new plan with exactly one step's status (and optional patch)
    /// replaced.
    ///
    /// An unknown `step_id` is a no-op returning an unchanged clone, never an
    /// error: callers race against plan replacement and a transition for a
    /// step that no longer exists simply has nothing to apply to.
    pub fn with_step_status(
        &self,
        step_id: &str,
        status: StepStatus,
        patch: StepPatch,
    ) -> SessionPlan {
        let mut plan = self.clone();
        match plan.steps.iter_mut().find(|s| s.id == step_id) {
            Some(step) => {
                step.status = status;
                if let Some(details) = patch.details {
                    step.details = Some(details);
                }
                if let Some(data) = patch.data {
                    for (key, value) in data {
                        step.data.insert(key, value);
                    }
                }
            }
            None => {
                log::debug!("plan: no step {step_id} in plan {}, transition dropped", plan.id);
            }
        }
        plan
    }

    /// Clear the confirmation requirement.
    pub fn with_confirmation_cleared(&self) -> SessionPlan {
        let mut plan = self.clone();
        plan.needs_confirmation = false;
        plan
    }

    /// Append a reviewer note to the plan summary.
    pub fn with_summary_note(&self, note: &str) -> SessionPlan {
        let mut plan = self.clone();
        plan.summary = format!("{} — {}", plan.summary, note);
        plan
    }

    /// Insert or replace one metadata entry.
    pub fn with_metadata(&self, key: impl Into<String>, value: Value) -> SessionPlan {
        let mut plan = self.clone();
        plan.metadata.insert(key.into(), value);
        plan
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Look up a step by id.
    pub fn step(&self, step_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// First step of the given type, in execution order.
    pub fn step_of_type(&self, step_type: StepType) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.step_type == step_type)
    }

    /// The step currently awaiting feedback, if any.
    ///
    /// When several are awaiting at once (reviewer backlog), the latest in
    /// execution order is reported.
    pub fn awaiting_feedback_step(&self) -> Option<&PlanStep> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::AwaitingFeedback)
            .last()
    }

    /// Number of `play_segment` steps.
    pub fn play_step_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.step_type == StepType::PlaySegment)
            .count()
    }

    /// True iff at least one `play_segment` step exists and every one is
    /// `complete`.  A plan with zero segment steps is never considered done.
    pub fn all_segment_steps_complete(&self) -> bool {
        let mut any = false;
        for step in &self.steps {
            if step.step_type == StepType::PlaySegment {
                any = true;
                if step.status != StepStatus::Complete {
                    return false;
                }
            }
        }
        any
    }
}

fn re_index(steps: &mut [PlanStep]) {
    for (i, step) in steps.iter_mut().enumerate() {
        step.index = i;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
