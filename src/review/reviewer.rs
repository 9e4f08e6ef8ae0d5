//! Plan reviewer: the remote quality check over plans and finished steps.
//!
//! Review is advisory.  Callers must treat every [`ReviewError`] as "carry
//! on without the reviewer": plan confirmation stands on its heuristic
//! bump, and step feedback degrades to approval (see
//! [`super::protocol::ReviewProtocol`]).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::ReviewerConfig;
use crate::plan::{PlanStep, SessionPlan, StepStatus};

use super::prompt::ReviewPromptBuilder;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("review request failed: {0}")]
    Request(String),

    #[error("review request timed out")]
    Timeout,

    #[error("failed to parse review response: {0}")]
    Parse(String),

    #[error("reviewer is disabled")]
    Disabled,
}

impl From<reqwest::Error> for ReviewError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ReviewError::Timeout
        } else {
            ReviewError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Review payloads
// ---------------------------------------------------------------------------

/// One status change the reviewer wants applied to a plan step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTransition {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

/// The reviewer's verdict over a whole plan.
///
/// Transitions are a subset: steps not mentioned keep their current status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReview {
    #[serde(default)]
    pub confirm: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_notes: Option<String>,
    #[serde(default)]
    pub step_transitions: Vec<StepTransition>,
}

/// The reviewer's verdict over one finished step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReview {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustments: Option<Map<String, Value>>,
}

// ---------------------------------------------------------------------------
// PlanReviewer trait
// ---------------------------------------------------------------------------

/// Anything that can review plans and step results.
#[async_trait]
pub trait PlanReviewer: Send + Sync {
    async fn review_plan(&self, plan: &SessionPlan) -> Result<PlanReview, ReviewError>;

    async fn review_step(&self, step: &PlanStep) -> Result<StepReview, ReviewError>;

    fn name(&self) -> &'static str;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn PlanReviewer>) {}
};

// ---------------------------------------------------------------------------
// ApiReviewer
// ---------------------------------------------------------------------------

/// Remote LLM-backed reviewer speaking JSON over HTTP.
///
/// Both modes POST to `{base_url}/v1/review` with a `mode` discriminator and
/// the prompt pair from [`ReviewPromptBuilder`].
pub struct ApiReviewer {
    client: reqwest::Client,
    enabled: bool,
    base_url: String,
    api_key: String,
    model: String,
}

impl ApiReviewer {
    pub fn from_config(config: &ReviewerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            enabled: config.enabled,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
        }
    }

    async fn post(&self, body: Value) -> Result<reqwest::Response, ReviewError> {
        let url = format!("{}/v1/review", self.base_url);
        let mut request = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        Ok(request.send().await?.error_for_status()?)
    }
}

#[async_trait]
impl PlanReviewer for ApiReviewer {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn review_plan(&self, plan: &SessionPlan) -> Result<PlanReview, ReviewError> {
        if !self.enabled {
            return Err(ReviewError::Disabled);
        }
        let (system, user) = ReviewPromptBuilder::build_plan_review(plan);
        let response = self
            .post(serde_json::json!({
                "mode": "plan-review",
                "model": self.model,
                "systemPrompt": system,
                "userPrompt": user,
                "plan": plan,
            }))
            .await?;

        response
            .json::<PlanReview>()
            .await
            .map_err(|e| ReviewError::Parse(e.to_string()))
    }

    async fn review_step(&self, step: &PlanStep) -> Result<StepReview, ReviewError> {
        if !self.enabled {
            return Err(ReviewError::Disabled);
        }
        let (system, user) = ReviewPromptBuilder::build_step_feedback(step);
        let response = self
            .post(serde_json::json!({
                "mode": "step-feedback",
                "model": self.model,
                "systemPrompt": system,
                "userPrompt": user,
                "step": step,
            }))
            .await?;

        response
            .json::<StepReview>()
            .await
            .map_err(|e| ReviewError::Parse(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockReviewer;


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_review_parses_with_all_fields_missing() {
        let review: PlanReview = serde_json::from_str("{}").unwrap();
        assert!(review.confirm.is_none());
        assert!(review.plan_notes.is_none());
        assert!(review.step_transitions.is_empty());
    }

    #[test]
    fn plan_review_parses_subset_transitions() {
        let review: PlanReview = serde_json::from_str(
            r#"{
                "confirm": true,
                "planNotes": "good fit",
                "stepTransitions": [
                    {"stepId": "abc", "status": "needs-revision", "notes": "too long"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(review.confirm, Some(true));
        assert_eq!(review.step_transitions.len(), 1);
        assert_eq!(review.step_transitions[0].status, StepStatus::NeedsRevision);
        assert_eq!(review.step_transitions[0].notes.as_deref(), Some("too long"));
    }

    #[test]
    fn step_review_requires_the_approved_field() {
        assert!(serde_json::from_str::<StepReview>("{}").is_err());

        let review: StepReview =
            serde_json::from_str(r#"{"approved": false, "reason": "pace"}"#).unwrap();
        assert!(!review.approved);
        assert_eq!(review.reason.as_deref(), Some("pace"));
    }

    #[tokio::test]
    async fn disabled_reviewer_errors_without_calling_out() {
        let config = ReviewerConfig {
            enabled: false,
            ..Default::default()
        };
        let reviewer = ApiReviewer::from_config(&config);

        let plan = SessionPlan::from_context(
            &crate::plan::SessionContext::new("calm", "sage"),
            crate::plan::PlanOptions::default(),
        );
        assert!(matches!(
            reviewer.review_plan(&plan).await,
            Err(ReviewError::Disabled)
        ));
        let step = plan.steps[0].clone();
        assert!(matches!(
            reviewer.review_step(&step).await,
            Err(ReviewError::Disabled)
        ));
    }

    #[tokio::test]
    async fn mock_consumes_scripted_responses_in_order() {
        let reviewer = MockReviewer::failing();
        reviewer.push_plan_ok(PlanReview {
            confirm: Some(true),
            ..Default::default()
        });

        let plan = SessionPlan::from_context(
            &crate::plan::SessionContext::new("calm", "sage"),
            crate::plan::PlanOptions::default(),
        );

        assert!(reviewer.review_plan(&plan).await.is_ok());
        assert!(reviewer.review_plan(&plan).await.is_err());
        assert_eq!(reviewer.plan_calls(), 2);
    }
}
