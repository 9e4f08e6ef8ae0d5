//! Graceful script degradation.
//!
//! [`FallbackScriptProvider`] walks a prioritized provider list until one
//! yields a usable script.  The default chain is remote, then canned (picked
//! by inferred intent), then a built-in emergency script, so a session can
//! always begin even with every network dependency down.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::plan::{infer_intent, PlanIntent, SessionContext};

use super::provider::{ScriptError, ScriptProvider};
use super::segment::{ScriptSegment, SessionScript};

// ---------------------------------------------------------------------------
// FallbackScriptProvider
// ---------------------------------------------------------------------------

/// Tries each provider in order; never fails.
pub struct FallbackScriptProvider {
    providers: Vec<Arc<dyn ScriptProvider>>,
}

impl FallbackScriptProvider {
    pub fn new(providers: Vec<Arc<dyn ScriptProvider>>) -> Self {
        Self { providers }
    }

    /// The production chain: remote service, canned library, emergency text.
    pub fn with_default_chain(remote: Arc<dyn ScriptProvider>) -> Self {
        Self::new(vec![
            remote,
            Arc::new(CannedScriptProvider::new()),
            Arc::new(EmergencyScriptProvider),
        ])
    }
}

#[async_trait]
impl ScriptProvider for FallbackScriptProvider {
    fn name(&self) -> &'static str {
        "fallback-chain"
    }

    async fn generate(&self, context: &SessionContext) -> Result<SessionScript, ScriptError> {
        for provider in &self.providers {
            match provider.generate(context).await {
                Ok(script) if !script.is_empty() => {
                    log::info!(
                        "script: provider '{}' produced {} segments",
                        provider.name(),
                        script.segments.len()
                    );
                    return Ok(script);
                }
                Ok(_) => {
                    log::warn!(
                        "script: provider '{}' returned an empty script, trying next",
                        provider.name()
                    );
                }
                Err(e) => {
                    log::warn!("script: provider '{}' failed ({e}), trying next", provider.name());
                }
            }
        }

        // Every provider failed (or the chain was empty).  The emergency
        // script is built inline, so the caller still gets a session.
        log::warn!("script: all providers exhausted, using the emergency script");
        Ok(emergency_script(context))
    }
}

// ---------------------------------------------------------------------------
// CannedScriptProvider
// ---------------------------------------------------------------------------

/// Offline script library keyed by the inferred plan intent.
pub struct CannedScriptProvider;

impl CannedScriptProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CannedScriptProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScriptProvider for CannedScriptProvider {
    fn name(&self) -> &'static str {
        "canned"
    }

    async fn generate(&self, context: &SessionContext) -> Result<SessionScript, ScriptError> {
        let intent = infer_intent(&context.goal, &context.ego_state);
        let segments = canned_texts(intent)
            .iter()
            .enumerate()
            .map(|(i, text)| ScriptSegment::new(format!("canned-{}", i + 1), *text))
            .collect();

        let mut script = SessionScript {
            title: format!("A {} session", intent.as_str()),
            segments,
            ..Default::default()
        };
        script
            .metadata
            .insert("source".into(), Value::String("canned".into()));
        Ok(script)
    }
}

fn canned_texts(intent: PlanIntent) -> &'static [&'static str] {
    match intent {
        PlanIntent::Sleep => &[
            "Lie back and let the bed take your full weight. There is nowhere \
             to go now, and nothing left to do tonight.",
            "Travel your attention slowly from your toes to the crown of your \
             head, letting each part grow heavy and warm as you pass it.",
            "Thoughts may drift by like slow clouds. Let each one pass without \
             following it, sinking a little deeper with every breath.",
            "Rest here, drifting, knowing that sleep will arrive on its own \
             time, and that resting like this is already enough.",
        ],
        PlanIntent::Calm => &[
            "Find a comfortable position and take one long breath in through \
             your nose, then let it go with a soft sigh.",
            "Feel the points where your body meets the chair or the floor. Let \
             them hold you; you do not need to hold yourself right now.",
            "With each exhale, imagine the tension leaving your jaw, your \
             shoulders, your hands. There is more room in your chest already.",
        ],
        PlanIntent::Focus => &[
            "Sit tall and let your breathing settle into an easy rhythm. The \
             next stretch of time belongs to a single thing.",
            "Picture the one task in front of you as a clear point of light. \
             Everything else dims around it, patient, able to wait.",
            "When your mind wanders, and it will, simply notice and return. \
             Each return is a repetition that strengthens your attention.",
        ],
        PlanIntent::Confidence => &[
            "Plant your feet, lengthen your spine, and take a slow, full \
             breath. Notice how much steadier you feel already.",
            "Recall a moment you handled something difficult well. Let the \
             feeling of that moment spread through your chest and shoulders.",
            "Carry that steadiness forward. You have done hard things before, \
             and you bring all of that with you now.",
        ],
        PlanIntent::HabitChange => &[
            "Settle in and bring to mind the habit you are changing, without \
             judgement. It is a pattern, and patterns can be redrawn.",
            "Picture the next moment of craving as a fork in a path. See \
             yourself pausing there, breathing once, and choosing the other way.",
            "Imagine yourself a month from now, already living the new \
             pattern. Notice how ordinary and solid it feels.",
        ],
        PlanIntent::GeneralSupport => &[
            "Arrive here fully. Let this time be a pause in the day that \
             belongs entirely to you.",
            "Follow your breath without changing it, in and out, letting each \
             cycle smooth the edges of whatever you carried in.",
            "Offer yourself the same kindness you would offer a good friend, \
             and let that be the tone for the rest of this session.",
        ],
    }
}

// ---------------------------------------------------------------------------
// Emergency script
// ---------------------------------------------------------------------------

/// Terminal provider wrapping [`emergency_script`]; cannot fail.
pub struct EmergencyScriptProvider;

#[async_trait]
impl ScriptProvider for EmergencyScriptProvider {
    fn name(&self) -> &'static str {
        "emergency"
    }

    async fn generate(&self, context: &SessionContext) -> Result<SessionScript, ScriptError> {
        Ok(emergency_script(context))
    }
}

/// Minimal built-in script used when every other source is unavailable.
pub fn emergency_script(context: &SessionContext) -> SessionScript {
    let goal = context.goal.trim();
    let focus_line = if goal.is_empty() {
        "what brought you here".to_string()
    } else {
        goal.to_string()
    };

    let mut script = SessionScript {
        title: "A quiet moment".into(),
        segments: vec![
            ScriptSegment::new(
                "emergency-1",
                format!(
                    "Settle into a comfortable position and let your eyes soften. \
                     For the next few minutes there is nothing to do but be here, \
                     with {focus_line}."
                ),
            ),
            ScriptSegment::new(
                "emergency-2",
                "Breathe in slowly through your nose, hold for a moment, and let \
                 the breath go. With every exhale, let your shoulders drop a \
                 little further.",
            ),
            ScriptSegment::new(
                "emergency-3",
                "When you are ready, bring a gentle attention back to the room, \
                 carrying this ease with you.",
            ),
        ],
        ..Default::default()
    };
    script
        .metadata
        .insert("source".into(), Value::String("emergency".into()));
    script
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
