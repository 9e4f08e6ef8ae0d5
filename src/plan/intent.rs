//! Keyword-based intent inference for session goals.
//!
//! [`infer_intent`] scans the user's stated goal (and then their archetype
//! preference) for intent-specific keywords and returns the matching
//! [`PlanIntent`].  The first matching keyword wins; text that matches
//! nothing falls back to [`PlanIntent::GeneralSupport`].

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PlanIntent
// ---------------------------------------------------------------------------

/// Closed set of inferred session goals.
///
/// Serialised in kebab-case (`"habit-change"`, `"general-support"`) to match
/// the reviewer wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanIntent {
    /// Falling asleep, staying asleep, winding down at night.
    Sleep,
    /// Anxiety relief, stress release, general relaxation.
    Calm,
    /// Concentration, deep work, cutting through distraction.
    Focus,
    /// Self-esteem, assertiveness, inner confidence.
    Confidence,
    /// Breaking or building a habit (smoking, procrastination, cravings).
    HabitChange,
    /// Default when no specific intent is recognised.
    GeneralSupport,
}

impl PlanIntent {
    /// The kebab-case wire label for this intent.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanIntent::Sleep => "sleep",
            PlanIntent::Calm => "calm",
            PlanIntent::Focus => "focus",
            PlanIntent::Confidence => "confidence",
            PlanIntent::HabitChange => "habit-change",
            PlanIntent::GeneralSupport => "general-support",
        }
    }
}

impl Default for PlanIntent {
    fn default() -> Self {
        PlanIntent::GeneralSupport
    }
}

impl std::fmt::Display for PlanIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Static intent definitions
// ---------------------------------------------------------------------------

struct IntentRule {
    intent: PlanIntent,
    keywords: &'static [&'static str],
}

/// Checked in order; the first rule with a matching keyword wins.
static INTENT_RULES: &[IntentRule] = &[
    IntentRule {
        intent: PlanIntent::Sleep,
        keywords: &["sleep", "insomnia", "bedtime", "drowsy", "asleep"],
    },
    IntentRule {
        intent: PlanIntent::Calm,
        keywords: &[
            "calm", "anxiety", "anxious", "stress", "relax", "unwind", "tension", "overwhelm",
        ],
    },
    IntentRule {
        intent: PlanIntent::Focus,
        keywords: &["focus", "concentrat", "attention", "distract", "deep work"],
    },
    IntentRule {
        intent: PlanIntent::Confidence,
        keywords: &["confiden", "self-esteem", "self esteem", "assert", "self-worth"],
    },
    IntentRule {
        intent: PlanIntent::HabitChange,
        keywords: &["habit", "smoking", "quit", "procrastinat", "craving"],
    },
];

// ---------------------------------------------------------------------------
// infer_intent
// ---------------------------------------------------------------------------

/// Infer the session intent from the goal and archetype text.
///
/// The goal is scanned first, then the archetype; matching is lowercase
/// substring search so partial stems (`"concentrat"`) catch inflections.
///
/// # Example
/// ```rust
/// use guided_session::plan::{infer_intent, PlanIntent};
///
/// assert_eq!(infer_intent("help me focus on my thesis", "sage"), PlanIntent::Focus);
/// assert_eq!(infer_intent("just checking in", "sage"), PlanIntent::GeneralSupport);
/// ```
pub fn infer_intent(goal: &str, ego_state: &str) -> PlanIntent {
    let goal = goal.to_lowercase();
    let ego = ego_state.to_lowercase();

    for text in [goal.as_str(), ego.as_str()] {
        for rule in INTENT_RULES {
            if rule.keywords.iter().any(|kw| text.contains(kw)) {
                return rule.intent;
            }
        }
    }

    PlanIntent::GeneralSupport
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_sleep_intent() {
        assert_eq!(
            infer_intent("I can't fall asleep at night", "sage"),
            PlanIntent::Sleep
        );
    }

    #[test]
    fn detects_calm_intent() {
        assert_eq!(
            infer_intent("release the stress from today", "sage"),
            PlanIntent::Calm
        );
    }

    #[test]
    fn detects_focus_intent() {
        assert_eq!(infer_intent("focus", "sage"), PlanIntent::Focus);
    }

    #[test]
    fn detects_focus_from_stem() {
        assert_eq!(
            infer_intent("better concentration at work", "warrior"),
            PlanIntent::Focus
        );
    }

    #[test]
    fn detects_confidence_intent() {
        assert_eq!(
            infer_intent("feel more confident speaking up", "warrior"),
            PlanIntent::Confidence
        );
    }

    #[test]
    fn detects_habit_change_intent() {
        assert_eq!(
            infer_intent("quit smoking for good", "sage"),
            PlanIntent::HabitChange
        );
    }

    #[test]
    fn goal_is_scanned_before_ego_state() {
        // Goal mentions focus, archetype mentions calm — goal wins.
        assert_eq!(
            infer_intent("focus on the exam", "calm observer"),
            PlanIntent::Focus
        );
    }

    #[test]
    fn ego_state_is_used_when_goal_matches_nothing() {
        assert_eq!(
            infer_intent("have a good session", "calm observer"),
            PlanIntent::Calm
        );
    }

    #[test]
    fn falls_back_to_general_support() {
        assert_eq!(
            infer_intent("just checking things out", "sage"),
            PlanIntent::GeneralSupport
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(infer_intent("FOCUS on my WORK", "SAGE"), PlanIntent::Focus);
    }

    #[test]
    fn wire_labels_are_kebab_case() {
        assert_eq!(PlanIntent::HabitChange.as_str(), "habit-change");
        assert_eq!(PlanIntent::GeneralSupport.as_str(), "general-support");

        let json = serde_json::to_string(&PlanIntent::HabitChange).unwrap();
        assert_eq!(json, "\"habit-change\"");
    }
}
