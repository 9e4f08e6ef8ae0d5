//! Observable session state.
//!
//! The engine owns the truth; after every mutation it writes a fresh
//! [`SessionState`] snapshot into the [`SharedState`] handle and broadcasts
//! it as a `state-change` event.  Callers poll or subscribe; they never
//! mutate the snapshot.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::narration::NarrationProvider;
use crate::plan::SessionPlan;

// ---------------------------------------------------------------------------
// PlayState
// ---------------------------------------------------------------------------

/// Coarse playback state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
}

impl Default for PlayState {
    fn default() -> Self {
        PlayState::Stopped
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Per-segment slice of the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentSnapshot {
    pub id: String,
    /// Id of the plan step tracking this segment.
    pub step_id: String,
    /// True once narration resolution finished, even as fallback speech.
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<NarrationProvider>,
}

/// Full observable snapshot of one session.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub play_state: PlayState,
    pub current_segment_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_segment_id: Option<String>,
    pub total_segments: usize,
    /// Resolved segments strictly after the current one.
    pub buffered_ahead: usize,
    /// True once the script is materialized into segments.
    pub is_initialized: bool,
    pub awaiting_plan_confirmation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awaiting_feedback_for_step_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub segments: Vec<SegmentSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<SessionPlan>,
}

/// Shared snapshot handle.
///
/// Cheap to clone (`Arc` clone).  Lock with `.lock().unwrap()` for a short
/// critical section; the engine replaces the whole value, so holders never
/// see a half-written snapshot.
pub type SharedState = Arc<Mutex<SessionState>>;

pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(SessionState::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_stopped_and_uninitialized() {
        let state = SessionState::default();
        assert_eq!(state.play_state, PlayState::Stopped);
        assert!(!state.is_initialized);
        assert_eq!(state.total_segments, 0);
        assert!(state.plan.is_none());
    }

    #[test]
    fn shared_state_replaces_whole_snapshots() {
        let shared = new_shared_state();
        let observer = Arc::clone(&shared);

        {
            let mut state = shared.lock().unwrap();
            state.is_initialized = true;
            state.total_segments = 4;
        }

        let seen = observer.lock().unwrap().clone();
        assert!(seen.is_initialized);
        assert_eq!(seen.total_segments, 4);
    }

    #[test]
    fn snapshot_serialises_camel_case() {
        let state = SessionState {
            play_state: PlayState::Playing,
            current_segment_index: 1,
            total_segments: 3,
            is_initialized: true,
            ..Default::default()
        };

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["playState"], "playing");
        assert_eq!(json["currentSegmentIndex"], 1);
        assert_eq!(json["totalSegments"], 3);
        assert_eq!(json["bufferedAhead"], 0);
        assert!(json.get("error").is_none());
    }
}
