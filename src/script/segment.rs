//! Script data model: the narration text a session speaks.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fallback speech rate used when a configured rate is unusable.
const DEFAULT_CHARS_PER_SEC: f32 = 14.0;

/// Shortest duration ever derived from text length.
const MIN_DERIVED_SECS: f32 = 0.5;

// ---------------------------------------------------------------------------
// ScriptSegment
// ---------------------------------------------------------------------------

/// One narrated block of a session script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptSegment {
    pub id: String,
    /// The narration text to synthesize and speak.
    pub text: String,
    /// Author-estimated spoken duration in seconds, when the provider
    /// supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approx_sec: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sfx: Option<String>,
}

impl ScriptSegment {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            approx_sec: None,
            mood: None,
            voice: None,
            sfx: None,
        }
    }

    pub fn with_approx_sec(mut self, secs: f32) -> Self {
        self.approx_sec = Some(secs);
        self
    }

    /// Playback duration estimate.
    ///
    /// Prefers the author's `approx_sec`; otherwise derives one from the
    /// text length at `chars_per_sec`, floored so even a one-word segment
    /// occupies a noticeable moment.
    pub fn approx_duration(&self, chars_per_sec: f32) -> Duration {
        let secs = match self.approx_sec {
            Some(s) if s > 0.0 => s,
            _ => {
                let cps = if chars_per_sec > 0.0 {
                    chars_per_sec
                } else {
                    DEFAULT_CHARS_PER_SEC
                };
                (self.text.chars().count() as f32 / cps).max(MIN_DERIVED_SECS)
            }
        };
        Duration::from_secs_f32(secs)
    }
}

// ---------------------------------------------------------------------------
// SessionScript
// ---------------------------------------------------------------------------

/// An ordered list of segments plus presentation metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionScript {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub segments: Vec<ScriptSegment>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl SessionScript {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
