//! Session segments: script text joined with its narration resolution.

use crate::narration::{NarrationPiece, ResolvedNarration};
use crate::plan::play_step_id;
use crate::script::{ScriptSegment, SessionScript};

/// One playable unit of the session.
///
/// Built from the script at materialization time; `narration` stays `None`
/// until the prefetcher resolves it (successfully or as fallback speech).
#[derive(Debug, Clone)]
pub struct SessionSegment {
    pub script: ScriptSegment,
    /// Id of the plan step tracking this segment.
    pub step_id: String,
    pub narration: Option<ResolvedNarration>,
}

impl SessionSegment {
    /// Turn a script into the session's segment list, linking each segment
    /// to the plan step it will report progress through.
    pub fn from_script(script: &SessionScript) -> Vec<SessionSegment> {
        script
            .segments
            .iter()
            .map(|seg| SessionSegment {
                script: seg.clone(),
                step_id: play_step_id(&seg.id),
                narration: None,
            })
            .collect()
    }

    pub fn is_resolved(&self) -> bool {
        self.narration.is_some()
    }

    /// Build the playback piece for this segment.
    pub fn narration_piece(&self, chars_per_sec: f32) -> NarrationPiece {
        NarrationPiece {
            segment_id: self.script.id.clone(),
            text: self.script.text.clone(),
            audio: self.narration.as_ref().and_then(|n| n.audio.clone()),
            duration: self.script.approx_duration(chars_per_sec),
        }
    }
}
