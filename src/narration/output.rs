//! Narration playback.
//!
//! [`NarrationOutput`] is the seam between the session engine and the thing
//! that actually occupies time speaking a segment.  `play` runs for the
//! piece's duration and reports how playback ended; `pause`, `resume` and
//! `stop` are immediate control signals that the in-flight `play` obeys.
//!
//! [`PacedSpeechOutput`] is the headless implementation: it "speaks" by
//! pacing through the segment's estimated duration in small slices, which is
//! also exactly the fallback-speech behaviour when no audio handle exists.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use super::synthesizer::AudioHandle;

/// Granularity at which an in-flight playback re-checks its control signal.
const TICK: Duration = Duration::from_millis(25);

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

/// How a playback ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Ran to the end of the piece.
    Completed,
    /// Cut short by a stop signal.
    Stopped,
    /// The output itself failed mid-piece.
    Failed(String),
}

/// Everything an output needs to narrate one segment.
#[derive(Debug, Clone)]
pub struct NarrationPiece {
    pub segment_id: String,
    pub text: String,
    /// Synthesized audio when available; absent means paced fallback speech.
    pub audio: Option<AudioHandle>,
    /// How long the narration should occupy.
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// NarrationOutput trait
// ---------------------------------------------------------------------------

/// A playback device.
///
/// `play` futures are spawned by the engine; the control methods are called
/// from the engine's command loop, so a `pause` issued before a spawned
/// `play` begins still takes effect (the play observes the paused control
/// signal on its first tick).
#[async_trait]
pub trait NarrationOutput: Send + Sync {
    /// Narrate one piece to completion, interruption or failure.
    async fn play(&self, piece: NarrationPiece) -> PlaybackOutcome;

    /// Freeze the in-flight playback without losing its position.
    fn pause(&self);

    /// Continue a paused playback (also clears a previous stop).
    fn resume(&self);

    /// Abort the in-flight playback; it reports [`PlaybackOutcome::Stopped`].
    fn stop(&self);
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn NarrationOutput>) {}
};

// ---------------------------------------------------------------------------
// PacedSpeechOutput
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputControl {
    Running,
    Paused,
    Stopped,
}

/// Headless output that paces through each piece's duration.
///
/// Playback obeys the shared control signal: the signal starts `Running`,
/// and `resume` clears both pauses and stops.  Callers that stop a piece
/// should `resume` before playing the next one, which is what the session
/// engine's start sequence does.
pub struct PacedSpeechOutput {
    control: watch::Sender<OutputControl>,
}

impl PacedSpeechOutput {
    pub fn new() -> Self {
        let (control, _) = watch::channel(OutputControl::Running);
        Self { control }
    }
}

impl Default for PacedSpeechOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NarrationOutput for PacedSpeechOutput {
    async fn play(&self, piece: NarrationPiece) -> PlaybackOutcome {
        let mut rx = self.control.subscribe();

        let mode = if piece.audio.is_some() { "audio" } else { "speech" };
        log::info!(
            "output: {mode} for segment '{}' ({:.1}s)",
            piece.segment_id,
            piece.duration.as_secs_f32()
        );

        let mut remaining = piece.duration;
        while remaining > Duration::ZERO {
            // Copy the control state out before awaiting.
            let state = *rx.borrow();
            match state {
                OutputControl::Stopped => return PlaybackOutcome::Stopped,
                OutputControl::Paused => {
                    if rx.changed().await.is_err() {
                        return PlaybackOutcome::Stopped;
                    }
                }
                OutputControl::Running => {
                    let slice = remaining.min(TICK);
                    tokio::time::sleep(slice).await;
                    remaining = remaining.saturating_sub(slice);
                }
            }
        }

        PlaybackOutcome::Completed
    }

    fn pause(&self) {
        self.control.send_replace(OutputControl::Paused);
    }

    fn resume(&self) {
        self.control.send_replace(OutputControl::Running);
    }

    fn stop(&self) {
        self.control.send_replace(OutputControl::Stopped);
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockNarrationOutput;


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
