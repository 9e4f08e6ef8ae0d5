//! Narration: best-effort synthesis plus always-available playback.
//!
//! Segment text is sent to the remote synthesizer ahead of playback; when
//! that fails the segment degrades to paced on-device speech rather than
//! blocking the session.  Playback itself runs through the
//! [`NarrationOutput`] seam.

pub mod output;
pub mod synthesizer;

pub use output::{NarrationOutput, NarrationPiece, PacedSpeechOutput, PlaybackOutcome};
pub use synthesizer::{
    ApiSynthesizer, AudioHandle, NarrationProvider, NarrationSynthesizer, ResolvedNarration,
    SynthError, SynthesisRequest,
};

#[cfg(test)]
pub use output::MockNarrationOutput;
#[cfg(test)]
pub use synthesizer::MockSynthesizer;
