//! Session lifecycle events.
//!
//! One broadcast channel per session.  Emitting with no subscribers is
//! fine; slow subscribers drop the oldest events rather than blocking the
//! engine.

use tokio::sync::broadcast;

use crate::plan::{PlanStep, SessionPlan};

use super::state::SessionState;

/// Default capacity of the event channel, per subscriber.
const DEFAULT_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// Everything observable about a running session, as a typed event.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Playback began or resumed.
    Play,
    /// Playback paused.
    Pause,
    /// The session finished its last segment or was skipped past the end.
    End,
    /// A segment's synthesized audio became available for playback.
    AudioElement { segment_id: String },
    /// A fresh plan is waiting for confirmation.
    PlanConfirmationNeeded(SessionPlan),
    /// A finished step is waiting for a feedback decision.
    FeedbackRequired(PlanStep),
    /// The observable snapshot changed.
    StateChange(SessionState),
}

impl SessionEvent {
    /// Stable event label, for logs and host-side wiring.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Play => "play",
            SessionEvent::Pause => "pause",
            SessionEvent::End => "end",
            SessionEvent::AudioElement { .. } => "audio-element",
            SessionEvent::PlanConfirmationNeeded(_) => "plan-confirmation-needed",
            SessionEvent::FeedbackRequired(_) => "feedback-required",
            SessionEvent::StateChange(_) => "state-change",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Fan-out for [`SessionEvent`]s.
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Broadcast an event.  Having no subscribers is not an error.
    pub fn emit(&self, event: SessionEvent) {
        log::trace!("session: event '{}'", event.kind());
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
