//! Session orchestration: one engine task per guided session.
//!
//! [`SessionEngine`] owns the plan, the segment list and playback state;
//! every mutation goes through its command queue.  Callers hold a
//! [`SessionHandle`], poll [`SessionState`] snapshots and subscribe to
//! [`SessionEvent`]s.

pub mod engine;
pub mod events;
pub mod segment;
pub mod state;

pub use engine::{SessionCommand, SessionEngine, SessionHandle, SessionProviders};
pub use events::{EventBus, SessionEvent};
pub use segment::SessionSegment;
pub use state::{new_shared_state, PlayState, SegmentSnapshot, SessionState, SharedState};
