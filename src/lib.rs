//! Guided-session orchestration engine.
//!
//! Turns a user's stated goal and archetype preference into a confirmed,
//! reviewed, narrated session:
//!
//! 1. [`plan`] builds a four-step [`plan::SessionPlan`] from the context and
//!    tracks every status transition.
//! 2. [`script`] fetches the narration script, degrading through canned and
//!    emergency fallbacks so a session always has something to say.
//! 3. [`narration`] synthesizes audio ahead of playback and speaks segments
//!    through the [`narration::NarrationOutput`] seam, falling back to paced
//!    on-device speech when synthesis is unavailable.
//! 4. [`review`] confirms plans and judges finished steps via a remote
//!    reviewer that is advisory by construction: its failures never block.
//! 5. [`session`] wires it all into one engine task per session, exposing a
//!    command handle, a state snapshot and a lifecycle event stream.
//!
//! See [`session::SessionEngine::spawn`] for the entry point.

pub mod config;
pub mod narration;
pub mod plan;
pub mod review;
pub mod script;
pub mod session;
