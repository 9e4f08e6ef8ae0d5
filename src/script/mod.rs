//! Script acquisition: remote generation with graceful degradation.
//!
//! A [`SessionScript`] is an ordered list of [`ScriptSegment`]s.  Scripts
//! normally come from the remote [`ApiScriptProvider`]; the
//! [`FallbackScriptProvider`] chain guarantees that *some* script is always
//! available, down to a built-in [`emergency_script`].

pub mod fallback;
pub mod provider;
pub mod segment;

pub use fallback::{
    emergency_script, CannedScriptProvider, EmergencyScriptProvider, FallbackScriptProvider,
};
pub use provider::{ApiScriptProvider, ScriptError, ScriptProvider};
pub use segment::{ScriptSegment, SessionScript};

#[cfg(test)]
pub use provider::MockScriptProvider;
