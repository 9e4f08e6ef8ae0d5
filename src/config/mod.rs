//! Configuration module for the guided-session engine.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each external
//! service and the playback pipeline, `AppPaths` for cross-platform config
//! directories, and TOML persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, PlaybackConfig, ReviewerConfig, ScriptConfig, SessionDefaults, SynthConfig,
};
