//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// ScriptConfig
// ---------------------------------------------------------------------------

/// Settings for the remote script generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Base URL of the script service.
    pub base_url: String,
    /// API key — `None` for local / unauthenticated deployments.
    pub api_key: Option<String>,
    /// Maximum seconds to wait for a generated script before timing out.
    pub timeout_secs: u64,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8787".into(),
            api_key: None,
            timeout_secs: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// SynthConfig
// ---------------------------------------------------------------------------

/// Settings for the remote narration synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthConfig {
    /// Base URL of the synthesis service.
    pub base_url: String,
    /// API key — `None` for local / unauthenticated deployments.
    pub api_key: Option<String>,
    /// Synthesis model identifier sent to the service.
    pub model: String,
    /// Default voice used when a segment carries no `voice` hint.
    pub voice_id: String,
    /// Maximum seconds to wait for one segment's narration audio.
    pub timeout_secs: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8787".into(),
            api_key: None,
            model: "tts-standard".into(),
            voice_id: "warm-guide".into(),
            timeout_secs: 15,
        }
    }
}

// ---------------------------------------------------------------------------
// ReviewerConfig
// ---------------------------------------------------------------------------

/// Settings for the remote plan reviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerConfig {
    /// Whether reviewer checkpoints call out at all.  When `false` every
    /// checkpoint resolves with the local fallback decision.
    pub enabled: bool,
    /// Base URL of the reviewer service.
    pub base_url: String,
    /// API key — `None` for local / unauthenticated deployments.
    pub api_key: Option<String>,
    /// Model identifier forwarded to the reviewer backend.
    pub model: String,
    /// Maximum seconds to wait for a reviewer decision.
    pub timeout_secs: u64,
}

impl Default for ReviewerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:8787".into(),
            api_key: None,
            model: "gpt-4o-mini".into(),
            timeout_secs: 12,
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// Tuning knobs for the segment playback pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// How many segments past the current one are synthesized ahead of time.
    pub lookahead_depth: usize,
    /// Pause in milliseconds between one segment ending and the next starting.
    pub settle_delay_ms: u64,
    /// Speaking rate used to estimate narration length when a segment carries
    /// no `approxSec` hint (characters per second).
    pub speech_chars_per_sec: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            lookahead_depth: 2,
            settle_delay_ms: 750,
            speech_chars_per_sec: 14.0,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionDefaults
// ---------------------------------------------------------------------------

/// Default session context used when the caller supplies none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDefaults {
    /// Goal text fed to intent inference (e.g. `"unwind before sleep"`).
    pub goal: String,
    /// Archetype / ego-state preference (e.g. `"sage"`, `"warrior"`).
    pub ego_state: String,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            goal: "find a moment of calm".into(),
            ego_state: "sage".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use guided_session::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Script generation service settings.
    pub script: ScriptConfig,
    /// Narration synthesizer settings.
    pub synth: SynthConfig,
    /// Plan reviewer settings.
    pub reviewer: ReviewerConfig,
    /// Playback pipeline tuning.
    pub playback: PlaybackConfig,
    /// Default session context for the demo binary.
    pub session: SessionDefaults,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            script: ScriptConfig::default(),
            synth: SynthConfig::default(),
            reviewer: ReviewerConfig::default(),
            playback: PlaybackConfig::default(),
            session: SessionDefaults::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
