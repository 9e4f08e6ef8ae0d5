//! Narration synthesis: turning segment text into playable audio.
//!
//! [`NarrationSynthesizer`] is the seam in front of the remote TTS service.
//! Synthesis is best-effort: when it fails, the segment is still narrated
//! via paced on-device speech ([`ResolvedNarration::fallback_speech`]), so a
//! session never stalls on audio.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SynthConfig;
use crate::script::ScriptSegment;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("narration request failed: {0}")]
    Request(String),

    #[error("narration request timed out")]
    Timeout,

    #[error("failed to parse narration response: {0}")]
    Parse(String),

    #[error("narration service returned no audio")]
    NoAudio,
}

impl From<reqwest::Error> for SynthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SynthError::Timeout
        } else {
            SynthError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

/// How a segment's narration is ultimately delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NarrationProvider {
    /// Synthesized audio from the remote service.
    Synth,
    /// Paced on-device speech; used whenever synthesis is unavailable.
    FallbackSpeech,
    /// No narration for this segment.
    None,
}

impl NarrationProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            NarrationProvider::Synth => "synth",
            NarrationProvider::FallbackSpeech => "fallback-speech",
            NarrationProvider::None => "none",
        }
    }
}

/// Reference to a playable piece of synthesized audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioHandle {
    pub url: String,
}

/// The outcome of resolving one segment's narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedNarration {
    pub provider: NarrationProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioHandle>,
}

impl ResolvedNarration {
    /// Successful remote synthesis.
    pub fn synthesized(url: impl Into<String>) -> Self {
        Self {
            provider: NarrationProvider::Synth,
            audio: Some(AudioHandle { url: url.into() }),
        }
    }

    /// The degraded path: speak the text on-device at a steady pace.
    pub fn fallback_speech() -> Self {
        Self {
            provider: NarrationProvider::FallbackSpeech,
            audio: None,
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// What gets sent to the synthesis service for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    pub model: String,
    /// Stable content hash; lets the service reuse previously rendered audio.
    pub cache_key: String,
}

impl SynthesisRequest {
    /// Build the request for a segment, honouring its per-segment voice
    /// override when present.
    pub fn for_segment(segment: &ScriptSegment, config: &SynthConfig) -> Self {
        let voice_id = segment
            .voice
            .clone()
            .unwrap_or_else(|| config.voice_id.clone());
        let model = config.model.clone();

        let mut hasher = DefaultHasher::new();
        segment.text.hash(&mut hasher);
        voice_id.hash(&mut hasher);
        model.hash(&mut hasher);

        Self {
            text: segment.text.clone(),
            voice_id,
            model,
            cache_key: format!("{:016x}", hasher.finish()),
        }
    }
}

// ---------------------------------------------------------------------------
// NarrationSynthesizer trait
// ---------------------------------------------------------------------------

/// Anything that can resolve a synthesis request into narration.
#[async_trait]
pub trait NarrationSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<ResolvedNarration, SynthError>;

    fn name(&self) -> &'static str;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn NarrationSynthesizer>) {}
};

// ---------------------------------------------------------------------------
// ApiSynthesizer
// ---------------------------------------------------------------------------

/// Remote TTS service speaking JSON over HTTP.
///
/// POSTs the request to `{base_url}/v1/narration`.  A `synth` response
/// without an audio URL is rejected so the caller degrades to fallback
/// speech instead of playing silence.
pub struct ApiSynthesizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthResponse {
    provider: NarrationProvider,
    #[serde(default)]
    audio_url: Option<String>,
}

impl ApiSynthesizer {
    pub fn from_config(config: &SynthConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl NarrationSynthesizer for ApiSynthesizer {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<ResolvedNarration, SynthError> {
        let url = format!("{}/v1/narration", self.base_url);

        let mut http = self.client.post(&url).json(request);
        if !self.api_key.is_empty() {
            http = http.bearer_auth(&self.api_key);
        }

        let response = http.send().await?.error_for_status()?;
        let body: SynthResponse = response
            .json()
            .await
            .map_err(|e| SynthError::Parse(e.to_string()))?;

        match body.provider {
            NarrationProvider::Synth => {
                let url = body.audio_url.ok_or(SynthError::NoAudio)?;
                Ok(ResolvedNarration::synthesized(url))
            }
            other => Ok(ResolvedNarration {
                provider: other,
                audio: None,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockSynthesizer;


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
