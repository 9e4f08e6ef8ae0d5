//! Script providers: where session scripts come from.
//!
//! [`ScriptProvider`] is the seam between the session engine and whatever
//! produces narration scripts.  The production implementation is
//! [`ApiScriptProvider`] (a remote HTTP service); the fallback chain in
//! [`super::fallback`] wraps it so script acquisition can always succeed.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ScriptConfig;
use crate::plan::SessionContext;

use super::segment::SessionScript;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script request failed: {0}")]
    Request(String),

    #[error("script request timed out")]
    Timeout,

    #[error("failed to parse script response: {0}")]
    Parse(String),

    #[error("script provider returned no segments")]
    EmptyScript,
}

impl From<reqwest::Error> for ScriptError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ScriptError::Timeout
        } else {
            ScriptError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptProvider trait
// ---------------------------------------------------------------------------

/// Anything that can turn a session context into a script.
#[async_trait]
pub trait ScriptProvider: Send + Sync {
    /// Produce a script for the given context.
    async fn generate(&self, context: &SessionContext) -> Result<SessionScript, ScriptError>;

    /// Short label used in logs and fallback diagnostics.
    fn name(&self) -> &'static str;
}

// Compile-time check that the trait stays object-safe (it is held as
// `Arc<dyn ScriptProvider>` throughout).
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn ScriptProvider>) {}
};

// ---------------------------------------------------------------------------
// ApiScriptProvider
// ---------------------------------------------------------------------------

/// Remote script service speaking JSON over HTTP.
///
/// POSTs the session context to `{base_url}/v1/script` and expects a
/// [`SessionScript`] back.  An empty segment list is treated as an error so
/// the fallback chain moves on instead of starting a silent session.
pub struct ApiScriptProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ApiScriptProvider {
    pub fn from_config(config: &ScriptConfig) -> Self {
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
impl ScriptProvider for ApiScriptProvider {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn generate(&self, context: &SessionContext) -> Result<SessionScript, ScriptError> {
        let url = format!("{}/v1/script", self.base_url);

        let mut request = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "context": context }));
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await?.error_for_status()?;
        let script: SessionScript = response
            .json()
            .await
            .map_err(|e| ScriptError::Parse(e.to_string()))?;

        if script.segments.is_empty() {
            return Err(ScriptError::EmptyScript);
        }
        Ok(script)
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockScriptProvider;


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
