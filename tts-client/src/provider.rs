use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsError};

/// Request to synthesize one piece of text
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    /// Container the backend should produce (e.g. "mp3", "wav")
    pub format: String,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: voice_id.into(),
            format: "mp3".to_string(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }
}

/// Opaque, later-fetchable location of a synthesized audio asset.
///
/// Construction rejects blank references, so a successful synthesis always
/// carries something a fetcher can act on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AudioReference(String);

impl AudioReference {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TtsError::MissingReference);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(TtsError::InvalidReference(raw));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AudioReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A voice offered by a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

/// Capability that turns text into a fetchable audio asset.
///
/// Any backend (network API, local model) satisfying this contract is
/// interchangeable from the pipeline's point of view.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize one request, returning where the audio can be fetched
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioReference>;

    /// List voices offered by the backend
    async fn list_voices(&self) -> Result<Vec<Voice>> {
        Ok(Vec::new())
    }

    /// Check that the backend is reachable and credentials are accepted
    async fn check_status(&self) -> Result<()> {
        Ok(())
    }

    /// Get the provider name for display
    fn name(&self) -> &'static str;
}
