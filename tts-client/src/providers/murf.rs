//! Murf AI text-to-speech provider
//!
//! `POST /v1/speech/generate` returns a JSON body carrying a URL to the
//! rendered audio; the audio itself is fetched separately.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsError};
use crate::provider::{AudioReference, SpeechSynthesizer, SynthesisRequest, Voice};

const DEFAULT_BASE_URL: &str = "https://api.murf.ai";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider for the Murf speech API
pub struct MurfProvider {
    base_url: String,
    api_key: String,
    client: Client,
}

impl MurfProvider {
    /// Create a new Murf provider
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(TtsError::MissingApiKey {
                provider: "Murf".to_string(),
                env_var: "MURF_API_KEY".to_string(),
            });
        }

        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            client: build_client(DEFAULT_TIMEOUT)?,
        })
    }

    /// Point the provider at a different API host
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Replace the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TtsError::Request(format!("Failed to create HTTP client: {}", e)))
}

// Murf API request/response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    voice_id: &'a str,
    text: &'a str,
    format: String,
    quality: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    audio_file: Option<String>,
    #[serde(default)]
    audio_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoiceEntry {
    voice_id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    locale: Option<String>,
    #[serde(default)]
    gender: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VoicesResponse {
    List(Vec<VoiceEntry>),
    Wrapped { voices: Vec<VoiceEntry> },
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(alias = "errorMessage")]
    message: String,
}

/// Pick the audio location out of a generate response
fn reference_from(response: GenerateResponse) -> Result<AudioReference> {
    let raw = response
        .audio_file
        .filter(|s| !s.trim().is_empty())
        .or(response.audio_url)
        .ok_or(TtsError::MissingReference)?;
    AudioReference::parse(raw)
}

async fn api_error(response: reqwest::Response) -> TtsError {
    let status = response.status();
    let error_text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorResponse>(&error_text) {
        Ok(error_response) => error_response.message,
        Err(_) => error_text,
    };
    TtsError::ApiError {
        message,
        status_code: Some(status.as_u16()),
    }
}

#[async_trait]
impl SpeechSynthesizer for MurfProvider {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioReference> {
        if request.text.trim().is_empty() {
            return Err(TtsError::EmptyText);
        }

        let body = GenerateRequest {
            voice_id: &request.voice_id,
            text: &request.text,
            format: request.format.to_uppercase(),
            quality: "high",
        };

        debug!(
            "murf generate: voice={} chars={}",
            request.voice_id,
            request.text.chars().count()
        );

        let response = self
            .client
            .post(self.url("/v1/speech/generate"))
            .header("api-key", &self.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| TtsError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let generated: GenerateResponse =
            response.json().await.map_err(|e| TtsError::ApiError {
                message: format!("Failed to parse response: {}", e),
                status_code: None,
            })?;

        reference_from(generated)
    }

    async fn list_voices(&self) -> Result<Vec<Voice>> {
        let response = self
            .client
            .get(self.url("/v1/speech/voices"))
            .header("api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| TtsError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let voices: VoicesResponse = response.json().await.map_err(|e| TtsError::ApiError {
            message: format!("Failed to parse voices: {}", e),
            status_code: None,
        })?;

        let entries = match voices {
            VoicesResponse::List(entries) => entries,
            VoicesResponse::Wrapped { voices } => voices,
        };

        Ok(entries
            .into_iter()
            .map(|v| Voice {
                voice_id: v.voice_id,
                display_name: v.display_name,
                locale: v.locale,
                gender: v.gender,
            })
            .collect())
    }

    async fn check_status(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("/v1/speech/voices"))
            .header("api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| TtsError::Request(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(api_error(response).await)
        }
    }

    fn name(&self) -> &'static str {
        "Murf"
    }
}
