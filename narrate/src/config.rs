//! narrate configuration management.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::assembler::validate_bitrate;
use crate::audio::{AudioCodec, OutputFormat};
use crate::pipeline::PipelineOptions;
use crate::text::chunker::DEFAULT_MAX_CHUNK_LEN;

const DEFAULT_VOICE: &str = "en-US-William";
const DEFAULT_PAUSE_MS: u64 = 500;
const DEFAULT_BITRATE: &str = "192k";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SAMPLE_RATE: u32 = 24000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrateConfig {
    /// Maximum chunk length in characters
    #[serde(default = "default_max_chunk_len")]
    pub max_chunk_len: usize,

    /// Synthesis voice
    #[serde(default = "default_voice_id")]
    pub voice_id: String,

    /// Silence between consecutive chunks
    #[serde(default = "default_pause_duration_ms")]
    pub pause_duration_ms: u64,

    /// Container of the exported audiobook
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Export bitrate, e.g. "192k"
    #[serde(default = "default_bitrate")]
    pub bitrate: String,

    /// Encoding the synthesis backend delivers
    #[serde(default)]
    pub codec: AudioCodec,

    /// Sample rate all chunk audio is normalized to
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_timeout_secs")]
    pub synthesis_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Chunks processed at once; 1 runs strictly in sequence
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// OCR substitutions during cleanup (lossy)
    #[serde(default)]
    pub ocr_fixes: bool,

    /// Peak-normalize the assembled audio
    #[serde(default)]
    pub normalize: bool,

    #[serde(default)]
    pub fade_in_ms: u64,

    #[serde(default)]
    pub fade_out_ms: u64,

    /// ffmpeg binary; searched on PATH when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,
}

fn default_max_chunk_len() -> usize {
    DEFAULT_MAX_CHUNK_LEN
}

fn default_voice_id() -> String {
    DEFAULT_VOICE.to_string()
}

fn default_pause_duration_ms() -> u64 {
    DEFAULT_PAUSE_MS
}

fn default_bitrate() -> String {
    DEFAULT_BITRATE.to_string()
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_concurrency() -> usize {
    1
}

impl Default for NarrateConfig {
    fn default() -> Self {
        Self {
            max_chunk_len: default_max_chunk_len(),
            voice_id: default_voice_id(),
            pause_duration_ms: default_pause_duration_ms(),
            output_format: OutputFormat::default(),
            bitrate: default_bitrate(),
            codec: AudioCodec::default(),
            sample_rate: default_sample_rate(),
            synthesis_timeout_secs: default_timeout_secs(),
            fetch_timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            ocr_fixes: false,
            normalize: false,
            fade_in_ms: 0,
            fade_out_ms: 0,
            ffmpeg_path: None,
        }
    }
}

impl NarrateConfig {
    /// Get the config file path: ~/.config/cli-programs/narrate.toml
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("cli-programs")
            .join("narrate.toml"))
    }

    /// Load config from file, returning default if file doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: NarrateConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_len == 0 {
            bail!("max_chunk_len must be positive");
        }
        if self.concurrency == 0 {
            bail!("concurrency must be positive");
        }
        if self.sample_rate == 0 {
            bail!("sample_rate must be positive");
        }
        if self.voice_id.trim().is_empty() {
            bail!("voice_id must not be empty");
        }
        validate_bitrate(&self.bitrate)?;
        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            pause_ms: self.pause_duration_ms,
            output_format: self.output_format,
            bitrate: self.bitrate.clone(),
            synthesis_timeout: Duration::from_secs(self.synthesis_timeout_secs),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            normalize: self.normalize,
            fade_in_ms: self.fade_in_ms,
            fade_out_ms: self.fade_out_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NarrateConfig::default();
        assert_eq!(config.max_chunk_len, 3000);
        assert_eq!(config.voice_id, "en-US-William");
        assert_eq!(config.pause_duration_ms, 500);
        assert_eq!(config.output_format, OutputFormat::Mp3);
        assert_eq!(config.bitrate, "192k");
        assert_eq!(config.concurrency, 1);
        assert!(!config.ocr_fixes);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_path() {
        let path = NarrateConfig::config_path().unwrap();
        assert!(path.ends_with("cli-programs/narrate.toml"));
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
max_chunk_len = 1500
voice_id = "en-US-Sarah"
pause_duration_ms = 250
output_format = "wav"
bitrate = "128k"
codec = "wav"
concurrency = 4
ocr_fixes = true
"#;
        let config: NarrateConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_chunk_len, 1500);
        assert_eq!(config.voice_id, "en-US-Sarah");
        assert_eq!(config.pause_duration_ms, 250);
        assert_eq!(config.output_format, OutputFormat::Wav);
        assert_eq!(config.bitrate, "128k");
        assert_eq!(config.codec, AudioCodec::Wav);
        assert_eq!(config.concurrency, 4);
        assert!(config.ocr_fixes);
    }

    #[test]
    fn test_parse_empty_config() {
        let config: NarrateConfig = toml::from_str("").unwrap();
        assert_eq!(config.max_chunk_len, 3000);
        assert_eq!(config.sample_rate, 24000);
        assert_eq!(config.fetch_timeout_secs, 30);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = NarrateConfig::default();
        config.max_chunk_len = 0;
        assert!(config.validate().is_err());

        let mut config = NarrateConfig::default();
        config.bitrate = "fast".to_string();
        assert!(config.validate().is_err());

        let mut config = NarrateConfig::default();
        config.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pipeline_options() {
        let mut config = NarrateConfig::default();
        config.pause_duration_ms = 750;
        config.fetch_timeout_secs = 5;
        let options = config.pipeline_options();
        assert_eq!(options.pause_ms, 750);
        assert_eq!(options.fetch_timeout, Duration::from_secs(5));
        assert_eq!(options.bitrate, "192k");
    }
}
