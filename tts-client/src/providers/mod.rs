//! Speech synthesis provider implementations

pub mod mock;
mod murf;

pub use mock::MockSynthesizer;
pub use murf::MurfProvider;

use std::time::Duration;

use crate::config::Config;
use crate::error::{Result, TtsError};
use crate::provider::SpeechSynthesizer;

/// Supported provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Murf,
}

impl ProviderKind {
    /// Parse provider kind from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "murf" | "murf-ai" | "murf_ai" => Ok(Self::Murf),
            _ => Err(TtsError::ConfigError(format!("Unknown provider: {}", s))),
        }
    }

    /// Config key used for this provider's section
    pub fn config_key(&self) -> &'static str {
        match self {
            Self::Murf => "murf",
        }
    }

    /// Get the environment variable name for this provider's API key
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Murf => "MURF_API_KEY",
        }
    }
}

/// Create a provider handle from configuration.
///
/// The caller owns the returned handle and passes it to whatever needs it.
pub fn get_provider(kind: ProviderKind, config: &Config) -> Result<Box<dyn SpeechSynthesizer>> {
    let provider_config = config.get_provider_config(kind.config_key());

    match kind {
        ProviderKind::Murf => {
            let api_key = get_api_key(provider_config.and_then(|c| c.api_key.clone()), kind)?;
            let mut provider = MurfProvider::new(api_key)?;
            if let Some(base_url) = provider_config.and_then(|c| c.base_url.as_deref()) {
                provider = provider.with_base_url(base_url);
            }
            if let Some(secs) = provider_config.and_then(|c| c.timeout_secs) {
                provider = provider.with_timeout(Duration::from_secs(secs))?;
            }
            Ok(Box::new(provider))
        }
    }
}

/// Get API key from config or environment variable
fn get_api_key(configured: Option<String>, kind: ProviderKind) -> Result<String> {
    if let Some(key) = configured.filter(|k| !k.trim().is_empty()) {
        return Ok(key);
    }

    std::env::var(kind.env_var())
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| TtsError::MissingApiKey {
            provider: format!("{:?}", kind),
            env_var: kind.env_var().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!(ProviderKind::from_str("murf").unwrap(), ProviderKind::Murf);
        assert_eq!(ProviderKind::from_str("Murf-AI").unwrap(), ProviderKind::Murf);
        assert!(ProviderKind::from_str("elevenlabs").is_err());
    }

    #[test]
    fn test_configured_key_wins() {
        let key = get_api_key(Some("from-config".to_string()), ProviderKind::Murf).unwrap();
        assert_eq!(key, "from-config");
    }

    #[test]
    fn test_provider_from_config() {
        let mut config = Config::default();
        config.providers.insert(
            "murf".to_string(),
            crate::config::ProviderConfig {
                api_key: Some("test-key".to_string()),
                base_url: Some("http://localhost:1".to_string()),
                timeout_secs: Some(5),
            },
        );
        let provider = get_provider(ProviderKind::Murf, &config).unwrap();
        assert_eq!(provider.name(), "Murf");
    }
}
