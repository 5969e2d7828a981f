use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Result, TtsError};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider used when none is requested explicitly
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Provider-specific configuration
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "murf".to_string()
}

/// Provider-specific configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key (optional, can use env var instead)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Custom base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home =
            std::env::var("HOME").map_err(|_| TtsError::ConfigError("HOME not set".into()))?;
        Ok(PathBuf::from(home).join(".config/cli-programs/tts.toml"))
    }

    /// Get provider config by provider name
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.providers.get(provider)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            providers: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_provider, "murf");
        assert!(config.get_provider_config("murf").is_none());
    }

    #[test]
    fn test_parse_provider_section() {
        let toml_str = r#"
default_provider = "murf"

[providers.murf]
api_key = "secret"
base_url = "https://murf.example.com"
timeout_secs = 10
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let murf = config.get_provider_config("murf").unwrap();
        assert_eq!(murf.api_key.as_deref(), Some("secret"));
        assert_eq!(murf.base_url.as_deref(), Some("https://murf.example.com"));
        assert_eq!(murf.timeout_secs, Some(10));
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.providers.insert(
            "murf".to_string(),
            ProviderConfig {
                api_key: None,
                base_url: Some("http://localhost:9000".to_string()),
                timeout_secs: None,
            },
        );
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(!toml_str.contains("api_key"));
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(
            parsed.get_provider_config("murf").unwrap().base_url.as_deref(),
            Some("http://localhost:9000")
        );
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path().unwrap();
        assert!(
            path.to_string_lossy()
                .contains(".config/cli-programs/tts.toml")
        );
    }
}
