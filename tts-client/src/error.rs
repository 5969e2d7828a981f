use thiserror::Error;

#[derive(Error, Debug)]
pub enum TtsError {
    #[error(
        "API key not found for {provider}. Set {env_var} environment variable or add to config."
    )]
    MissingApiKey { provider: String, env_var: String },

    #[error("API error{}: {message}", status_code.map(|c| format!(" (HTTP {})", c)).unwrap_or_default())]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Backend returned success without an audio reference")]
    MissingReference,

    #[error("Invalid audio reference: {0:?}")]
    InvalidReference(String),

    #[error("Text is empty; nothing to synthesize")]
    EmptyText,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, TtsError>;
