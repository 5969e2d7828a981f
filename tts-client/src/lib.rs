//! Speech synthesis client library for the narrate workspace
//!
//! Models a synthesis backend purely as the capability
//! `synthesize(text, voice) -> reference`. Providers:
//! - Murf (HTTP API)
//! - Mock (scripted, for tests)

pub mod config;
pub mod error;
pub mod provider;
pub mod providers;

pub use config::{Config, ProviderConfig};
pub use error::{Result, TtsError};
pub use provider::{AudioReference, SpeechSynthesizer, SynthesisRequest, Voice};
pub use providers::{MockSynthesizer, MurfProvider, ProviderKind, get_provider};
