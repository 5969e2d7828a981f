//! narrate - chunked speech synthesis into one continuous audiobook
//!
//! Long text is split into bounded chunks at sentence boundaries, each chunk
//! is synthesized by an injected [`tts_client::SpeechSynthesizer`], the
//! resulting assets are fetched and decoded, and the buffers are joined in
//! reading order with fixed pauses before a single export.

pub mod audio;
pub mod config;
pub mod pipeline;
pub mod text;

pub use audio::{AudioBuffer, format_duration};
pub use config::NarrateConfig;
pub use pipeline::{
    AssembledAudiobook, Pipeline, PipelineError, PipelineFailure, PipelineOptions, Progress,
    ProgressObserver, Stage,
};
pub use text::TextChunk;
