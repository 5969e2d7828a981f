//! Audio retrieval, assembly, and export.

pub mod assembler;
pub mod buffer;
pub mod duration;
pub mod effects;
pub mod fetcher;

pub use assembler::{AssemblyError, AudioAssembler, OutputFormat};
pub use buffer::AudioBuffer;
pub use duration::format_duration;
pub use fetcher::{AudioCodec, AudioFetcher, FetchError};
