//! Text processing for TTS: cleanup and bounded chunking.

pub mod chunker;
pub mod cleaner;

pub use chunker::split;
pub use cleaner::{CleanOptions, clean_text, prepare_for_tts};

/// A bounded segment of source text; the unit of synthesis.
///
/// Chunks are produced by [`split`] with dense ordinals `0..n` and are never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    index: usize,
    text: String,
    len: usize,
}

impl TextChunk {
    /// Create a new text chunk.
    pub(crate) fn new(index: usize, text: String) -> Self {
        let len = text.chars().count();
        Self { index, text, len }
    }

    /// Position of this chunk in reading order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Rough wall-clock estimate, in minutes, for narrating `text_len` characters
/// split into `chunk_count` synthesis calls.
///
/// Assumes one character reads in a tenth of a second, plus half a minute of
/// round-trip overhead per chunk.
pub fn estimate_processing_minutes(text_len: usize, chunk_count: usize) -> f64 {
    let audio_minutes = text_len as f64 * 0.1 / 60.0;
    let overhead = chunk_count as f64 * 0.5;
    audio_minutes + overhead
}
