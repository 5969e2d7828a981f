//! Pipeline failure types.

use std::time::Duration;

use thiserror::Error;
use tts_client::TtsError;

use super::{Progress, Stage};
use crate::audio::{AssemblyError, FetchError};

/// Cause of a failed run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no text to narrate")]
    NoText,

    #[error("synthesis failed: {0}")]
    Synthesis(#[from] TtsError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("run cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Terminal failure of a run: where it happened, why, and the last progress
/// tuple delivered before it.
#[derive(Debug, Error)]
#[error("{stage} failed{}: {cause}", chunk_index.map(|i| format!(" at chunk {}", i)).unwrap_or_default())]
pub struct PipelineFailure {
    pub stage: Stage,
    pub chunk_index: Option<usize>,
    #[source]
    pub cause: PipelineError,
    pub last_progress: Option<Progress>,
}
