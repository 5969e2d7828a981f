//! Execution strategies for per-chunk synthesis and fetch.
//!
//! Every strategy returns buffers indexed by chunk ordinal: position `i` of
//! the result always holds the audio for chunk `i`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream;
use log::{debug, info};
use tts_client::{SpeechSynthesizer, SynthesisRequest};

use super::error::{PipelineError, PipelineFailure};
use super::{CancelHandle, Progress, ProgressTracker, Stage};
use crate::audio::{AudioBuffer, AudioFetcher};
use crate::text::TextChunk;

/// Everything needed to turn one chunk into audio.
pub struct ChunkContext<'a> {
    pub(crate) synthesizer: &'a dyn SpeechSynthesizer,
    pub(crate) fetcher: &'a AudioFetcher,
    pub(crate) voice_id: &'a str,
    pub(crate) synthesis_timeout: Duration,
    pub(crate) fetch_timeout: Duration,
    pub(crate) tracker: &'a ProgressTracker<'a>,
    pub(crate) cancel: &'a CancelHandle,
    pub(crate) total: usize,
}

impl ChunkContext<'_> {
    /// Synthesize then fetch one chunk.
    ///
    /// Cancellation is checked before each stage; an operation already in
    /// flight runs to completion or to its own timeout.
    pub async fn process(&self, chunk: &TextChunk) -> Result<AudioBuffer, PipelineFailure> {
        let index = chunk.index();

        self.enter(Stage::Synthesizing, index)?;
        let request = SynthesisRequest::new(chunk.text(), self.voice_id)
            .with_format(self.fetcher.codec().as_str());
        let reference = tokio::time::timeout(
            self.synthesis_timeout,
            self.synthesizer.synthesize(&request),
        )
        .await
        .map_err(|_| {
            self.fail(
                Stage::Synthesizing,
                index,
                PipelineError::Timeout(self.synthesis_timeout),
            )
        })?
        .map_err(|e| self.fail(Stage::Synthesizing, index, e.into()))?;

        debug!("chunk {} synthesized: {}", index, reference);

        self.enter(Stage::Fetching, index)?;
        let buffer = self
            .fetcher
            .fetch(&reference, self.fetch_timeout)
            .await
            .map_err(|e| self.fail(Stage::Fetching, index, e.into()))?;

        info!(
            "Chunk {}/{} ready ({:.1}s of audio)",
            index + 1,
            self.total,
            buffer.duration_secs()
        );
        Ok(buffer)
    }

    fn enter(&self, stage: Stage, index: usize) -> Result<(), PipelineFailure> {
        if self.cancel.is_cancelled() {
            return Err(self.fail(stage, index, PipelineError::Cancelled));
        }
        self.tracker.report(Progress::new(index, self.total, stage));
        Ok(())
    }

    fn fail(&self, stage: Stage, index: usize, cause: PipelineError) -> PipelineFailure {
        self.tracker.failure(stage, Some(index), cause)
    }
}

/// How chunk work is scheduled.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    /// Process all chunks, returning one buffer per chunk in chunk order.
    ///
    /// The first chunk failure aborts the run.
    async fn execute(
        &self,
        chunks: &[TextChunk],
        ctx: &ChunkContext<'_>,
    ) -> Result<Vec<AudioBuffer>, PipelineFailure>;

    /// Strategy name for display
    fn name(&self) -> &'static str;
}

/// One chunk at a time; chunk `i + 1` starts only after chunk `i` is fetched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

#[async_trait]
impl ExecutionStrategy for Sequential {
    async fn execute(
        &self,
        chunks: &[TextChunk],
        ctx: &ChunkContext<'_>,
    ) -> Result<Vec<AudioBuffer>, PipelineFailure> {
        let mut buffers = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            buffers.push(ctx.process(chunk).await?);
        }
        Ok(buffers)
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}

/// Up to `max_in_flight` chunks processed concurrently.
///
/// Results land in a slot vector sized to the chunk count, each slot written
/// once by its own chunk; nothing is returned until every slot is filled.
#[derive(Debug, Clone, Copy)]
pub struct BoundedParallel {
    max_in_flight: usize,
}

impl BoundedParallel {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }
}

#[async_trait]
impl ExecutionStrategy for BoundedParallel {
    async fn execute(
        &self,
        chunks: &[TextChunk],
        ctx: &ChunkContext<'_>,
    ) -> Result<Vec<AudioBuffer>, PipelineFailure> {
        let mut slots: Vec<Option<AudioBuffer>> = (0..chunks.len()).map(|_| None).collect();

        let mut pending: Vec<BoxFuture<'_, (usize, Result<AudioBuffer, PipelineFailure>)>> =
            Vec::with_capacity(chunks.len());
        for (slot, chunk) in chunks.iter().enumerate() {
            pending.push(Box::pin(async move { (slot, ctx.process(chunk).await) }));
        }

        let mut results = stream::iter(pending).buffer_unordered(self.max_in_flight);

        // Dropping the stream on error abandons whatever is still in flight
        while let Some((slot, result)) = results.next().await {
            slots[slot] = Some(result?);
        }
        drop(results);

        slots
            .into_iter()
            .zip(chunks)
            .map(|(slot, chunk)| {
                slot.ok_or_else(|| {
                    ctx.tracker.failure(
                        Stage::Fetching,
                        Some(chunk.index()),
                        PipelineError::Internal("chunk produced no audio".to_string()),
                    )
                })
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "parallel"
    }
}

/// Pick a strategy from a concurrency limit: 1 means sequential.
pub fn strategy_for(concurrency: usize) -> Box<dyn ExecutionStrategy> {
    if concurrency <= 1 {
        Box::new(Sequential)
    } else {
        Box::new(BoundedParallel::new(concurrency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_for() {
        assert_eq!(strategy_for(0).name(), "sequential");
        assert_eq!(strategy_for(1).name(), "sequential");
        assert_eq!(strategy_for(4).name(), "parallel");
    }

    #[test]
    fn test_parallel_limit_at_least_one() {
        assert_eq!(BoundedParallel::new(0).max_in_flight(), 1);
        assert_eq!(BoundedParallel::new(3).max_in_flight(), 3);
    }
}
