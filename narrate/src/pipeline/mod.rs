//! Pipeline orchestration: segment, synthesize and fetch each chunk, then
//! assemble and export.
//!
//! A run moves through `Segmenting`, then `Synthesizing(i)` and `Fetching(i)`
//! for every chunk, then `Assembling` and `Done`. Any failure ends the run:
//! buffers fetched so far are dropped and no artifact is left on disk.

pub mod error;
pub mod executor;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info};
use tts_client::SpeechSynthesizer;

pub use error::{PipelineError, PipelineFailure};
pub use executor::{BoundedParallel, ChunkContext, ExecutionStrategy, Sequential, strategy_for};

use crate::audio::{AudioAssembler, AudioBuffer, AudioFetcher, OutputFormat, effects, format_duration};
use crate::text;

/// Pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Segmenting,
    Synthesizing,
    Fetching,
    Assembling,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Segmenting => "Segmenting",
            Self::Synthesizing => "Synthesizing",
            Self::Fetching => "Fetching",
            Self::Assembling => "Assembling",
            Self::Done => "Done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress tuple delivered after every state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub current_index: usize,
    pub total_chunks: usize,
    pub stage: Stage,
}

impl Progress {
    pub fn new(current_index: usize, total_chunks: usize, stage: Stage) -> Self {
        Self {
            current_index,
            total_chunks,
            stage,
        }
    }
}

/// Receives progress tuples. Implemented for closures.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &Progress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&Progress) + Send + Sync,
{
    fn on_progress(&self, progress: &Progress) {
        self(progress)
    }
}

/// Forwards progress to an observer and remembers the last tuple delivered.
pub struct ProgressTracker<'a> {
    observer: &'a dyn ProgressObserver,
    last: Mutex<Option<Progress>>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(observer: &'a dyn ProgressObserver) -> Self {
        Self {
            observer,
            last: Mutex::new(None),
        }
    }

    pub fn report(&self, progress: Progress) {
        debug!(
            "progress: {} {}/{}",
            progress.stage, progress.current_index, progress.total_chunks
        );
        self.observer.on_progress(&progress);
        if let Ok(mut last) = self.last.lock() {
            *last = Some(progress);
        }
    }

    pub fn last(&self) -> Option<Progress> {
        self.last.lock().ok().and_then(|last| *last)
    }

    /// Build a terminal failure carrying the last delivered progress.
    pub fn failure(
        &self,
        stage: Stage,
        chunk_index: Option<usize>,
        cause: PipelineError,
    ) -> PipelineFailure {
        PipelineFailure {
            stage,
            chunk_index,
            cause,
            last_progress: self.last(),
        }
    }
}

/// Cooperative cancellation flag, checked between chunk stages.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Knobs for a run that are not part of `run`'s arguments.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub pause_ms: u64,
    pub output_format: OutputFormat,
    pub bitrate: String,
    pub synthesis_timeout: Duration,
    pub fetch_timeout: Duration,
    pub normalize: bool,
    pub fade_in_ms: u64,
    pub fade_out_ms: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            pause_ms: 500,
            output_format: OutputFormat::Mp3,
            bitrate: "192k".to_string(),
            synthesis_timeout: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(30),
            normalize: false,
            fade_in_ms: 0,
            fade_out_ms: 0,
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct AssembledAudiobook {
    audio: AudioBuffer,
    path: PathBuf,
    chunk_count: usize,
}

impl AssembledAudiobook {
    pub fn audio(&self) -> &AudioBuffer {
        &self.audio
    }

    pub fn into_audio(self) -> AudioBuffer {
        self.audio
    }

    /// Where the artifact was exported.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn duration(&self) -> Duration {
        self.audio.duration()
    }

    pub fn duration_secs(&self) -> f64 {
        self.audio.duration_secs()
    }

    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration_secs() as u64)
    }
}

/// The chunked-synthesis orchestrator.
///
/// The synthesizer handle is owned by the caller and shared in; the pipeline
/// never constructs a backend itself.
pub struct Pipeline {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    fetcher: AudioFetcher,
    assembler: AudioAssembler,
    strategy: Box<dyn ExecutionStrategy>,
    options: PipelineOptions,
    cancel: CancelHandle,
}

impl Pipeline {
    /// Create a sequential pipeline assembling at the fetcher's sample rate.
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        fetcher: AudioFetcher,
        options: PipelineOptions,
    ) -> Self {
        let assembler = AudioAssembler::new(fetcher.sample_rate());
        Self {
            synthesizer,
            fetcher,
            assembler,
            strategy: Box::new(Sequential),
            options,
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn ExecutionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_assembler(mut self, assembler: AudioAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// Handle that cancels this pipeline's runs at the next stage boundary.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Narrate `text` into a single audio file at `output_path`.
    pub async fn run(
        &self,
        text: &str,
        max_chunk_len: usize,
        voice_id: &str,
        output_path: &Path,
        observer: &dyn ProgressObserver,
    ) -> Result<AssembledAudiobook, PipelineFailure> {
        let tracker = ProgressTracker::new(observer);

        tracker.report(Progress::new(0, 0, Stage::Segmenting));
        let chunks = text::split(text, max_chunk_len);
        if chunks.is_empty() {
            return Err(tracker.failure(Stage::Segmenting, None, PipelineError::NoText));
        }
        let total = chunks.len();
        info!(
            "Split {} characters into {} chunks (max {}), {} execution",
            text.chars().count(),
            total,
            max_chunk_len,
            self.strategy.name()
        );

        let ctx = ChunkContext {
            synthesizer: self.synthesizer.as_ref(),
            fetcher: &self.fetcher,
            voice_id,
            synthesis_timeout: self.options.synthesis_timeout,
            fetch_timeout: self.options.fetch_timeout,
            tracker: &tracker,
            cancel: &self.cancel,
            total,
        };
        let buffers = self.strategy.execute(&chunks, &ctx).await?;

        if self.cancel.is_cancelled() {
            return Err(tracker.failure(Stage::Assembling, None, PipelineError::Cancelled));
        }
        tracker.report(Progress::new(total, total, Stage::Assembling));

        let assembler = self.assembler.clone();
        let options = self.options.clone();
        let path = output_path.to_path_buf();
        let audio = tokio::task::spawn_blocking(move || {
            let mut audio = assembler.assemble(&buffers, options.pause_ms)?;
            drop(buffers);
            if options.normalize {
                audio = effects::normalize(audio);
            }
            if options.fade_in_ms > 0 || options.fade_out_ms > 0 {
                audio = effects::fade(audio, options.fade_in_ms, options.fade_out_ms);
            }
            assembler.export(&audio, &path, options.output_format, &options.bitrate)?;
            Ok::<_, crate::audio::AssemblyError>(audio)
        })
        .await
        .map_err(|e| {
            tracker.failure(
                Stage::Assembling,
                None,
                PipelineError::Internal(format!("assembly task failed: {}", e)),
            )
        })?
        .map_err(|e| tracker.failure(Stage::Assembling, None, e.into()))?;

        tracker.report(Progress::new(total, total, Stage::Done));
        info!(
            "Audiobook written to {} ({})",
            output_path.display(),
            format_duration(audio.duration_secs() as u64)
        );

        Ok(AssembledAudiobook {
            audio,
            path: output_path.to_path_buf(),
            chunk_count: total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioCodec;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;
    use tts_client::{AudioReference, MockSynthesizer, SynthesisRequest};

    const RATE: u32 = 1000;
    const TEXT: &str = "Alpha one. Bravo two. Charlie three.";

    /// Fixture level for a chunk, keyed on its first letter.
    fn level(text: &str) -> i16 {
        let first = text.bytes().next().unwrap_or(b'A');
        i16::from(first - b'A' + 1) * 1000
    }

    fn write_fixture(path: &Path, len: usize, value: i16) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..len {
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();
    }

    /// Renders each request as a constant-level WAV of ten samples per
    /// character and returns a `file://` reference to it.
    fn fixture_responder(
        dir: &Path,
    ) -> impl Fn(&SynthesisRequest) -> tts_client::Result<AudioReference> + Send + Sync + 'static
    {
        let dir = dir.to_path_buf();
        let counter = AtomicUsize::new(0);
        move |req: &SynthesisRequest| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let path = dir.join(format!("chunk-{}.wav", n));
            write_fixture(&path, req.text.chars().count() * 10, level(&req.text));
            AudioReference::parse(format!("file://{}", path.display()))
        }
    }

    fn fixture_synth(dir: &Path) -> MockSynthesizer {
        MockSynthesizer::from_fn(fixture_responder(dir))
    }

    fn options() -> PipelineOptions {
        PipelineOptions {
            pause_ms: 100,
            output_format: OutputFormat::Wav,
            ..PipelineOptions::default()
        }
    }

    fn pipeline(synth: Arc<MockSynthesizer>) -> Pipeline {
        let fetcher = AudioFetcher::new(AudioCodec::Wav, RATE).unwrap();
        Pipeline::new(synth, fetcher, options())
    }

    /// Distinct non-silent levels in playback order.
    fn segment_levels(audio: &AudioBuffer) -> Vec<f32> {
        let mut levels: Vec<f32> = Vec::new();
        for &s in audio.samples() {
            if s != 0.0 && levels.last() != Some(&s) {
                levels.push(s);
            }
        }
        levels
    }

    fn expected_levels(texts: &[&str]) -> Vec<f32> {
        texts
            .iter()
            .map(|t| f32::from(level(t)) / 32768.0)
            .collect()
    }

    fn recorder() -> (Arc<Mutex<Vec<Progress>>>, impl Fn(&Progress) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |p: &Progress| sink.lock().unwrap().push(*p))
    }

    #[tokio::test]
    async fn test_sequential_run_preserves_order_and_duration() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(fixture_synth(dir.path()));
        let output = dir.path().join("book.wav");
        let (seen, observer) = recorder();

        let book = pipeline(Arc::clone(&synth))
            .run(TEXT, 14, "en-US-William", &output, &observer)
            .await
            .unwrap();

        assert_eq!(book.chunk_count(), 3);
        assert!(output.exists());
        assert_eq!(book.path(), output.as_path());

        // 10 + 10 + 14 characters at 10 samples each, plus two 100 ms pauses
        assert_eq!(book.audio().len(), 340 + 2 * 100);
        assert_eq!(
            segment_levels(book.audio()),
            expected_levels(&["Alpha", "Bravo", "Charlie"])
        );
        assert_eq!(book.formatted_duration(), "0s");

        let seen = seen.lock().unwrap().clone();
        let expected = vec![
            Progress::new(0, 0, Stage::Segmenting),
            Progress::new(0, 3, Stage::Synthesizing),
            Progress::new(0, 3, Stage::Fetching),
            Progress::new(1, 3, Stage::Synthesizing),
            Progress::new(1, 3, Stage::Fetching),
            Progress::new(2, 3, Stage::Synthesizing),
            Progress::new(2, 3, Stage::Fetching),
            Progress::new(3, 3, Stage::Assembling),
            Progress::new(3, 3, Stage::Done),
        ];
        assert_eq!(seen, expected);
        assert_eq!(
            synth.texts(),
            vec!["Alpha one.", "Bravo two.", "Charlie three."]
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_without_output() {
        let dir = TempDir::new().unwrap();
        let render = fixture_responder(dir.path());
        let synth = Arc::new(MockSynthesizer::from_fn(move |req| {
            if req.text.starts_with("Bravo") {
                AudioReference::parse("file:///nonexistent/narrate/bravo.wav")
            } else {
                render(req)
            }
        }));
        let output = dir.path().join("book.wav");

        let failure = pipeline(Arc::clone(&synth))
            .run(TEXT, 14, "en-US-William", &output, &|_: &Progress| {})
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Fetching);
        assert_eq!(failure.chunk_index, Some(1));
        assert!(matches!(failure.cause, PipelineError::Fetch(_)));
        assert_eq!(
            failure.last_progress,
            Some(Progress::new(1, 3, Stage::Fetching))
        );
        assert!(!output.exists());
        // Chunk 2 was never started
        assert_eq!(synth.call_count(), 2);
    }

    #[tokio::test]
    async fn test_synthesis_failure_reports_stage_and_index() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(MockSynthesizer::always_fails(401));
        let output = dir.path().join("book.wav");

        let failure = pipeline(Arc::clone(&synth))
            .run(TEXT, 14, "en-US-William", &output, &|_: &Progress| {})
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Synthesizing);
        assert_eq!(failure.chunk_index, Some(0));
        assert!(matches!(failure.cause, PipelineError::Synthesis(_)));
        assert_eq!(synth.call_count(), 1);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_empty_text_fails_at_segmenting() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(fixture_synth(dir.path()));
        let output = dir.path().join("book.wav");

        let failure = pipeline(Arc::clone(&synth))
            .run("   \n ", 100, "v", &output, &|_: &Progress| {})
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Segmenting);
        assert_eq!(failure.chunk_index, None);
        assert!(matches!(failure.cause, PipelineError::NoText));
        assert_eq!(
            failure.last_progress,
            Some(Progress::new(0, 0, Stage::Segmenting))
        );
        assert_eq!(synth.call_count(), 0);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_single_chunk_has_no_pause() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(fixture_synth(dir.path()));
        let output = dir.path().join("book.wav");

        let book = pipeline(synth)
            .run("Alpha one.", 100, "v", &output, &|_: &Progress| {})
            .await
            .unwrap();

        assert_eq!(book.chunk_count(), 1);
        assert_eq!(book.audio().len(), 100);
    }

    #[tokio::test]
    async fn test_parallel_preserves_order_under_latency_variance() {
        let dir = TempDir::new().unwrap();
        // Earlier chunks are slower, so completion order is reversed
        let synth = Arc::new(fixture_synth(dir.path()).with_latency(|req| {
            Duration::from_millis(match req.text.as_bytes().first() {
                Some(b'A') => 60,
                Some(b'B') => 30,
                _ => 0,
            })
        }));
        let output = dir.path().join("book.wav");

        let book = pipeline(Arc::clone(&synth))
            .with_strategy(Box::new(BoundedParallel::new(3)))
            .run(TEXT, 14, "v", &output, &|_: &Progress| {})
            .await
            .unwrap();

        assert_eq!(
            segment_levels(book.audio()),
            expected_levels(&["Alpha", "Bravo", "Charlie"])
        );
        assert_eq!(book.audio().len(), 340 + 2 * 100);
        assert_eq!(synth.call_count(), 3);
    }

    #[tokio::test]
    async fn test_parallel_failure_aborts_run() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(MockSynthesizer::from_fn(|req| {
            if req.text.starts_with("Charlie") {
                Err(tts_client::TtsError::MissingReference)
            } else {
                AudioReference::parse("file:///nonexistent/narrate/ok.wav")
            }
        }));
        let output = dir.path().join("book.wav");

        let failure = pipeline(synth)
            .with_strategy(Box::new(BoundedParallel::new(2)))
            .run(TEXT, 14, "v", &output, &|_: &Progress| {})
            .await
            .unwrap_err();

        assert!(matches!(
            failure.stage,
            Stage::Synthesizing | Stage::Fetching
        ));
        assert!(failure.chunk_index.is_some());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_cancel_between_chunks() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(fixture_synth(dir.path()));
        let output = dir.path().join("book.wav");
        let pipeline = pipeline(Arc::clone(&synth));
        let cancel = pipeline.cancel_handle();

        let observer = move |p: &Progress| {
            if p.stage == Stage::Fetching && p.current_index == 0 {
                cancel.cancel();
            }
        };

        let failure = pipeline
            .run(TEXT, 14, "v", &output, &observer)
            .await
            .unwrap_err();

        // The in-flight fetch of chunk 0 completes; chunk 1 never starts
        assert_eq!(failure.stage, Stage::Synthesizing);
        assert_eq!(failure.chunk_index, Some(1));
        assert!(matches!(failure.cause, PipelineError::Cancelled));
        assert_eq!(synth.call_count(), 1);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_export_failure_surfaces_as_assembling() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(fixture_synth(dir.path()));
        let output = dir.path().join("missing-dir").join("book.wav");

        let failure = pipeline(synth)
            .run(TEXT, 14, "v", &output, &|_: &Progress| {})
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Assembling);
        assert!(matches!(failure.cause, PipelineError::Assembly(_)));
        assert_eq!(
            failure.last_progress,
            Some(Progress::new(3, 3, Stage::Assembling))
        );
        assert!(!output.exists());
    }

    #[test]
    fn test_tracker_keeps_last_progress() {
        let observer = |_: &Progress| {};
        let tracker = ProgressTracker::new(&observer);
        assert_eq!(tracker.last(), None);
        tracker.report(Progress::new(0, 2, Stage::Synthesizing));
        tracker.report(Progress::new(0, 2, Stage::Fetching));
        let failure = tracker.failure(Stage::Fetching, Some(0), PipelineError::Cancelled);
        assert_eq!(
            failure.last_progress,
            Some(Progress::new(0, 2, Stage::Fetching))
        );
    }
}
