//! narrate - Turn long plain text into one continuous audiobook

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use narrate::audio::{AudioAssembler, AudioFetcher, OutputFormat};
use narrate::config::NarrateConfig;
use narrate::pipeline::{Pipeline, Progress, Stage, strategy_for};
use narrate::text::{self, CleanOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tts_client::{ProviderKind, SpeechSynthesizer};

#[derive(Parser, Debug)]
#[command(name = "narrate")]
#[command(about = "Turn long plain text into one continuous audiobook", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the text file, or "-" to read stdin
    text_file: Option<PathBuf>,

    /// Output file path (default: <text-name>.<format>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Voice identifier passed to the synthesis service
    #[arg(long)]
    voice: Option<String>,

    /// Maximum chunk length in characters
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Pause between chunks in milliseconds
    #[arg(long)]
    pause_ms: Option<u64>,

    /// Output format (mp3, wav, m4a)
    #[arg(long)]
    format: Option<String>,

    /// Export bitrate (e.g., "192k")
    #[arg(long)]
    bitrate: Option<String>,

    /// Number of chunks synthesized at once
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Apply OCR character substitutions during cleanup
    #[arg(long, default_value_t = false)]
    ocr_fixes: bool,

    /// Synthesis provider (default from tts.toml)
    #[arg(long)]
    provider: Option<String>,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List voices offered by the synthesis provider
    Voices,
    /// Check provider credentials and ffmpeg availability
    Check,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set default voice
    SetVoice {
        /// Voice identifier
        voice: String,
    },
    /// Set default maximum chunk length
    SetChunkSize {
        /// Characters per chunk
        value: usize,
    },
    /// Set default pause between chunks
    SetPause {
        /// Milliseconds
        value: u64,
    },
    /// Set default output format
    SetFormat {
        /// mp3, wav or m4a
        format: String,
    },
    /// Set default export bitrate
    SetBitrate {
        /// e.g., "192k"
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    match &args.command {
        Some(Commands::Config { action }) => {
            return handle_config_command(action);
        }
        Some(Commands::Voices) => {
            return list_voices(&args).await;
        }
        Some(Commands::Check) => {
            return check(&args).await;
        }
        None => {}
    }

    let input = args
        .text_file
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Text file path is required. Run 'narrate --help' for usage."))?;

    let config = effective_config(&args)?;
    config.validate().context("Invalid configuration")?;

    let raw = read_input(&input).await?;
    let cleaned = text::clean_text(
        &raw,
        CleanOptions {
            ocr_fixes: config.ocr_fixes,
        },
    );
    let prepared = text::prepare_for_tts(&cleaned);
    if prepared.is_empty() {
        bail!("No text to narrate in {}", input.display());
    }

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&input, config.output_format));

    let text_len = prepared.chars().count();
    let chunk_count = text::split(&prepared, config.max_chunk_len).len();
    eprintln!(
        "Text: {} characters, {} chunks (~{:.1} min to process)",
        text_len,
        chunk_count,
        text::estimate_processing_minutes(text_len, chunk_count)
    );
    debug!("Output: {}", output_path.display());
    debug!("Voice: {}", config.voice_id);
    debug!("Concurrency: {}", config.concurrency);

    let synthesizer = build_synthesizer(&args)?;
    let fetcher = AudioFetcher::new(config.codec, config.sample_rate)
        .context("Failed to create audio fetcher")?;
    let mut assembler = AudioAssembler::new(config.sample_rate);
    if let Some(ref ffmpeg) = config.ffmpeg_path {
        assembler = assembler.with_ffmpeg(ffmpeg);
    }

    let pipeline = Pipeline::new(synthesizer, fetcher, config.pipeline_options())
        .with_assembler(assembler)
        .with_strategy(strategy_for(config.concurrency));

    let cancel = pipeline.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current stage");
            cancel.cancel();
        }
    });

    let pb = ProgressBar::new(chunk_count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );

    let bar = pb.clone();
    let observer = move |progress: &Progress| match progress.stage {
        Stage::Synthesizing | Stage::Fetching => {
            if progress.current_index as u64 > bar.position() {
                bar.set_position(progress.current_index as u64);
            }
            bar.set_message(format!("{} chunk {}", progress.stage, progress.current_index + 1));
        }
        Stage::Assembling => {
            bar.set_position(progress.total_chunks as u64);
            bar.set_message("assembling");
        }
        _ => {}
    };

    let result = pipeline
        .run(
            &prepared,
            config.max_chunk_len,
            &config.voice_id,
            &output_path,
            &observer,
        )
        .await;

    let audiobook = match result {
        Ok(audiobook) => {
            pb.finish_with_message("done");
            audiobook
        }
        Err(failure) => {
            pb.abandon_with_message(failure.stage.to_string());
            return Err(failure).context("Narration failed");
        }
    };

    let metadata = std::fs::metadata(audiobook.path())?;
    let size_mb = metadata.len() as f64 / (1024.0 * 1024.0);

    eprintln!(
        "Output: {} ({:.1} MB, {})",
        audiobook.path().display(),
        size_mb,
        audiobook.formatted_duration()
    );

    Ok(())
}

/// Merge command-line overrides over the saved configuration.
fn effective_config(args: &Args) -> Result<NarrateConfig> {
    let mut config = NarrateConfig::load().context("Failed to load configuration")?;

    if let Some(ref voice) = args.voice {
        config.voice_id = voice.clone();
    }
    if let Some(size) = args.chunk_size {
        config.max_chunk_len = size;
    }
    if let Some(pause) = args.pause_ms {
        config.pause_duration_ms = pause;
    }
    if let Some(ref format) = args.format {
        config.output_format = format.parse::<OutputFormat>().map_err(anyhow::Error::msg)?;
    }
    if let Some(ref bitrate) = args.bitrate {
        config.bitrate = bitrate.clone();
    }
    if let Some(jobs) = args.jobs {
        config.concurrency = jobs;
    }
    if args.ocr_fixes {
        config.ocr_fixes = true;
    }

    Ok(config)
}

async fn read_input(input: &Path) -> Result<String> {
    if input.as_os_str() == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("Failed to read stdin")?;
        return Ok(buf);
    }

    if !input.exists() {
        bail!("Text file not found: {}", input.display());
    }

    tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))
}

fn default_output_path(input: &Path, format: OutputFormat) -> PathBuf {
    if input.as_os_str() == "-" {
        return PathBuf::from(format!("narration.{}", format.extension()));
    }
    input.with_extension(format.extension())
}

fn build_synthesizer(args: &Args) -> Result<Arc<dyn SpeechSynthesizer>> {
    let tts_config = tts_client::Config::load().context("Failed to load TTS configuration")?;
    let name = args
        .provider
        .clone()
        .unwrap_or_else(|| tts_config.default_provider.clone());
    let kind = ProviderKind::from_str(&name)?;
    let provider = tts_client::get_provider(kind, &tts_config)?;
    info!("Using {} provider", provider.name());
    Ok(Arc::from(provider))
}

async fn list_voices(args: &Args) -> Result<()> {
    let synthesizer = build_synthesizer(args)?;
    let voices = synthesizer.list_voices().await?;

    if voices.is_empty() {
        println!("No voices reported by {}", synthesizer.name());
        return Ok(());
    }

    for voice in voices {
        let mut details = Vec::new();
        if let Some(locale) = voice.locale {
            details.push(locale);
        }
        if let Some(gender) = voice.gender {
            details.push(gender);
        }
        match voice.display_name {
            Some(name) => println!("{:<24} {} ({})", voice.voice_id, name, details.join(", ")),
            None => println!("{:<24} ({})", voice.voice_id, details.join(", ")),
        }
    }

    Ok(())
}

async fn check(args: &Args) -> Result<()> {
    let config = NarrateConfig::load()?;

    match config.validate() {
        Ok(()) => println!("config: ok"),
        Err(e) => println!("config: {}", e),
    }

    let ffmpeg = config
        .ffmpeg_path
        .clone()
        .or_else(|| which::which("ffmpeg").ok());
    match ffmpeg {
        Some(path) => println!("ffmpeg: {}", path.display()),
        None => println!("ffmpeg: not found (only wav output available)"),
    }

    match build_synthesizer(args) {
        Ok(synthesizer) => match synthesizer.check_status().await {
            Ok(()) => println!("{}: ok", synthesizer.name()),
            Err(e) => println!("{}: {}", synthesizer.name(), e),
        },
        Err(e) => println!("provider: {}", e),
    }

    Ok(())
}

fn handle_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = NarrateConfig::load()?;
            println!("Configuration file: {:?}", NarrateConfig::config_path()?);
            println!();
            println!("max_chunk_len = {}", config.max_chunk_len);
            println!("voice_id = \"{}\"", config.voice_id);
            println!("pause_duration_ms = {}", config.pause_duration_ms);
            println!("output_format = \"{}\"", config.output_format);
            println!("bitrate = \"{}\"", config.bitrate);
            println!("codec = \"{}\"", config.codec);
            println!("sample_rate = {}", config.sample_rate);
            println!("synthesis_timeout_secs = {}", config.synthesis_timeout_secs);
            println!("fetch_timeout_secs = {}", config.fetch_timeout_secs);
            println!("concurrency = {}", config.concurrency);
            println!("ocr_fixes = {}", config.ocr_fixes);
            println!("normalize = {}", config.normalize);
            println!("fade_in_ms = {}", config.fade_in_ms);
            println!("fade_out_ms = {}", config.fade_out_ms);
            if let Some(ffmpeg) = &config.ffmpeg_path {
                println!("ffmpeg_path = \"{}\"", ffmpeg.display());
            } else {
                println!("ffmpeg_path = (search PATH)");
            }
        }
        ConfigAction::SetVoice { voice } => {
            let mut config = NarrateConfig::load()?;
            config.voice_id = voice.clone();
            config.validate()?;
            config.save()?;
            println!("Default voice set to: {}", config.voice_id);
        }
        ConfigAction::SetChunkSize { value } => {
            let mut config = NarrateConfig::load()?;
            config.max_chunk_len = *value;
            config.validate()?;
            config.save()?;
            println!("Default chunk size set to: {}", config.max_chunk_len);
        }
        ConfigAction::SetPause { value } => {
            let mut config = NarrateConfig::load()?;
            config.pause_duration_ms = *value;
            config.save()?;
            println!("Default pause set to: {} ms", config.pause_duration_ms);
        }
        ConfigAction::SetFormat { format } => {
            let mut config = NarrateConfig::load()?;
            config.output_format = format.parse::<OutputFormat>().map_err(anyhow::Error::msg)?;
            config.save()?;
            println!("Default output format set to: {}", config.output_format);
        }
        ConfigAction::SetBitrate { value } => {
            let mut config = NarrateConfig::load()?;
            config.bitrate = value.clone();
            config.validate()?;
            config.save()?;
            println!("Default bitrate set to: {}", config.bitrate);
        }
    }
    Ok(())
}
