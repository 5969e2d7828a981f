//! Ordered concatenation of chunk audio and export of the final artifact.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tempfile::{Builder, TempDir};
use thiserror::Error;

use super::buffer::{AudioBuffer, samples_for_ms};

/// Assembly/export errors.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Buffer {index} has sample rate {found}, expected {expected}")]
    SampleRateMismatch {
        index: usize,
        expected: u32,
        found: u32,
    },

    #[error("Invalid bitrate {0:?}; expected a value like \"192k\"")]
    InvalidBitrate(String),

    #[error("Failed to encode WAV: {0}")]
    Encode(String),

    #[error("ffmpeg not found; install it or set ffmpeg_path")]
    FfmpegNotFound,

    #[error("ffmpeg failed: {0}")]
    Ffmpeg(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Container of the exported artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp3,
    Wav,
    M4a,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::M4a => "m4a",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "wav" => Ok(Self::Wav),
            "m4a" | "aac" => Ok(Self::M4a),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

/// Check a bitrate string of the form `<digits>k`.
pub fn validate_bitrate(bitrate: &str) -> Result<(), AssemblyError> {
    let valid = bitrate
        .strip_suffix('k')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) && n != "0");
    if valid {
        Ok(())
    } else {
        Err(AssemblyError::InvalidBitrate(bitrate.to_string()))
    }
}

/// Concatenates per-chunk buffers with fixed pauses and writes the result.
#[derive(Debug, Clone)]
pub struct AudioAssembler {
    sample_rate: u32,
    ffmpeg: Option<PathBuf>,
}

impl AudioAssembler {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ffmpeg: None,
        }
    }

    /// Use a specific ffmpeg binary instead of searching `PATH`.
    pub fn with_ffmpeg(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg = Some(path.into());
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Concatenate `buffers` in order with `pause_ms` of silence between
    /// consecutive non-empty buffers.
    ///
    /// Empty buffers are skipped. No pause is added before the first or after
    /// the last buffer.
    pub fn assemble(
        &self,
        buffers: &[AudioBuffer],
        pause_ms: u64,
    ) -> Result<AudioBuffer, AssemblyError> {
        let pause_len = samples_for_ms(pause_ms, self.sample_rate);
        let mut total = 0;
        let mut present = 0usize;

        for (index, buffer) in buffers.iter().enumerate() {
            if buffer.is_empty() {
                continue;
            }
            if buffer.sample_rate() != self.sample_rate {
                return Err(AssemblyError::SampleRateMismatch {
                    index,
                    expected: self.sample_rate,
                    found: buffer.sample_rate(),
                });
            }
            total += buffer.len();
            present += 1;
        }
        total += pause_len * present.saturating_sub(1);

        let mut samples = Vec::with_capacity(total);
        for buffer in buffers.iter().filter(|b| !b.is_empty()) {
            if !samples.is_empty() {
                samples.resize(samples.len() + pause_len, 0.0);
            }
            samples.extend_from_slice(buffer.samples());
        }

        debug!(
            "assembled {} buffers into {} samples ({} skipped)",
            present,
            samples.len(),
            buffers.len() - present
        );

        Ok(AudioBuffer::new(samples, self.sample_rate))
    }

    /// Encode `buffer` to `path`.
    ///
    /// The artifact is written to a temporary file beside `path` and renamed
    /// into place, so a failure leaves nothing at `path`.
    pub fn export(
        &self,
        buffer: &AudioBuffer,
        path: &Path,
        format: OutputFormat,
        bitrate: &str,
    ) -> Result<(), AssemblyError> {
        validate_bitrate(bitrate)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut staged = Builder::new()
            .prefix(".narrate-")
            .suffix(&format!(".{}", format.extension()))
            .tempfile_in(dir)?;

        match format {
            OutputFormat::Wav => write_wav(buffer, staged.as_file_mut())?,
            OutputFormat::Mp3 | OutputFormat::M4a => {
                self.encode_with_ffmpeg(buffer, staged.path(), format, bitrate)?
            }
        }

        // tempfile stages with mode 0600
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(staged.path(), std::fs::Permissions::from_mode(0o644))?;
        }

        staged.persist(path).map_err(|e| AssemblyError::Io(e.error))?;

        info!("Exported {} to {}", format, path.display());
        Ok(())
    }

    fn ffmpeg_command(&self) -> Result<Command, AssemblyError> {
        let path = match &self.ffmpeg {
            Some(path) => path.clone(),
            None => which::which("ffmpeg").map_err(|_| AssemblyError::FfmpegNotFound)?,
        };
        Ok(Command::new(path))
    }

    fn encode_with_ffmpeg(
        &self,
        buffer: &AudioBuffer,
        output: &Path,
        format: OutputFormat,
        bitrate: &str,
    ) -> Result<(), AssemblyError> {
        let mut cmd = self.ffmpeg_command()?;

        let temp_dir = TempDir::new()?;
        let wav_path = temp_dir.path().join("assembled.wav");
        let mut wav_file = std::fs::File::create(&wav_path)?;
        write_wav(buffer, &mut wav_file)?;
        drop(wav_file);

        let (codec, container) = match format {
            OutputFormat::M4a => ("aac", "ipod"),
            _ => ("libmp3lame", "mp3"),
        };

        let out = cmd
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(&wav_path)
            .args(["-c:a", codec, "-b:a", bitrate, "-f", container])
            .arg(output)
            .output()?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(AssemblyError::Ffmpeg(stderr.trim().to_string()));
        }

        Ok(())
    }
}

/// Write 16-bit mono PCM WAV.
fn write_wav<W: std::io::Write + std::io::Seek>(
    buffer: &AudioBuffer,
    writer: W,
) -> Result<(), AssemblyError> {
    let encode_err = |e: hound::Error| AssemblyError::Encode(e.to_string());

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::new(writer, spec).map_err(encode_err)?;
    for &sample in buffer.samples() {
        #[allow(clippy::cast_possible_truncation)]
        let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer.write_sample(sample_i16).map_err(encode_err)?;
    }
    writer.finalize().map_err(encode_err)?;
    Ok(())
}
