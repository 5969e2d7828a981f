//! Retrieval and decoding of synthesized audio assets.

use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use reqwest::Url;
use rubato::{FftFixedIn, Resampler};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tts_client::AudioReference;

use super::buffer::AudioBuffer;

/// Input chunk size for FFT resampling.
const RESAMPLE_CHUNK: usize = 1024;

/// Fetch-related errors.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Transport error fetching {reference}: {message}")]
    Transport { reference: String, message: String },

    #[error("HTTP error: {status} for {reference}")]
    HttpStatus { status: u16, reference: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Failed to resample audio: {0}")]
    Resample(String),

    #[error("Unsupported audio reference: {0}")]
    UnsupportedReference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encoding the backend is expected to deliver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    #[default]
    Mp3,
    Wav,
}

impl AudioCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "wav" => Ok(Self::Wav),
            other => Err(format!("Unknown codec: {}", other)),
        }
    }
}

/// Where a reference points.
#[derive(Debug, PartialEq, Eq)]
enum Source {
    Http(Url),
    File(PathBuf),
}

/// URLs are dispatched on scheme; anything that does not parse as a URL is
/// taken as a local path.
fn classify(reference: &AudioReference) -> Result<Source, FetchError> {
    let raw = reference.as_str();
    let unsupported = || FetchError::UnsupportedReference(raw.to_string());

    let Ok(url) = Url::parse(raw) else {
        return Ok(Source::File(PathBuf::from(raw)));
    };

    match url.scheme() {
        "http" | "https" => Ok(Source::Http(url)),
        "file" => url
            .to_file_path()
            .map(Source::File)
            .map_err(|()| unsupported()),
        _ => Err(unsupported()),
    }
}

/// Fetches encoded audio for a reference and decodes it to mono samples at a
/// fixed sample rate.
///
/// There is no retry here; a failed fetch is reported as-is.
#[derive(Debug, Clone)]
pub struct AudioFetcher {
    client: reqwest::Client,
    codec: AudioCodec,
    sample_rate: u32,
}

impl AudioFetcher {
    pub fn new(codec: AudioCodec, sample_rate: u32) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Transport {
                reference: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            codec,
            sample_rate,
        })
    }

    pub fn codec(&self) -> AudioCodec {
        self.codec
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Retrieve and decode one asset. `timeout` bounds the retrieval.
    pub async fn fetch(
        &self,
        reference: &AudioReference,
        timeout: Duration,
    ) -> Result<AudioBuffer, FetchError> {
        let bytes = match classify(reference)? {
            Source::Http(url) => self.fetch_http(url, timeout).await?,
            Source::File(path) => tokio::time::timeout(timeout, tokio::fs::read(&path))
                .await
                .map_err(|_| FetchError::Timeout(timeout))??,
        };

        debug!("fetched {} bytes from {}", bytes.len(), reference);

        let codec = self.codec;
        let sample_rate = self.sample_rate;
        tokio::task::spawn_blocking(move || decode(codec, &bytes, sample_rate))
            .await
            .map_err(|e| FetchError::Decode(format!("decode task failed: {}", e)))?
    }

    async fn fetch_http(&self, url: Url, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let reference = url.to_string();
        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout(timeout)
            } else {
                FetchError::Transport {
                    reference: reference.clone(),
                    message: e.to_string(),
                }
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                reference: reference.clone(),
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

/// Decode encoded bytes and bring them to `sample_rate`.
pub fn decode(codec: AudioCodec, bytes: &[u8], sample_rate: u32) -> Result<AudioBuffer, FetchError> {
    let (samples, source_rate) = match codec {
        AudioCodec::Mp3 => decode_mp3(bytes)?,
        AudioCodec::Wav => decode_wav(bytes)?,
    };

    let samples = resample(&samples, source_rate, sample_rate)?;
    Ok(AudioBuffer::new(samples, sample_rate))
}

#[allow(clippy::cast_sign_loss)]
fn decode_mp3(bytes: &[u8]) -> Result<(Vec<f32>, u32), FetchError> {
    let mut decoder = minimp3::Decoder::new(bytes);
    let mut samples = Vec::new();
    let mut sample_rate = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate.get_or_insert(frame.sample_rate as u32);
                let pcm: Vec<f32> = frame
                    .data
                    .iter()
                    .map(|&s| f32::from(s) / 32768.0)
                    .collect();
                samples.extend(downmix(&pcm, frame.channels));
            }
            Err(minimp3::Error::SkippedData) => continue,
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(FetchError::Decode(format!("MP3 decode error: {}", e))),
        }
    }

    let sample_rate =
        sample_rate.ok_or_else(|| FetchError::Decode("no MP3 frames found".to_string()))?;
    Ok((samples, sample_rate))
}

fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32), FetchError> {
    let decode_err = |e: hound::Error| FetchError::Decode(format!("WAV decode error: {}", e));

    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(decode_err)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(decode_err)?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(decode_err)?
        }
    };

    Ok((
        downmix(&interleaved, usize::from(spec.channels)),
        spec.sample_rate,
    ))
}

/// Average interleaved channels down to mono.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample mono audio with rubato, trimming the resampler's delay so the
/// output length is `len * to / from`.
#[allow(clippy::cast_possible_truncation)]
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, FetchError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(FetchError::Resample(format!(
            "invalid rates {} -> {}",
            from_rate, to_rate
        )));
    }

    let resample_err = |e: rubato::ResampleError| FetchError::Resample(e.to_string());

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, RESAMPLE_CHUNK, 2, 1)
            .map_err(|e| FetchError::Resample(e.to_string()))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let expected = (samples.len() as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize;
    let delay = resampler.output_delay();
    let mut output: Vec<f64> = Vec::with_capacity(expected + delay);

    let mut chunks = input.chunks_exact(RESAMPLE_CHUNK);
    for chunk in &mut chunks {
        let out = resampler.process(&[chunk], None).map_err(resample_err)?;
        output.extend_from_slice(&out[0]);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let out = resampler
            .process_partial(Some(&[tail]), None)
            .map_err(resample_err)?;
        output.extend_from_slice(&out[0]);
    }

    // Flush the delay line
    while output.len() < expected + delay {
        let out = resampler
            .process_partial(None::<&[Vec<f64>]>, None)
            .map_err(resample_err)?;
        if out[0].is_empty() {
            break;
        }
        output.extend_from_slice(&out[0]);
    }

    let mut resampled: Vec<f32> = output
        .into_iter()
        .skip(delay)
        .take(expected)
        .map(|s| s as f32)
        .collect();
    resampled.resize(expected, 0.0);
    Ok(resampled)
}
