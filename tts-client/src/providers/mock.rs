//! Mock speech synthesizer for testing
//!
//! Behaviour is scripted with closures over the incoming request so tests can
//! map each chunk's text to a reference (or a failure) regardless of the order
//! in which the pipeline issues calls.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{Result, TtsError};
use crate::provider::{AudioReference, SpeechSynthesizer, SynthesisRequest};

type Responder = Box<dyn Fn(&SynthesisRequest) -> Result<AudioReference> + Send + Sync>;
type Latency = Box<dyn Fn(&SynthesisRequest) -> Duration + Send + Sync>;

/// A mock synthesizer that records every request it receives
pub struct MockSynthesizer {
    responder: Responder,
    latency: Option<Latency>,
    call_count: AtomicUsize,
    requests: Mutex<Vec<SynthesisRequest>>,
}

impl MockSynthesizer {
    /// Create a synthesizer whose outcome is computed from each request
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&SynthesisRequest) -> Result<AudioReference> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: None,
            call_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a synthesizer that always returns the same reference
    pub fn always_returns(reference: &str) -> Self {
        let reference = reference.to_string();
        Self::from_fn(move |_| AudioReference::parse(reference.clone()))
    }

    /// Create a synthesizer that always fails with an API error
    pub fn always_fails(status_code: u16) -> Self {
        Self::from_fn(move |_| {
            Err(TtsError::ApiError {
                message: "mock failure".to_string(),
                status_code: Some(status_code),
            })
        })
    }

    /// Delay each call by an amount computed from the request
    pub fn with_latency<F>(mut self, latency: F) -> Self
    where
        F: Fn(&SynthesisRequest) -> Duration + Send + Sync + 'static,
    {
        self.latency = Some(Box::new(latency));
        self
    }

    /// Get the number of times synthesize() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Texts received so far, in call order
    pub fn texts(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.iter().map(|r| r.text.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioReference> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(request)).await;
        }

        (self.responder)(request)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
