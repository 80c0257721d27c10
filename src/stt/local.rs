//! Offline recognizer: Silero VAD segments transcribed by a local Whisper model.
//!
//! The Whisper model is loaded once and shared by every session. Each session
//! gets its own VAD, fed from the microphone callback, so nothing carries over
//! from one listening episode to the next.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use sherpa_rs::silero_vad::{SileroVad, SileroVadConfig};
use sherpa_rs::whisper::{WhisperConfig, WhisperRecognizer};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::session::Recognizer;
use crate::config::AppConfig;

/// Minimum speech duration in seconds to be considered valid.
const MIN_SPEECH_DURATION: f32 = 0.1;

/// Maximum speech duration in seconds (prevent runaway segments).
const MAX_SPEECH_DURATION: f32 = 30.0;

/// VAD window size in samples (512 samples = 32ms at 16kHz).
const VAD_WINDOW_SIZE: i32 = 512;

/// Buffer size in seconds for VAD (how much audio to accumulate).
const VAD_BUFFER_SIZE_SECONDS: f32 = 60.0;

/// Completed segments waiting for transcription.
const SEGMENT_CHANNEL_SIZE: usize = 5;

/// Local Whisper model, shared across sessions.
pub struct LocalWhisper {
    whisper: Mutex<WhisperRecognizer>,
    sample_rate: u32,
}

impl LocalWhisper {
    /// Load the Whisper model. Slow: call from a blocking context.
    ///
    /// # Errors
    /// Returns an error if the model files are missing or invalid.
    pub fn load(config: &AppConfig) -> Result<Self> {
        let provider = config.effective_stt_provider();
        let language = config.stt_language();

        info!("Loading Whisper model with {} provider", provider);
        info!("STT language: {}", if language.is_empty() { "auto" } else { &language });

        let whisper_config = WhisperConfig {
            encoder: config.whisper_encoder_path().to_string_lossy().to_string(),
            decoder: config.whisper_decoder_path().to_string_lossy().to_string(),
            tokens: config.whisper_tokens_path().to_string_lossy().to_string(),
            language,
            provider: Some(provider.as_sherpa_provider().to_string()),
            num_threads: Some(config.num_threads.try_into().unwrap_or(2)),
            debug: config.verbose,
            ..Default::default()
        };

        let whisper = WhisperRecognizer::new(whisper_config).map_err(|e| anyhow::anyhow!("Failed to initialize Whisper: {}", e))?;
        info!("Whisper model loaded");

        Ok(Self { whisper: Mutex::new(whisper), sample_rate: config.sample_rate })
    }

    /// Transcribe one speech segment. Blocks for the duration of inference.
    pub fn transcribe(&self, samples: &[f32]) -> String {
        debug!("Transcribing {} samples", samples.len());
        let mut whisper = self.whisper.lock();
        whisper.transcribe(self.sample_rate, samples).text.trim().to_string()
    }
}

/// Per-session voice activity detector, driven by the capture callback.
pub struct VadPipeline {
    vad: SileroVad,
    segments: mpsc::Sender<Vec<f32>>,
    speech_start: Option<Instant>,
}

impl VadPipeline {
    /// Create a VAD and the channel its completed segments are delivered on.
    ///
    /// # Errors
    /// Returns an error if Silero VAD cannot be initialized.
    pub fn new(config: &AppConfig) -> Result<(Self, mpsc::Receiver<Vec<f32>>)> {
        let provider = config.effective_stt_provider();
        let vad_config = SileroVadConfig {
            model: config.vad_model_path().to_string_lossy().to_string(),
            threshold: config.vad_threshold,
            sample_rate: config.sample_rate,
            min_silence_duration: config.vad_silence_duration,
            min_speech_duration: MIN_SPEECH_DURATION,
            max_speech_duration: MAX_SPEECH_DURATION,
            window_size: VAD_WINDOW_SIZE,
            provider: Some(provider.as_sherpa_provider().to_string()),
            num_threads: Some(1),
            debug: config.verbose,
        };

        let vad = SileroVad::new(vad_config, VAD_BUFFER_SIZE_SECONDS).map_err(|e| anyhow::anyhow!("Failed to initialize Silero VAD: {}", e))?;
        let (segments, receiver) = mpsc::channel(SEGMENT_CHANNEL_SIZE);

        Ok((Self { vad, segments, speech_start: None }, receiver))
    }

    /// Feed microphone samples; completed segments are sent without blocking
    /// the audio thread.
    pub fn accept(&mut self, samples: &[f32]) {
        self.vad.accept_waveform(samples.to_vec());

        let speaking = self.vad.is_speech();
        if speaking && self.speech_start.is_none() {
            self.speech_start = Some(Instant::now());
            info!("🎤 Speech started");
        } else if !speaking && let Some(start) = self.speech_start.take() {
            info!("🎤 Speech ended ({:.1}s)", start.elapsed().as_secs_f32());
        }

        while !self.vad.is_empty() {
            let segment = self.vad.front();
            self.vad.pop();
            if segment.samples.is_empty() {
                continue;
            }
            debug!("Segment completed: {} samples", segment.samples.len());
            if let Err(e) = self.segments.try_send(segment.samples) {
                warn!("Dropped speech segment: {}", e);
            }
        }
    }
}

/// Turns VAD segments into final transcripts, skipping empty results and
/// repeats of the previous result.
pub struct LocalRecognizer {
    segments: mpsc::Receiver<Vec<f32>>,
    whisper: Arc<LocalWhisper>,
    last: Arc<Mutex<Option<String>>>,
}

impl LocalRecognizer {
    /// `last` is shared between sessions so a repeat is caught across turns.
    pub fn new(segments: mpsc::Receiver<Vec<f32>>, whisper: Arc<LocalWhisper>, last: Arc<Mutex<Option<String>>>) -> Self {
        Self { segments, whisper, last }
    }
}

#[async_trait]
impl Recognizer for LocalRecognizer {
    async fn next_transcript(&mut self) -> Result<Option<String>> {
        while let Some(samples) = self.segments.recv().await {
            let whisper = self.whisper.clone();
            let text = tokio::task::spawn_blocking(move || whisper.transcribe(&samples)).await.context("Transcription task failed")?;

            if !accept_result(&self.last, &text) {
                continue;
            }
            info!("🗣️ You: {}", text);
            return Ok(Some(text));
        }
        Ok(None)
    }
}

/// Record `text` as the latest result unless it is empty or a repeat.
pub(crate) fn accept_result(last: &Mutex<Option<String>>, text: &str) -> bool {
    if text.is_empty() {
        debug!("Empty transcription result");
        return false;
    }
    let mut last = last.lock();
    if last.as_deref() == Some(text) {
        debug!("Duplicate transcription ignored: {}", text);
        return false;
    }
    *last = Some(text.to_string());
    true
}
