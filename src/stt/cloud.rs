//! Online recognizer: one utterance, transcribed by a hosted Whisper model.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rig::prelude::*;
use rig::providers::groq;
use rig::transcription::TranscriptionModel;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::endpoint::{Endpoint, EndpointConfig, Endpointer, encode_wav};
use super::session::Recognizer;
use crate::config::AppConfig;

/// Turns a WAV recording into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String>;
}

/// Groq-hosted Whisper transcription through RIG.
pub struct GroqTranscriber {
    client: groq::Client,
    model: String,
    language: String,
}

impl GroqTranscriber {
    /// Create the transcription client.
    ///
    /// # Errors
    /// Returns an error if the Groq client cannot be built.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let api_key = config.groq_api_key.clone().unwrap_or_default();
        let client = groq::Client::builder()
            .api_key(api_key.as_str())
            .base_url(&config.groq_url)
            .build()
            .context("Failed to create Groq client")?;

        Ok(Self { client, model: config.transcription_model.clone(), language: config.stt_language() })
    }
}

#[async_trait]
impl Transcriber for GroqTranscriber {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String> {
        let mut request = self.client.transcription_model(&self.model).transcription_request().data(wav).filename(Some("speech.wav".to_string()));
        if !self.language.is_empty() {
            request = request.language(self.language.clone());
        }
        let response = request.send().await.context("Transcription request failed")?;
        Ok(response.text.trim().to_string())
    }
}

/// One-shot recognizer fed by the microphone: listens until the endpointer
/// closes an utterance, then transcribes it once.
pub struct CloudRecognizer {
    audio: mpsc::UnboundedReceiver<Vec<f32>>,
    transcriber: Arc<dyn Transcriber>,
    endpoint: EndpointConfig,
    done: bool,
}

impl CloudRecognizer {
    pub fn new(audio: mpsc::UnboundedReceiver<Vec<f32>>, transcriber: Arc<dyn Transcriber>, endpoint: EndpointConfig) -> Self {
        Self { audio, transcriber, endpoint, done: false }
    }
}

#[async_trait]
impl Recognizer for CloudRecognizer {
    async fn next_transcript(&mut self) -> Result<Option<String>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let mut endpointer = Endpointer::new(self.endpoint);
        let outcome = loop {
            match self.audio.recv().await {
                Some(chunk) => match endpointer.push(&chunk) {
                    Endpoint::Pending => continue,
                    other => break other,
                },
                None => break endpointer.finish(),
            }
        };

        let samples = match outcome {
            Endpoint::Utterance(samples) => samples,
            _ => {
                info!("🎤 No speech detected");
                return Ok(None);
            }
        };

        debug!("Utterance captured: {} samples", samples.len());
        let wav = encode_wav(&samples, self.endpoint.sample_rate)?;
        let text = self.transcriber.transcribe(wav).await?.trim().to_string();
        if text.is_empty() {
            debug!("Empty transcription result");
            return Ok(None);
        }

        info!("🗣️ You: {}", text);
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct FakeTranscriber {
        reply: String,
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        async fn transcribe(&self, wav: Vec<u8>) -> Result<String> {
            self.calls.lock().push(wav.len());
            Ok(self.reply.clone())
        }
    }

    fn endpoint() -> EndpointConfig {
        EndpointConfig { sample_rate: 16000, threshold: 0.05, silence: Duration::from_millis(200), max_duration: Duration::from_secs(3) }
    }

    fn speech_then_silence() -> Vec<Vec<f32>> {
        let speech: Vec<f32> = (0..8000).map(|i| 0.4 * (i as f32 * 0.3).sin()).collect();
        vec![vec![0.0; 1600], speech, vec![0.0; 4800]]
    }

    #[tokio::test]
    async fn test_transcribes_one_utterance_then_ends() {
        let transcriber = Arc::new(FakeTranscriber { reply: " My stomach hurts ".into(), calls: Mutex::new(Vec::new()) });
        let (tx, rx) = mpsc::unbounded_channel();
        for chunk in speech_then_silence() {
            tx.send(chunk).ok();
        }

        let mut recognizer = CloudRecognizer::new(rx, transcriber.clone(), endpoint());
        assert_eq!(recognizer.next_transcript().await.ok().flatten().as_deref(), Some("My stomach hurts"));
        assert_eq!(transcriber.calls.lock().len(), 1);

        // One-shot: a second call does not listen again
        assert_eq!(recognizer.next_transcript().await.ok().flatten(), None);
    }

    #[tokio::test]
    async fn test_closed_microphone_without_speech_yields_nothing() {
        let transcriber = Arc::new(FakeTranscriber { reply: "unused".into(), calls: Mutex::new(Vec::new()) });
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(vec![0.0; 3200]).ok();
        drop(tx);

        let mut recognizer = CloudRecognizer::new(rx, transcriber.clone(), endpoint());
        assert_eq!(recognizer.next_transcript().await.ok().flatten(), None);
        assert!(transcriber.calls.lock().is_empty());
    }
}
