//! Microphone-backed recognition sessions.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OnceCell, mpsc};
use tracing::info;

use super::cloud::{CloudRecognizer, GroqTranscriber, Transcriber};
use super::endpoint::EndpointConfig;
use super::local::{LocalRecognizer, LocalWhisper, VadPipeline};
use super::session::{MediaGauge, MediaKind, RecognitionSession, SessionFactory};
use crate::audio::Capturer;
use crate::config::{AppConfig, Mode};
use crate::error::AssistantError;

/// Opens the microphone with the recognizer of the requested mode:
/// hosted Whisper online, Silero VAD plus local Whisper offline.
pub struct DeviceSessionFactory {
    config: Arc<AppConfig>,
    transcriber: Option<Arc<dyn Transcriber>>,
    whisper: OnceCell<Arc<LocalWhisper>>,
    last: Arc<Mutex<Option<String>>>,
    gauge: MediaGauge,
}

impl DeviceSessionFactory {
    pub fn new(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let transcriber: Option<Arc<dyn Transcriber>> =
            if config.groq_api_key.is_some() { Some(Arc::new(GroqTranscriber::new(&config)?)) } else { None };

        Ok(Self { config, transcriber, whisper: OnceCell::new(), last: Arc::new(Mutex::new(None)), gauge: MediaGauge::new() })
    }

    fn endpoint(&self) -> EndpointConfig {
        EndpointConfig {
            sample_rate: self.config.sample_rate,
            threshold: self.config.endpoint_threshold,
            silence: Duration::from_millis(self.config.endpoint_silence_ms),
            max_duration: Duration::from_secs(self.config.max_listen_secs),
        }
    }

    /// Local Whisper, loaded on first use.
    async fn whisper(&self) -> Result<Arc<LocalWhisper>, AssistantError> {
        self.whisper
            .get_or_try_init(|| async {
                let config = self.config.clone();
                let whisper = tokio::task::spawn_blocking(move || LocalWhisper::load(&config))
                    .await
                    .map_err(|e| AssistantError::Unsupported(format!("offline recognizer failed to load: {e}")))?
                    .map_err(|e| AssistantError::Unsupported(format!("offline recognizer unavailable: {e:#}")))?;
                Ok(Arc::new(whisper))
            })
            .await
            .cloned()
    }

    async fn open_microphone<F>(&self, callback: F) -> Result<Capturer, AssistantError>
    where
        F: FnMut(&[f32]) + Send + 'static,
    {
        let sample_rate = self.config.sample_rate;
        tokio::task::spawn_blocking(move || Capturer::open(sample_rate, callback))
            .await
            .map_err(|e| AssistantError::MicrophoneUnavailable(e.to_string()))?
            .map_err(|e| AssistantError::MicrophoneUnavailable(format!("{e:#}")))
    }

    fn session(&self, mode: Mode, recognizer: Box<dyn super::session::Recognizer>, capturer: Capturer) -> RecognitionSession {
        RecognitionSession::new(mode, recognizer)
            .with_input(Box::new(capturer))
            .hold(self.gauge.acquire(MediaKind::Microphone))
            .hold(self.gauge.acquire(MediaKind::AudioPipeline))
            .hold(self.gauge.acquire(MediaKind::Recognizer))
    }
}

#[async_trait::async_trait]
impl SessionFactory for DeviceSessionFactory {
    async fn open(&self, mode: Mode) -> Result<RecognitionSession, AssistantError> {
        match mode {
            Mode::Online => {
                let transcriber = self.transcriber.clone().ok_or_else(|| AssistantError::Unsupported("online recognition needs GROQ_API_KEY".into()))?;
                let (tx, rx) = mpsc::unbounded_channel();
                let capturer = self.open_microphone(move |samples| {
                    tx.send(samples.to_vec()).ok();
                })
                .await?;

                info!("🎤 Listening (online)...");
                Ok(self.session(mode, Box::new(CloudRecognizer::new(rx, transcriber, self.endpoint())), capturer))
            }
            Mode::Offline => {
                let whisper = self.whisper().await?;
                let (mut vad, segments) = VadPipeline::new(&self.config).map_err(AssistantError::recognition)?;
                let capturer = self.open_microphone(move |samples| vad.accept(samples)).await?;

                info!("🎤 Listening (offline)...");
                Ok(self.session(mode, Box::new(LocalRecognizer::new(segments, whisper, self.last.clone())), capturer))
            }
        }
    }

    fn media(&self) -> MediaGauge {
        self.gauge.clone()
    }
}
