//! Recognition sessions and the resources they own.
//!
//! A session bundles the microphone stream, the audio pipeline that feeds the
//! recognizer and the recognizer itself. Every live resource is counted by a
//! [`MediaGauge`] so the orchestrator can verify nothing leaks across sessions.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::config::Mode;
use crate::error::AssistantError;

/// Kind of resource held by a recognition session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Microphone,
    #[cfg_attr(not(feature = "voice"), allow(dead_code))]
    AudioPipeline,
    Recognizer,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Microphone => write!(f, "microphone"),
            MediaKind::AudioPipeline => write!(f, "audio pipeline"),
            MediaKind::Recognizer => write!(f, "recognizer"),
        }
    }
}

/// Counts live media handles.
#[derive(Debug, Clone, Default)]
pub struct MediaGauge(Arc<AtomicUsize>);

impl MediaGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles not yet released.
    pub fn live(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Register a resource; it stays counted until the handle is dropped.
    pub fn acquire(&self, kind: MediaKind) -> MediaHandle {
        self.0.fetch_add(1, Ordering::SeqCst);
        MediaHandle { gauge: self.0.clone(), kind }
    }
}

/// Registration of one live resource in a [`MediaGauge`].
#[derive(Debug)]
pub struct MediaHandle {
    gauge: Arc<AtomicUsize>,
    kind: MediaKind,
}

impl Drop for MediaHandle {
    fn drop(&mut self) {
        self.gauge.fetch_sub(1, Ordering::SeqCst);
        debug!("Released {}", self.kind);
    }
}

/// Audio input feeding a recognizer (microphone plus processing pipeline).
pub trait MediaSource: Send {
    /// Disconnect the pipeline and stop the microphone. Must be idempotent.
    fn close(&mut self);
}

#[cfg(feature = "voice")]
impl MediaSource for crate::audio::Capturer {
    fn close(&mut self) {
        crate::audio::Capturer::close(self);
    }
}

/// Produces final transcripts from a session's audio.
#[async_trait]
pub trait Recognizer: Send {
    /// Wait for the next final transcript. `Ok(None)` means the input ended
    /// without anything recognized.
    async fn next_transcript(&mut self) -> Result<Option<String>>;
}

/// Opens recognition sessions for a mode.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open the microphone and recognizer for `mode`.
    ///
    /// # Errors
    /// `MicrophoneUnavailable` when capture cannot start, `Unsupported` when the
    /// mode's recognizer is not available.
    async fn open(&self, mode: Mode) -> std::result::Result<RecognitionSession, AssistantError>;

    /// Gauge counting the handles of every session this factory opened.
    fn media(&self) -> MediaGauge;
}

/// One listening episode.
pub struct RecognitionSession {
    mode: Mode,
    input: Option<Box<dyn MediaSource>>,
    recognizer: Option<Box<dyn Recognizer>>,
    handles: Vec<MediaHandle>,
}

impl RecognitionSession {
    pub fn new(mode: Mode, recognizer: Box<dyn Recognizer>) -> Self {
        Self { mode, input: None, recognizer: Some(recognizer), handles: Vec::new() }
    }

    /// Attach the audio input that feeds the recognizer.
    #[cfg_attr(not(feature = "voice"), allow(dead_code))]
    pub fn with_input(mut self, input: Box<dyn MediaSource>) -> Self {
        self.input = Some(input);
        self
    }

    /// Keep `handle` registered until teardown.
    pub fn hold(mut self, handle: MediaHandle) -> Self {
        self.handles.push(handle);
        self
    }

    /// Wait for the next final transcript.
    ///
    /// # Errors
    /// Returns an error if the session was torn down or the recognizer failed.
    pub async fn next_transcript(&mut self) -> Result<Option<String>> {
        let recognizer = self.recognizer.as_mut().ok_or_else(|| anyhow::anyhow!("recognition session is closed"))?;
        recognizer.next_transcript().await
    }

    /// Release everything: stop the input first so nothing feeds a released
    /// recognizer, then the recognizer, then the handle registrations.
    pub fn teardown(&mut self) {
        if let Some(mut input) = self.input.take() {
            input.close();
        }
        self.recognizer.take();
        let released = self.handles.len();
        self.handles.clear();
        if released > 0 {
            debug!("{} recognition session torn down ({} handles)", self.mode, released);
        }
    }
}

impl Drop for RecognitionSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct OneShot(Option<String>);

    #[async_trait]
    impl Recognizer for OneShot {
        async fn next_transcript(&mut self) -> Result<Option<String>> {
            Ok(self.0.take())
        }
    }

    struct FlagInput(Arc<AtomicBool>);

    impl MediaSource for FlagInput {
        fn close(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_teardown_releases_every_handle() {
        let gauge = MediaGauge::new();
        let closed = Arc::new(AtomicBool::new(false));
        let mut session = RecognitionSession::new(Mode::Offline, Box::new(OneShot(Some("hello".into()))))
            .with_input(Box::new(FlagInput(closed.clone())))
            .hold(gauge.acquire(MediaKind::Microphone))
            .hold(gauge.acquire(MediaKind::AudioPipeline))
            .hold(gauge.acquire(MediaKind::Recognizer));

        assert_eq!(gauge.live(), 3);
        assert_eq!(session.next_transcript().await.ok().flatten().as_deref(), Some("hello"));

        session.teardown();
        assert_eq!(gauge.live(), 0);
        assert!(closed.load(Ordering::SeqCst));
        assert!(session.next_transcript().await.is_err());
    }

    #[test]
    fn test_drop_tears_down() {
        let gauge = MediaGauge::new();
        {
            let _session = RecognitionSession::new(Mode::Online, Box::new(OneShot(None))).hold(gauge.acquire(MediaKind::Microphone));
            assert_eq!(gauge.live(), 1);
        }
        assert_eq!(gauge.live(), 0);
    }
}
