//! Typed stand-in for the microphone: each line of console input is one utterance.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use super::session::{MediaGauge, MediaKind, RecognitionSession, Recognizer, SessionFactory};
use crate::config::Mode;
use crate::error::AssistantError;

type Lines = Arc<Mutex<mpsc::UnboundedReceiver<String>>>;

/// Opens console sessions for either mode.
pub struct ConsoleSessionFactory {
    lines: Lines,
    closed: Arc<AtomicBool>,
    gauge: MediaGauge,
}

impl ConsoleSessionFactory {
    /// Each line received on `rx` is one utterance.
    pub fn from_channel(rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self { lines: Arc::new(Mutex::new(rx)), closed: Arc::new(AtomicBool::new(false)), gauge: MediaGauge::new() }
    }

    /// True once the sender side was dropped.
    fn input_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for ConsoleSessionFactory {
    async fn open(&self, mode: Mode) -> std::result::Result<RecognitionSession, AssistantError> {
        if self.input_closed() {
            return Err(AssistantError::MicrophoneUnavailable("console input closed".into()));
        }
        let recognizer = ConsoleRecognizer { lines: self.lines.clone(), closed: self.closed.clone() };
        Ok(RecognitionSession::new(mode, Box::new(recognizer))
            .hold(self.gauge.acquire(MediaKind::Microphone))
            .hold(self.gauge.acquire(MediaKind::Recognizer)))
    }

    fn media(&self) -> MediaGauge {
        self.gauge.clone()
    }
}

struct ConsoleRecognizer {
    lines: Lines,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Recognizer for ConsoleRecognizer {
    async fn next_transcript(&mut self) -> Result<Option<String>> {
        let mut lines = self.lines.lock().await;
        match lines.recv().await {
            Some(line) => {
                let text = line.trim();
                Ok(if text.is_empty() { None } else { Some(text.to_string()) })
            }
            None => {
                self.closed.store(true, Ordering::SeqCst);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_each_line_is_one_utterance() {
        let (tx, rx) = mpsc::unbounded_channel();
        let factory = ConsoleSessionFactory::from_channel(rx);
        tx.send("  I feel dizzy ".to_string()).ok();
        tx.send(String::new()).ok();

        let mut session = factory.open(Mode::Offline).await.unwrap();
        assert_eq!(factory.media().live(), 2);
        assert_eq!(session.next_transcript().await.unwrap().as_deref(), Some("I feel dizzy"));
        session.teardown();
        assert_eq!(factory.media().live(), 0);

        let mut session = factory.open(Mode::Online).await.unwrap();
        assert_eq!(session.next_transcript().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_end_of_input_closes_factory() {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let factory = ConsoleSessionFactory::from_channel(rx);
        drop(tx);

        let mut session = factory.open(Mode::Online).await.unwrap();
        assert_eq!(session.next_transcript().await.unwrap(), None);
        drop(session);

        assert!(factory.input_closed());
        assert!(matches!(factory.open(Mode::Online).await, Err(AssistantError::MicrophoneUnavailable(_))));
        assert_eq!(factory.media().live(), 0);
    }
}
