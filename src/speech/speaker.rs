//! Speech output backends.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;

/// Queue generation an utterance was taken from. Stale once the queue is
/// cleared, so a speaker can drop an utterance that lost a race with stop.
#[derive(Debug, Clone)]
pub struct SpeechTicket {
    generation: Arc<AtomicU64>,
    issued: u64,
}

impl SpeechTicket {
    pub(crate) fn new(generation: Arc<AtomicU64>) -> Self {
        let issued = generation.load(Ordering::SeqCst);
        Self { generation, issued }
    }

    pub fn is_cancelled(&self) -> bool {
        self.generation.load(Ordering::SeqCst) != self.issued
    }
}

/// Synthesizes and plays one utterance at a time.
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Speak `text`, returning once playback finished or was cancelled.
    /// Nothing must be played once `ticket` is cancelled.
    async fn speak(&self, text: &str, ticket: &SpeechTicket) -> Result<()>;

    /// Abort the utterance currently playing, if any.
    fn cancel(&self);
}

/// Prints utterances to stdout for the typed console front-end.
#[derive(Debug, Default)]
pub struct ConsoleSpeaker;

#[async_trait]
impl Speaker for ConsoleSpeaker {
    async fn speak(&self, text: &str, ticket: &SpeechTicket) -> Result<()> {
        if ticket.is_cancelled() {
            return Ok(());
        }
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "🔊 {}", text)?;
        stdout.flush()?;
        Ok(())
    }

    fn cancel(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_goes_stale_when_generation_moves() {
        let generation = Arc::new(AtomicU64::new(3));
        let ticket = SpeechTicket::new(generation.clone());
        assert!(!ticket.is_cancelled());

        generation.fetch_add(1, Ordering::SeqCst);
        assert!(ticket.is_cancelled());
        assert!(!SpeechTicket::new(generation).is_cancelled());
    }
}
