//! Speaker backed by the Kokoro synthesizer and the audio player.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::speaker::{Speaker, SpeechTicket};
use crate::audio::Player;
use crate::config::AppConfig;
use crate::tts::Synthesizer;

/// Synthesizes each utterance with Kokoro and plays it on the default output device.
pub struct KokoroSpeaker {
    synthesizer: Arc<Mutex<Synthesizer>>,
    player: Arc<Player>,
}

impl KokoroSpeaker {
    /// Load the synthesizer and open the output device.
    ///
    /// # Errors
    /// Returns an error if the TTS model or the output device cannot be opened.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let synthesizer = Synthesizer::new(config)?;
        let player = Player::new(synthesizer.sample_rate())?;
        Ok(Self { synthesizer: Arc::new(Mutex::new(synthesizer)), player: Arc::new(player) })
    }
}

#[async_trait]
impl Speaker for KokoroSpeaker {
    async fn speak(&self, text: &str, ticket: &SpeechTicket) -> Result<()> {
        let synthesizer = self.synthesizer.clone();
        let player = self.player.clone();
        let text = text.to_string();
        let ticket = ticket.clone();

        // Synthesis and playback both block, keep them off the async workers
        tokio::task::spawn_blocking(move || -> Result<()> {
            let samples = synthesizer.lock().synthesize(&text)?;
            if samples.is_empty() {
                return Ok(());
            }
            // Re-arm first so a clear landing after this point still interrupts
            player.reset_interrupt();
            if ticket.is_cancelled() {
                debug!("Dropped cancelled utterance: \"{}\"", text);
                return Ok(());
            }
            info!("🔊 Speaking: \"{}\" ({} samples)", text, samples.len());
            if !player.play(&samples) {
                debug!("Playback interrupted");
            }
            Ok(())
        })
        .await
        .context("Speech task panicked")?
    }

    fn cancel(&self) {
        self.player.interrupt();
    }
}
