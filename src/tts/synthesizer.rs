//! Text-to-speech synthesizer using Kokoro models.

use anyhow::Result;
use sherpa_rs::OnnxConfig;
use sherpa_rs::tts::{CommonTtsConfig, KokoroTts, KokoroTtsConfig};
use tracing::{debug, info};

use crate::config::AppConfig;

/// Kokoro output sample rate.
const KOKORO_SAMPLE_RATE: u32 = 24000;

/// Text-to-speech synthesizer using Kokoro models.
pub struct Synthesizer {
    tts: KokoroTts,
    speaker_id: i32,
    speed: f32,
}

impl Synthesizer {
    /// Create a new TTS synthesizer for the configured voice.
    ///
    /// # Errors
    /// Returns an error if TTS initialization fails (e.g., missing model files).
    pub fn new(config: &AppConfig) -> Result<Self> {
        let provider = config.effective_tts_provider();
        let voice = config.voice();
        let tts_dir = config.tts_dir();

        info!("Initializing Kokoro TTS synthesizer with {} provider", provider);
        info!("TTS voice: {} ({}, speaker ID: {})", voice.name, voice.lang, voice.speaker_id);

        let tts_config = KokoroTtsConfig {
            model: tts_dir.join("model.onnx").to_string_lossy().to_string(),
            voices: tts_dir.join("voices.bin").to_string_lossy().to_string(),
            tokens: tts_dir.join("tokens.txt").to_string_lossy().to_string(),
            data_dir: tts_dir.join("espeak-ng-data").to_string_lossy().to_string(),
            dict_dir: tts_dir.join("dict").to_string_lossy().to_string(),
            lexicon: config.tts_lexicon(),
            lang: voice.espeak_language().to_string(),
            length_scale: 1.0 / config.tts_speed, // inverse of speed
            onnx_config: OnnxConfig {
                provider: provider.as_sherpa_provider().to_string(),
                num_threads: config.num_threads.try_into().unwrap_or(2),
                debug: config.verbose,
            },
            common_config: CommonTtsConfig { max_num_sentences: 1, ..Default::default() }, // Kokoro only supports 1
        };

        let tts = KokoroTts::new(tts_config);

        Ok(Self { tts, speaker_id: voice.speaker_id, speed: config.tts_speed })
    }

    /// Synthesize one utterance.
    ///
    /// # Errors
    /// Returns an error if TTS generation fails.
    pub fn synthesize(&mut self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        debug!("Synthesizing: \"{}\"", text);

        let audio = self.tts.create(text, self.speaker_id, self.speed).map_err(|e| anyhow::anyhow!("TTS generation failed: {}", e))?;

        debug!("Generated speech ({} samples)", audio.samples.len());
        Ok(audio.samples)
    }

    /// Get the sample rate of the synthesized audio.
    pub fn sample_rate(&self) -> u32 {
        KOKORO_SAMPLE_RATE
    }
}
