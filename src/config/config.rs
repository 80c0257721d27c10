//! Application configuration and CLI argument parsing.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::voices::{self, Voice};

/// Default system prompt for the virtual doctor persona.
const DOCTOR_PROMPT: &str = "You are a caring and professional virtual doctor. \
Speak naturally and conversationally, like a friendly doctor talking with a patient. \
Keep your answers clear, concise, easy to understand and under 2-3 sentences. \
Do not use any special characters, asterisks, brackets, or symbols in your responses. \
When appropriate, gently suggest common over-the-counter medicines or home remedies, but avoid prescribing strong medications. \
Always ask follow-up questions naturally to understand the patient's condition better. \
Do not generate medical reports, formal diagnoses, or any written documentation. \
If the patient asks non-medical questions, politely remind them that you can only assist with health concerns. \
Keep your tone warm, respectful, and empathetic at all times.";

/// Operating mode of the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Hosted transcription and hosted model (needs network)
    #[default]
    Online,
    /// Local recognizer and local model
    Offline,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Online => write!(f, "online"),
            Mode::Offline => write!(f, "offline"),
        }
    }
}

/// Hardware acceleration provider for ONNX models.
/// Auto-detected based on platform if not specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// CPU inference (default fallback, always available)
    #[default]
    Cpu,
    /// NVIDIA CUDA acceleration (Linux only)
    Cuda,
    /// Apple CoreML acceleration (macOS only)
    #[value(name = "coreml")]
    CoreMl,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sherpa_provider())
    }
}

impl Provider {
    /// Provider string understood by sherpa-rs.
    pub fn as_sherpa_provider(&self) -> &'static str {
        match self {
            Provider::Cpu => "cpu",
            Provider::Cuda => "cuda",
            Provider::CoreMl => "coreml",
        }
    }
}

/// Voice consultation assistant configuration.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "voice-consult")]
#[command(author, version, about = "A hands-free virtual doctor voice assistant", long_about = None)]
pub struct AppConfig {
    /// List all available TTS voices and exit
    #[arg(long)]
    pub list_voices: bool,

    /// Use the typed console front-end instead of microphone and speaker
    #[arg(long)]
    pub console: bool,

    /// Force an operating mode (default: follow network connectivity)
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Directory containing local model files (Whisper, VAD, TTS)
    #[arg(long, short = 'd', env = "MODEL_DIR", default_value_os_t = default_model_dir())]
    pub model_dir: PathBuf,

    /// Audio sample rate for speech recognition
    #[arg(long, default_value = "16000")]
    #[cfg_attr(not(feature = "voice"), allow(dead_code))] // Read by the microphone front-end
    pub sample_rate: u32,

    /// Voice activity detection threshold for the offline recognizer (0.0 - 1.0)
    #[arg(long, default_value = "0.5")]
    pub vad_threshold: f32,

    /// VAD silence duration in seconds before a segment is closed
    #[arg(long, default_value = "0.8")]
    #[cfg_attr(not(feature = "voice"), allow(dead_code))]
    pub vad_silence_duration: f32,

    /// RMS level above which audio counts as speech for online endpointing
    #[arg(long, default_value = "0.015")]
    pub endpoint_threshold: f32,

    /// Trailing silence in milliseconds that ends an online utterance
    #[arg(long, default_value = "900")]
    #[cfg_attr(not(feature = "voice"), allow(dead_code))]
    pub endpoint_silence_ms: u64,

    /// Maximum listening time in seconds for one online utterance
    #[arg(long, default_value = "15")]
    #[cfg_attr(not(feature = "voice"), allow(dead_code))]
    pub max_listen_secs: u64,

    /// Groq API key (required for online mode)
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub groq_api_key: Option<String>,

    /// Groq API base URL
    #[arg(long, env = "GROQ_URL", default_value = "https://api.groq.com/openai/v1")]
    pub groq_url: String,

    /// Hosted chat model
    #[arg(long, env = "GROQ_MODEL", default_value = "meta-llama/llama-4-scout-17b-16e-instruct")]
    pub groq_model: String,

    /// Hosted transcription model
    #[arg(long, default_value = "whisper-large-v3-turbo")]
    pub transcription_model: String,

    /// Ollama API URL for the local model
    #[arg(long, short = 'u', env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    pub ollama_url: String,

    /// Local model name
    #[arg(long, short = 'm', env = "OLLAMA_MODEL", default_value = "llama3.2:3b")]
    pub ollama_model: String,

    /// System prompt for both models
    #[arg(long, short = 'p', default_value = DOCTOR_PROMPT)]
    pub system_prompt: String,

    /// Hosted model temperature (0.0-2.0)
    #[arg(long, default_value = "1.0", value_parser = parse_temperature)]
    pub online_temperature: f32,

    /// Local model temperature (0.0-2.0)
    #[arg(long, default_value = "0.8", value_parser = parse_temperature)]
    pub offline_temperature: f32,

    /// Maximum tokens per reply
    #[arg(long, default_value = "1024")]
    pub max_tokens: u64,

    /// Maximum number of conversation exchanges sent to the model
    #[arg(long, default_value = "10")]
    pub max_history: usize,

    /// Conversation language tag (e.g., en-US, en-GB, es-ES, hi-IN)
    #[arg(long, short = 'l', default_value = "en-US")]
    pub language: String,

    /// Preferred TTS voice name (default: first voice matching --language)
    #[arg(long)]
    pub tts_voice: Option<String>,

    /// Text-to-speech speed multiplier
    #[arg(long, default_value = "0.93")]
    pub tts_speed: f32,

    /// Hardware acceleration provider (auto-detected if not specified)
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    /// Provider for STT (overrides --provider for speech recognition)
    #[arg(long, value_enum)]
    pub stt_provider: Option<Provider>,

    /// Provider for TTS (overrides --provider for speech synthesis)
    #[arg(long, value_enum)]
    pub tts_provider: Option<Provider>,

    /// Number of threads for all local models (0 = auto-detect)
    #[arg(long, default_value = "0")]
    pub num_threads: usize,

    /// URL checked to decide whether the network is reachable
    #[arg(long, env = "CONNECTIVITY_URL", default_value = "https://api.groq.com")]
    pub connectivity_url: String,

    /// Seconds between connectivity checks
    #[arg(long, default_value = "5")]
    pub connectivity_interval_secs: u64,

    /// Write a Markdown health report of the consultation to this file on exit
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        let mut config = Self::parse();

        if config.list_voices {
            voices::print_voices();
            std::process::exit(0);
        }

        config.normalize_thread_count();
        config
    }

    /// Resolve the thread count for local models.
    ///
    /// With CUDA the GPU handles parallelism, so a single CPU thread avoids
    /// contention. On CPU a third of the cores leaves room for capture and playback.
    fn normalize_thread_count(&mut self) {
        if self.num_threads != 0 {
            return;
        }
        let using_cuda = self.effective_stt_provider() == Provider::Cuda || self.effective_tts_provider() == Provider::Cuda;
        self.num_threads = if using_cuda { 1 } else { (num_cpus::get() / 3).max(1) };
    }

    /// Get the effective STT provider.
    pub fn effective_stt_provider(&self) -> Provider {
        self.stt_provider.or(self.provider).unwrap_or_else(detect_provider)
    }

    /// Get the effective TTS provider.
    pub fn effective_tts_provider(&self) -> Provider {
        self.tts_provider.or(self.provider).unwrap_or_else(detect_provider)
    }

    /// Voice used for synthesis, honoring the preferred name and language.
    pub fn voice(&self) -> &'static Voice {
        voices::select_voice(self.tts_voice.as_deref(), &self.language)
    }

    /// Whisper language code derived from the conversation language tag.
    /// Returns an empty string (auto-detection) for "auto".
    pub fn stt_language(&self) -> String {
        if self.language.eq_ignore_ascii_case("auto") {
            return String::new();
        }
        self.language.split(['-', '_']).next().unwrap_or_default().to_ascii_lowercase()
    }

    /// Get the path to the Whisper encoder model (multilingual).
    pub fn whisper_encoder_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-encoder.int8.onnx")
    }

    /// Get the path to the Whisper decoder model (multilingual).
    pub fn whisper_decoder_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-decoder.int8.onnx")
    }

    /// Get the path to the Whisper tokens file (multilingual).
    pub fn whisper_tokens_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-tokens.txt")
    }

    /// Get the path to the VAD model.
    pub fn vad_model_path(&self) -> PathBuf {
        self.model_dir.join("silero_vad.onnx")
    }

    /// Directory of the Kokoro multi-language model.
    pub fn tts_dir(&self) -> PathBuf {
        self.model_dir.join("tts").join("kokoro-multi-lang-v1_0")
    }

    /// Lexicon files for the selected voice (empty for espeak-only languages).
    pub fn tts_lexicon(&self) -> String {
        self.voice()
            .lexicons()
            .iter()
            .map(|name| self.tts_dir().join(name).to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Local model files required when offline recognition and synthesis are enabled.
    pub fn local_model_files(&self) -> Vec<PathBuf> {
        let tts_dir = self.tts_dir();
        vec![
            self.whisper_encoder_path(),
            self.whisper_decoder_path(),
            self.whisper_tokens_path(),
            self.vad_model_path(),
            tts_dir.join("model.onnx"),
            tts_dir.join("voices.bin"),
            tts_dir.join("tokens.txt"),
        ]
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns an error for out-of-range values, a forced online mode without
    /// an API key, or missing local model files when voice I/O is enabled.
    pub fn validate(&self) -> Result<()> {
        if self.groq_api_key.as_deref().is_none_or(str::is_empty) {
            match self.mode {
                Some(Mode::Online) => anyhow::bail!("GROQ_API_KEY is required for online mode"),
                None => warn!("GROQ_API_KEY not set, running in offline mode only"),
                Some(Mode::Offline) => {}
            }
        }

        if !(0.0..=1.0).contains(&self.vad_threshold) {
            anyhow::bail!("VAD threshold must be between 0.0 and 1.0");
        }

        if self.endpoint_threshold <= 0.0 {
            anyhow::bail!("Endpoint threshold must be positive");
        }

        if self.tts_speed <= 0.0 {
            anyhow::bail!("TTS speed must be positive");
        }

        if self.max_history == 0 {
            anyhow::bail!("Max history must be at least one exchange");
        }

        if self.connectivity_interval_secs == 0 {
            anyhow::bail!("Connectivity interval must be at least one second");
        }

        if !self.console {
            if !cfg!(feature = "voice") {
                anyhow::bail!("Built without the 'voice' feature, run with --console");
            }
            if !self.model_dir.exists() {
                anyhow::bail!("Model directory does not exist: {}", self.model_dir.display());
            }
            for path in self.local_model_files() {
                if !path.exists() {
                    anyhow::bail!("Required model file not found: {}", path.display());
                }
            }
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        match self.mode {
            Some(mode) => info!("  Mode: {} (forced)", mode),
            None => info!("  Mode: auto (probing {} every {}s)", self.connectivity_url, self.connectivity_interval_secs),
        }
        info!("  Front-end: {}", if self.console { "console" } else { "voice" });
        info!("  Hosted model: {} at {}", self.groq_model, self.groq_url);
        info!("  Transcription model: {}", self.transcription_model);
        info!("  Local model: {} at {}", self.ollama_model, self.ollama_url);
        info!("  System prompt: {}...", &self.system_prompt.chars().take(50).collect::<String>());
        info!("  Language: {}", self.language);
        if !self.console {
            let voice = self.voice();
            info!("  Model directory: {}", self.model_dir.display());
            info!("  TTS voice: {} (speaker ID: {})", voice.name, voice.speaker_id);
            info!("  TTS speed: {}", self.tts_speed);
            info!("  STT provider: {}", self.effective_stt_provider());
            info!("  TTS provider: {}", self.effective_tts_provider());
        }
        if let Some(ref report) = self.report {
            info!("  Report: {}", report.display());
        }
    }
}

/// Get the default model directory (~/.voice-consult/models).
fn default_model_dir() -> PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        home_dir.join(".voice-consult").join("models")
    } else {
        PathBuf::from("models")
    }
}

/// Auto-detect the best hardware acceleration provider.
fn detect_provider() -> Provider {
    #[cfg(target_os = "macos")]
    {
        Provider::CoreMl
    }

    #[cfg(target_os = "linux")]
    {
        if has_nvidia_gpu() { Provider::Cuda } else { Provider::Cpu }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Provider::Cpu
    }
}

/// Check if an NVIDIA GPU is available (Linux only).
#[cfg(target_os = "linux")]
fn has_nvidia_gpu() -> bool {
    use std::path::Path;

    // Desktop GPUs, then Jetson devices
    ["/dev/nvidia0", "/dev/nvidiactl", "/dev/nvhost-ctrl", "/dev/nvhost-ctrl-gpu", "/etc/nv_tegra_release"]
        .iter()
        .any(|path| Path::new(path).exists())
}

/// Parse and validate temperature value (0.0-2.0).
fn parse_temperature(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("'{}' is not a valid float", s))?;
    if (0.0..=2.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("temperature must be between 0.0 and 2.0, got {}", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> AppConfig {
        let mut argv = vec!["voice-consult"];
        argv.extend_from_slice(args);
        AppConfig::parse_from(argv)
    }

    #[test]
    fn test_defaults_follow_connectivity() {
        let config = parse(&["--console"]);
        assert_eq!(config.mode, None);
        assert_eq!(config.language, "en-US");
        assert_eq!(config.online_temperature, 1.0);
        assert_eq!(config.offline_temperature, 0.8);
    }

    #[test]
    fn test_stt_language_from_tag() {
        assert_eq!(parse(&["--language", "hi-IN"]).stt_language(), "hi");
        assert_eq!(parse(&["--language", "en_GB"]).stt_language(), "en");
        assert_eq!(parse(&["--language", "auto"]).stt_language(), "");
    }

    #[test]
    fn test_temperature_out_of_range_rejected() {
        let result = AppConfig::try_parse_from(["voice-consult", "--online-temperature", "2.5"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_forced_online_requires_api_key() {
        let mut config = parse(&["--console", "--mode", "online"]);
        config.groq_api_key = None;
        assert!(config.validate().is_err());

        config.groq_api_key = Some("gsk_test".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_console_offline_needs_no_models() {
        let mut config = parse(&["--console", "--mode", "offline", "--model-dir", "/nonexistent"]);
        config.groq_api_key = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_history_rejected() {
        let mut config = parse(&["--console", "--mode", "offline", "--max-history", "0"]);
        config.groq_api_key = None;
        assert!(config.validate().is_err());

        config.max_history = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lexicon_for_british_voice() {
        let config = parse(&["--language", "en-GB", "--model-dir", "/models"]);
        assert!(config.tts_lexicon().ends_with("lexicon-gb-en.txt"));
    }
}
