//! Voice Consult - a hands-free virtual doctor.
//!
//! Listens for the patient, transcribes the utterance (hosted Whisper online,
//! Silero VAD plus local Whisper offline), asks a model for a reply (Groq online,
//! Ollama offline) and speaks it sentence by sentence with Kokoro while it streams.
//! The mode follows network connectivity unless forced on the command line.

mod assistant;
#[cfg(feature = "voice")]
mod audio;
mod commands;
mod config;
mod conversation;
mod error;
mod llm;
mod network;
mod speech;
mod stt;
#[cfg(feature = "voice")]
mod tts;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use assistant::{Assistant, AssistantEvent, AssistantParts};
use commands::{Command, Input};
use config::{AppConfig, Mode};
use error::AssistantError;
use llm::{Generator, Generators, HostedGenerator, LocalGenerator};
use network::ConnectivityCheck;
use speech::{ConsoleSpeaker, Speaker};
use stt::{ConsoleSessionFactory, SessionFactory};

/// Pause before listening again after a failed turn.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Build the microphone and speaker for the selected front-end.
fn build_frontend(config: &Arc<AppConfig>, utterances: mpsc::UnboundedReceiver<String>) -> Result<(Arc<dyn SessionFactory>, Arc<dyn Speaker>)> {
    if config.console {
        return Ok((Arc::new(ConsoleSessionFactory::from_channel(utterances)), Arc::new(ConsoleSpeaker)));
    }
    build_voice_frontend(config)
}

#[cfg(feature = "voice")]
fn build_voice_frontend(config: &Arc<AppConfig>) -> Result<(Arc<dyn SessionFactory>, Arc<dyn Speaker>)> {
    let sessions = stt::DeviceSessionFactory::new(config.clone())?;
    let speaker = speech::KokoroSpeaker::new(config)?;
    Ok((Arc::new(sessions), Arc::new(speaker)))
}

#[cfg(not(feature = "voice"))]
fn build_voice_frontend(_config: &Arc<AppConfig>) -> Result<(Arc<dyn SessionFactory>, Arc<dyn Speaker>)> {
    anyhow::bail!("Built without the 'voice' feature, run with --console")
}

/// Hands-free loop: listen, let the reply finish playing, listen again.
async fn conversation_loop(assistant: Assistant, shutdown: CancellationToken) {
    let mut events = assistant.subscribe();

    while !shutdown.is_cancelled() {
        match assistant.start_listening() {
            Ok(()) | Err(AssistantError::Busy) => {}
            Err(e) => warn!("Could not start listening: {}", e),
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = assistant.wait_turn() => {}
        }
        // Keep the microphone closed while the reply plays
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = assistant.wait_speech() => {}
        }

        if turn_failed(&mut events) {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(RETRY_DELAY) => {}
            }
        }
    }
    debug!("Conversation loop stopped");
}

/// Drain pending events, reporting whether any of them was an error.
fn turn_failed(events: &mut broadcast::Receiver<AssistantEvent>) -> bool {
    let mut failed = false;
    loop {
        match events.try_recv() {
            Ok(AssistantEvent::Error(_)) => failed = true,
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => return failed,
        }
    }
}

/// Read stdin lines on a dedicated thread so a pending read never holds up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let failed = line.is_err();
            if tx.send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

/// Handle console input: commands are run here, other lines become utterances
/// when the console front-end is active. End of input ends a console session.
fn spawn_input_task(assistant: Assistant, config: Arc<AppConfig>, utterances: mpsc::UnboundedSender<String>, shutdown: CancellationToken) -> JoinHandle<()> {
    let mut lines = spawn_stdin_reader();
    tokio::spawn(async move {
        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.recv() => line,
            };
            let line = match line {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
                None => {
                    debug!("Console input closed");
                    if config.console {
                        shutdown.cancel();
                    }
                    break;
                }
            };

            match commands::parse(&line) {
                None => {}
                Some(Input::Utterance(text)) if config.console => {
                    utterances.send(text).ok();
                }
                Some(Input::Utterance(_)) | Some(Input::Unknown(_)) => warn!("Unknown input, type /help for commands"),
                Some(Input::Command(command)) => {
                    if run_command(command, &assistant, &config, &shutdown).await {
                        break;
                    }
                }
            }
        }
    })
}

/// Returns true when the command ends the session.
async fn run_command(command: Command, assistant: &Assistant, config: &AppConfig, shutdown: &CancellationToken) -> bool {
    match command {
        Command::Stop => assistant.stop().await,
        Command::ToggleMode => match assistant.toggle_mode().await {
            Ok(mode) => info!("🔁 Now in {} mode", mode),
            Err(e) => warn!("⚠️ {}", e),
        },
        Command::Report => {
            if let Err(e) = write_report(assistant, config).await {
                error!("❌ Report failed: {:#}", e);
            }
        }
        Command::Status => {
            info!(
                "📋 Status: {}, {} mode, network {}, speaking: {}, open sessions: {}",
                assistant.status(),
                assistant.mode(),
                if assistant.network_available() { "up" } else { "down" },
                assistant.is_speaking(),
                assistant.media().live()
            );
            if let Some(e) = assistant.last_error() {
                info!("Last error: {}", e);
            }
        }
        Command::Help => info!("{}", commands::HELP),
        Command::Quit => {
            shutdown.cancel();
            return true;
        }
    }
    false
}

/// Generate the health report and print it, saving it when `--report` is set.
async fn write_report(assistant: &Assistant, config: &AppConfig) -> Result<()> {
    let report = assistant.health_report().await?;
    println!("\n{}\n", report);

    if let Some(path) = &config.report {
        conversation::save_report(path, &report)?;
        info!("📝 Health report saved to {}", path.display());
    }
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM) or a shutdown request.
async fn wait_for_shutdown(shutdown: CancellationToken) {
    let terminate = async {
        #[cfg(unix)]
        {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Failed to register SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("🛑 Received Ctrl+C, shutting down..."),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        },
        _ = terminate => info!("🛑 Received SIGTERM, shutting down..."),
        _ = shutdown.cancelled() => info!("🛑 Shutting down..."),
    }

    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let config = AppConfig::from_args();

    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(if config.verbose { "debug" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    info!("🩺 Voice Consult v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        if !config.console {
            error!("Download the Whisper, Silero VAD and Kokoro models into the model directory, or use --console.");
        }
        std::process::exit(1);
    }
    config.log_config();
    let config = Arc::new(config);

    // Text generation for both modes
    let online: Option<Arc<dyn Generator>> = match config.groq_api_key.as_deref() {
        Some(key) if !key.is_empty() => Some(Arc::new(HostedGenerator::new(&config)?)),
        _ => None,
    };
    let generators = Generators { online, offline: Arc::new(LocalGenerator::new(&config)?) };

    let (utterance_tx, utterance_rx) = mpsc::unbounded_channel();
    let (sessions, speaker) = build_frontend(&config, utterance_rx)?;

    // Initial mode: forced, or from a first connectivity check
    let connectivity = ConnectivityCheck::new(config.connectivity_url.as_str())?;
    let network_available = connectivity.check().await;
    let mode = config.mode.unwrap_or(if network_available && generators.online.is_some() { Mode::Online } else { Mode::Offline });
    info!("Starting in {} mode (network {})", mode, if network_available { "up" } else { "down" });

    let assistant = Assistant::new(AssistantParts {
        sessions,
        generators,
        speaker,
        system_prompt: config.system_prompt.clone(),
        max_history: config.max_history,
        mode,
        network_available,
    });

    let shutdown = CancellationToken::new();
    let monitor = if config.mode.is_none() {
        Some(network::spawn_monitor(connectivity, assistant.clone(), Duration::from_secs(config.connectivity_interval_secs), shutdown.clone()))
    } else {
        None
    };
    let input = spawn_input_task(assistant.clone(), config.clone(), utterance_tx, shutdown.clone());
    let conversation = tokio::spawn(conversation_loop(assistant.clone(), shutdown.clone()));

    info!("{}", commands::HELP);
    wait_for_shutdown(shutdown).await;

    // Ends the active turn with full teardown and silences speech
    assistant.stop().await;

    let graceful_timeout = Duration::from_millis(500);
    if tokio::time::timeout(graceful_timeout, conversation).await.is_err() {
        debug!("Conversation loop didn't finish in time");
    }
    if let Some(monitor) = monitor
        && tokio::time::timeout(graceful_timeout, monitor).await.is_err()
    {
        debug!("Connectivity monitor didn't finish in time");
    }
    if tokio::time::timeout(graceful_timeout, input).await.is_err() {
        debug!("Input task didn't finish in time");
    }

    if config.report.is_some() && !assistant.transcript().is_empty() {
        if let Err(e) = write_report(&assistant, &config).await {
            error!("❌ Report failed: {:#}", e);
        }
    }

    let stats = assistant.speech_stats();
    info!("Conversation: {} turns, {} utterances spoken", assistant.transcript().len(), stats.played);
    info!("✅ Voice Consult stopped");
    Ok(())
}
