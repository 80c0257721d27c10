//! Turn orchestration: listen, transcribe, generate and speak.
//!
//! One turn runs at a time on its own task. `stop` and mode switches cancel the
//! turn and wait for its task to finish, so the recognition session has been
//! torn down and the generation stream dropped before they return.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::state::{AssistantEvent, Status};
use crate::config::Mode;
use crate::conversation::{ConversationTurn, REPORT_SYSTEM_PROMPT, Transcript, report_prompt};
use crate::error::{AssistantError, Result};
use crate::llm::{Generator, Generators};
use crate::speech::{SentenceChunker, Speaker, SpeechQueue, SpeechStats};
use crate::stt::{MediaGauge, SessionFactory};

/// Events buffered per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 256;

/// Everything the assistant is built from.
pub struct AssistantParts {
    pub sessions: Arc<dyn SessionFactory>,
    pub generators: Generators,
    pub speaker: Arc<dyn Speaker>,
    pub system_prompt: String,
    /// User/assistant exchanges sent to the model with each request
    pub max_history: usize,
    pub mode: Mode,
    pub network_available: bool,
}

struct ActiveTurn {
    id: u64,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

struct State {
    status: Status,
    mode: Mode,
    network_available: bool,
    active: Option<ActiveTurn>,
    last_error: Option<String>,
}

struct Shared {
    state: Mutex<State>,
    transcript: Mutex<Transcript>,
    speech: SpeechQueue,
    sessions: Arc<dyn SessionFactory>,
    generators: Generators,
    system_prompt: String,
    max_history: usize,
    events: broadcast::Sender<AssistantEvent>,
    turn_ended: Notify,
    next_turn: AtomicU64,
}

/// Voice conversation orchestrator. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Assistant {
    shared: Arc<Shared>,
}

impl Assistant {
    pub fn new(parts: AssistantParts) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let failures = events.clone();
        let speech = SpeechQueue::with_failure_handler(
            parts.speaker,
            Box::new(move |e| {
                let failure = AssistantError::Synthesis(format!("{e:#}"));
                error!("❌ {}", failure);
                failures.send(AssistantEvent::Error(failure.to_string())).ok();
            }),
        );
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    status: Status::Idle,
                    mode: parts.mode,
                    network_available: parts.network_available,
                    active: None,
                    last_error: None,
                }),
                transcript: Mutex::new(Transcript::new()),
                speech,
                sessions: parts.sessions,
                generators: parts.generators,
                system_prompt: parts.system_prompt,
                max_history: parts.max_history,
                events,
                turn_ended: Notify::new(),
                next_turn: AtomicU64::new(1),
            }),
        }
    }

    /// Start a turn: open a recognition session for the current mode, wait for
    /// one final transcript, then generate and speak the reply.
    ///
    /// Returns as soon as the turn is running; failures inside the turn are
    /// reported through [`Assistant::last_error`] and an `Error` event.
    ///
    /// # Errors
    /// `Busy` if a turn is already active. Nothing is changed in that case.
    pub fn start_listening(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.active.is_some() {
            debug!("Start ignored: a turn is already active");
            return Err(AssistantError::Busy);
        }

        let id = self.shared.next_turn.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let mode = state.mode;
        state.status = Status::Listening;
        state.last_error = None;

        // The task cannot finish the turn before it is registered: it needs this lock
        let handle = tokio::spawn(run_turn(self.shared.clone(), id, mode, cancel.clone()));
        state.active = Some(ActiveTurn { id, cancel, handle: Some(handle) });
        // Emitted under the lock so it cannot trail the turn's own status events
        self.shared.emit(AssistantEvent::StatusChanged(Status::Listening));
        drop(state);

        info!("🎤 Listening ({} mode)", mode);
        Ok(())
    }

    /// Cancel the active turn, abort speech and clear the speech queue.
    /// Valid from any state; the assistant is `Idle` afterwards.
    pub async fn stop(&self) {
        info!("⏹️ Stop");
        self.end_turn().await;

        let dropped = self.shared.speech.clear();
        if dropped > 0 {
            debug!("Stop dropped {} queued utterance(s)", dropped);
        }
        self.shared.settle_idle();
    }

    /// Switch mode. Any active turn is ended, with full teardown of its
    /// recognition session, before the new mode takes effect. Queued speech
    /// keeps playing.
    pub async fn set_mode(&self, mode: Mode) {
        loop {
            {
                let mut state = self.shared.state.lock();
                if state.mode == mode {
                    return;
                }
                if state.active.is_none() {
                    state.mode = mode;
                    break;
                }
            }
            self.end_turn().await;
        }

        info!("🔁 Switched to {} mode", mode);
        self.shared.emit(AssistantEvent::ModeChanged(mode));
    }

    /// User-driven switch to the other mode.
    ///
    /// # Errors
    /// `NetworkUnavailable` when switching to Online while offline, and
    /// `Unsupported` when no hosted backend is configured.
    pub async fn toggle_mode(&self) -> Result<Mode> {
        let target = match self.mode() {
            Mode::Online => Mode::Offline,
            Mode::Offline => Mode::Online,
        };
        if target == Mode::Online {
            if !self.network_available() {
                return Err(AssistantError::NetworkUnavailable);
            }
            if self.shared.generators.online.is_none() {
                return Err(AssistantError::Unsupported("online mode needs GROQ_API_KEY".into()));
            }
        }
        self.set_mode(target).await;
        Ok(target)
    }

    /// Record a connectivity change. Losing the network forces Offline;
    /// regaining it switches back to Online when a hosted backend exists.
    pub async fn set_network_available(&self, available: bool) {
        let changed = {
            let mut state = self.shared.state.lock();
            std::mem::replace(&mut state.network_available, available) != available
        };
        if !changed {
            return;
        }

        if available {
            info!("🌐 Network available");
        } else {
            warn!("🌐 Network lost");
        }
        self.shared.emit(AssistantEvent::NetworkChanged(available));

        if !available {
            self.set_mode(Mode::Offline).await;
        } else if self.shared.generators.online.is_some() {
            self.set_mode(Mode::Online).await;
        }
    }

    pub fn status(&self) -> Status {
        self.shared.state.lock().status
    }

    pub fn mode(&self) -> Mode {
        self.shared.state.lock().mode
    }

    pub fn network_available(&self) -> bool {
        self.shared.state.lock().network_available
    }

    /// Whether a turn is running (listening, thinking or being cancelled).
    pub fn is_busy(&self) -> bool {
        self.shared.state.lock().active.is_some()
    }

    /// Whether speech is playing or queued.
    pub fn is_speaking(&self) -> bool {
        self.shared.speech.is_speaking()
    }

    pub fn transcript(&self) -> Vec<ConversationTurn> {
        self.shared.transcript.lock().turns().to_vec()
    }

    /// The most recent turn failure, cleared when a new turn starts.
    pub fn last_error(&self) -> Option<String> {
        self.shared.state.lock().last_error.clone()
    }

    pub fn speech_stats(&self) -> SpeechStats {
        self.shared.speech.stats()
    }

    /// Live media handles across every recognition session.
    pub fn media(&self) -> MediaGauge {
        self.shared.sessions.media()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AssistantEvent> {
        self.shared.events.subscribe()
    }

    /// Wait until no turn is active.
    pub async fn wait_turn(&self) {
        loop {
            let notified = self.shared.turn_ended.notified();
            if !self.is_busy() {
                return;
            }
            notified.await;
        }
    }

    /// Wait until all queued speech has played.
    pub async fn wait_speech(&self) {
        self.shared.speech.wait_idle().await;
    }

    /// Summarise the conversation so far as a Markdown health report, using
    /// the current mode's model.
    ///
    /// # Errors
    /// `Generation` if there is nothing to summarise or the model fails.
    pub async fn health_report(&self) -> Result<String> {
        let turns = self.transcript();
        if turns.is_empty() {
            return Err(AssistantError::Generation("there is no conversation to summarise".into()));
        }

        let generator = self.shared.generator(self.mode())?;
        info!("📝 Generating health report with {}", generator.name());

        generator.summarize(REPORT_SYSTEM_PROMPT, &report_prompt(&turns)).await.map_err(AssistantError::generation)
    }

    /// Cancel the active turn and wait for its task to finish.
    async fn end_turn(&self) {
        let (id, handle) = {
            let mut state = self.shared.state.lock();
            match state.active.as_mut() {
                Some(turn) => {
                    turn.cancel.cancel();
                    (turn.id, turn.handle.take())
                }
                None => return,
            }
        };

        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    warn!("Turn {} task failed: {}", id, e);
                }
            }
            // Another caller owns the handle and is already waiting
            None => self.wait_turn().await,
        }

        // No-op unless the task died without finishing its turn
        self.shared.finish_turn(id, Err(AssistantError::Cancelled));
    }
}

impl Shared {
    fn emit(&self, event: AssistantEvent) {
        // No subscribers is fine
        self.events.send(event).ok();
    }

    fn set_status(&self, status: Status) {
        let mut state = self.state.lock();
        if std::mem::replace(&mut state.status, status) != status {
            self.emit(AssistantEvent::StatusChanged(status));
        }
    }

    /// Force `Idle` when no turn is running.
    fn settle_idle(&self) {
        let mut state = self.state.lock();
        if state.active.is_none() && std::mem::replace(&mut state.status, Status::Idle) != Status::Idle {
            self.emit(AssistantEvent::StatusChanged(Status::Idle));
        }
    }

    fn generator(&self, mode: Mode) -> Result<Arc<dyn Generator>> {
        self.generators.for_mode(mode).ok_or_else(|| AssistantError::Unsupported(format!("no {mode} text generator is configured")))
    }

    /// Record the outcome of turn `id` and release it if it is still active.
    fn finish_turn(&self, id: u64, outcome: Result<()>) {
        let failure = match outcome {
            Ok(()) => None,
            Err(AssistantError::Cancelled) => None,
            Err(e) => Some(e.to_string()),
        };

        let released = {
            let mut state = self.state.lock();
            if let Some(message) = &failure {
                error!("❌ {}", message);
                state.last_error = Some(message.clone());
                self.emit(AssistantEvent::Error(message.clone()));
            }
            let current = state.active.as_ref().is_some_and(|turn| turn.id == id);
            if current {
                state.active = None;
                if std::mem::replace(&mut state.status, Status::Idle) != Status::Idle {
                    self.emit(AssistantEvent::StatusChanged(Status::Idle));
                }
            }
            current
        };

        if released {
            debug!("Turn {} finished", id);
            self.turn_ended.notify_waiters();
        }
    }
}

async fn run_turn(shared: Arc<Shared>, id: u64, mode: Mode, cancel: CancellationToken) {
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AssistantError::Cancelled),
        result = take_turn(&shared, mode) => result,
    };
    shared.finish_turn(id, outcome);
}

/// One listening episode followed by the streamed reply.
async fn take_turn(shared: &Shared, mode: Mode) -> Result<()> {
    let heard = {
        let mut session = shared.sessions.open(mode).await?;
        let result = session.next_transcript().await;
        session.teardown();
        result.map_err(AssistantError::recognition)?
    };

    let Some(text) = heard else {
        info!("🎤 Nothing heard");
        return Ok(());
    };

    let history = {
        let mut transcript = shared.transcript.lock();
        transcript.push_user(text.clone());
        transcript.window(shared.max_history).to_vec()
    };
    shared.emit(AssistantEvent::UserTurn(text));
    shared.set_status(Status::Thinking);

    let generator = shared.generator(mode)?;
    info!("🧠 Thinking with {}", generator.name());
    let mut tokens = generator.generate(&shared.system_prompt, &history).await.map_err(AssistantError::generation)?;

    // The assistant turn is opened by the first token, so a failed request
    // leaves no empty turn behind and a failed stream keeps what arrived.
    let mut chunker = SentenceChunker::new();
    while let Some(token) = tokens.next().await {
        let token = token.map_err(AssistantError::generation)?;
        if token.is_empty() {
            continue;
        }
        shared.transcript.lock().append_assistant(&token);
        for sentence in chunker.push(&token) {
            shared.speech.enqueue(sentence);
        }
        shared.emit(AssistantEvent::ReplyDelta(token));
    }
    if let Some(rest) = chunker.finish() {
        shared.speech.enqueue(rest);
    }

    if let Some(reply) = shared.transcript.lock().last() {
        info!("🤖 Assistant: {}", reply.content);
    }
    shared.emit(AssistantEvent::ReplyFinished);
    Ok(())
}
