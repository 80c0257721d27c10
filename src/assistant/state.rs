//! Observable assistant state.

use std::fmt;

use crate::config::Mode;

/// Where the current turn is. Speech playback is tracked separately and may
/// continue after the status returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Idle,
    Listening,
    Thinking,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Idle => write!(f, "idle"),
            Status::Listening => write!(f, "listening"),
            Status::Thinking => write!(f, "thinking"),
        }
    }
}

/// Broadcast to front-ends as the conversation progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantEvent {
    StatusChanged(Status),
    ModeChanged(Mode),
    NetworkChanged(bool),
    /// A final transcript was appended as a user turn.
    UserTurn(String),
    /// Text appended to the streaming assistant turn.
    ReplyDelta(String),
    /// The assistant turn finished streaming.
    ReplyFinished,
    /// A failure the user should see.
    Error(String),
}
