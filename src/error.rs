//! Error types surfaced by the conversation orchestrator.

/// Errors visible to the user of the assistant.
///
/// Backends report failures with `anyhow` and the orchestrator maps them onto
/// one of these variants before they reach the transcript or the console.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// A recognition session or generation call is already active.
    #[error("the assistant is busy with another turn")]
    Busy,

    /// Microphone permission denied or no input device.
    #[error("microphone unavailable: {0}")]
    MicrophoneUnavailable(String),

    /// A capability the current mode needs is not available on this platform.
    #[error("not supported: {0}")]
    Unsupported(String),

    /// Speech recognition failed.
    #[error("speech recognition error: {0}")]
    Recognition(String),

    /// Text generation failed (network error, malformed response).
    #[error("AI processing failed: {0}")]
    Generation(String),

    /// Speech synthesis or playback failed.
    #[error("speech synthesis error: {0}")]
    Synthesis(String),

    /// Online mode was requested while the network is down.
    #[error("network unavailable, staying in offline mode")]
    NetworkUnavailable,

    /// The turn was cancelled by stop or a mode switch.
    #[error("cancelled")]
    Cancelled,
}

impl AssistantError {
    /// Wrap a backend recognition failure, keeping the full context chain.
    pub fn recognition(err: anyhow::Error) -> Self {
        Self::Recognition(format!("{err:#}"))
    }

    /// Wrap a backend generation failure, keeping the full context chain.
    pub fn generation(err: anyhow::Error) -> Self {
        Self::Generation(format!("{err:#}"))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_keeps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("LLM request failed");
        let wrapped = AssistantError::generation(err);
        assert_eq!(wrapped.to_string(), "AI processing failed: LLM request failed: connection refused");
    }
}
