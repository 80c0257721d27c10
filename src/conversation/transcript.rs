//! Conversation turns and the append-only transcript.

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Ordered conversation log.
///
/// Turns are only ever appended. The single exception is the last assistant
/// turn, whose content grows in place while its reply is streaming.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished user turn.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::user(content));
    }

    /// Append text to the streaming assistant turn, opening one if the last
    /// turn is not an assistant turn.
    pub fn append_assistant(&mut self, delta: &str) {
        match self.turns.last_mut() {
            Some(turn) if turn.role == Role::Assistant => turn.content.push_str(delta),
            _ => self.turns.push(ConversationTurn::assistant(delta)),
        }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    /// The most recent turns sent to a model: at most `max_exchanges`
    /// user/assistant pairs, always starting on a user turn. The latest user
    /// turn is always included.
    pub fn window(&self, max_exchanges: usize) -> &[ConversationTurn] {
        let max_turns = max_exchanges.max(1).saturating_mul(2);
        let mut start = self.turns.len().saturating_sub(max_turns);
        while start < self.turns.len() && self.turns[start].role != Role::User {
            start += 1;
        }
        if start == self.turns.len()
            && let Some(last_user) = self.turns.iter().rposition(|turn| turn.role == Role::User)
        {
            start = last_user;
        }
        &self.turns[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_mutates_last_assistant_turn() {
        let mut transcript = Transcript::new();
        transcript.push_user("I have a headache");
        transcript.append_assistant("Sorry to ");
        transcript.append_assistant("hear that.");

        assert_eq!(transcript.turns().len(), 2);
        assert_eq!(transcript.last(), Some(&ConversationTurn::assistant("Sorry to hear that.")));
    }

    #[test]
    fn test_new_reply_after_user_turn_opens_new_turn() {
        let mut transcript = Transcript::new();
        transcript.push_user("Hi");
        transcript.append_assistant("Hello.");
        transcript.push_user("My throat hurts");
        transcript.append_assistant("Since when?");

        let roles: Vec<Role> = transcript.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(transcript.turns()[1].content, "Hello.");
    }

    #[test]
    fn test_window_starts_on_user_turn() {
        let mut transcript = Transcript::new();
        for i in 0..4 {
            transcript.push_user(format!("q{i}"));
            transcript.append_assistant(&format!("a{i}"));
        }
        transcript.push_user("q4");

        let window = transcript.window(2);
        assert_eq!(window.first().map(|t| t.content.as_str()), Some("q3"));
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_window_always_carries_pending_user_turn() {
        let mut transcript = Transcript::new();
        transcript.push_user("I have a fever");
        assert_eq!(transcript.window(0), &[ConversationTurn::user("I have a fever")]);

        transcript.append_assistant("How high is it?");
        transcript.push_user("39 degrees");
        let window = transcript.window(0);
        assert_eq!(window.last(), Some(&ConversationTurn::user("39 degrees")));
        assert_eq!(window.first().map(|t| t.role), Some(Role::User));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ConversationTurn::user("hi")).unwrap_or_default();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }
}
