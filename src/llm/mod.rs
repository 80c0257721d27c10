//! Text generation backends.
//!
//! Online mode asks a hosted model on Groq through RIG. Offline mode streams
//! tokens from a local Ollama model. Both yield a [`TokenStream`] that the
//! orchestrator feeds to the transcript and the sentence chunker.

mod hosted;
mod local;
mod reply;

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use rig::message::Message;

use crate::config::Mode;
use crate::conversation::{ConversationTurn, Role};

pub use hosted::HostedGenerator;
pub use local::LocalGenerator;

/// Incremental text emitted by one generation call.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// A text-generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Start generating a reply to `history`, whose last turn is the user's,
    /// under `system_prompt`.
    ///
    /// # Errors
    /// Returns an error if the request cannot be started.
    async fn generate(&self, system_prompt: &str, history: &[ConversationTurn]) -> Result<TokenStream>;

    /// One-shot completion of `prompt`, returned as the model wrote it.
    /// Used for documents such as the health report, which skip any reply
    /// post-processing.
    ///
    /// # Errors
    /// Returns an error if the request or the stream fails.
    async fn summarize(&self, system_prompt: &str, prompt: &str) -> Result<String> {
        let mut tokens = self.generate(system_prompt, &[ConversationTurn::user(prompt)]).await?;
        let mut text = String::new();
        while let Some(token) = tokens.next().await {
            text.push_str(&token?);
        }
        Ok(text.trim().to_string())
    }
}

/// Separate the final user turn from the history that precedes it.
fn split_prompt(history: &[ConversationTurn]) -> Result<(String, Vec<Message>)> {
    let Some((last, prior)) = history.split_last() else {
        bail!("nothing to reply to");
    };
    if last.role != Role::User {
        bail!("the last turn must be the user's");
    }

    let messages = prior
        .iter()
        .map(|turn| match turn.role {
            Role::User => Message::user(turn.content.as_str()),
            Role::Assistant => Message::assistant(turn.content.as_str()),
        })
        .collect();
    Ok((last.content.clone(), messages))
}

/// The generator for each mode. Online is absent without an API key.
#[derive(Clone)]
pub struct Generators {
    pub online: Option<Arc<dyn Generator>>,
    pub offline: Arc<dyn Generator>,
}

impl Generators {
    pub fn for_mode(&self, mode: Mode) -> Option<Arc<dyn Generator>> {
        match mode {
            Mode::Online => self.online.clone(),
            Mode::Offline => Some(self.offline.clone()),
        }
    }
}
