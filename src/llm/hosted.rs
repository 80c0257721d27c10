//! Hosted generation on Groq through RIG.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::{Chat, Prompt};
use rig::providers::groq;
use tracing::{debug, info};

use super::reply::extract_reply;
use super::{Generator, TokenStream, split_prompt};
use crate::config::AppConfig;
use crate::conversation::ConversationTurn;

/// Non-streaming chat with a Groq-hosted model. The cleaned reply is
/// emitted as a single chunk.
pub struct HostedGenerator {
    client: groq::Client,
    model: String,
    temperature: f64,
    max_tokens: u64,
}

impl HostedGenerator {
    /// Create the Groq agent.
    ///
    /// # Errors
    /// Returns an error if no API key is configured or the client cannot be built.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let api_key = config.groq_api_key.as_deref().context("GROQ_API_KEY is not set")?;

        info!("Connecting to Groq at {}", config.groq_url);
        info!("Using hosted model: {}", config.groq_model);

        let client = groq::Client::builder().api_key(api_key).base_url(&config.groq_url).build().context("Failed to create Groq client")?;

        Ok(Self { client, model: config.groq_model.clone(), temperature: config.online_temperature as f64, max_tokens: config.max_tokens })
    }

    fn agent(&self, system_prompt: &str) -> Agent<groq::CompletionModel> {
        self.client.agent(&self.model).preamble(system_prompt).temperature(self.temperature).max_tokens(self.max_tokens).build()
    }
}

#[async_trait]
impl Generator for HostedGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system_prompt: &str, history: &[ConversationTurn]) -> Result<TokenStream> {
        let (prompt, prior) = split_prompt(history)?;
        debug!("Hosted request with {} prior turns", prior.len());

        let raw = self.agent(system_prompt).chat(prompt, prior).await.context("LLM request failed")?;
        let reply = extract_reply(&raw);
        debug!("Hosted reply: {}", reply);

        Ok(stream::once(async move { Ok(reply) }).boxed())
    }

    async fn summarize(&self, system_prompt: &str, prompt: &str) -> Result<String> {
        let raw = self.agent(system_prompt).prompt(prompt).await.context("LLM request failed")?;
        Ok(raw.trim().to_string())
    }
}
