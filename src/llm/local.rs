//! Local generation: streaming chat with a model served by Ollama.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::{StreamExt, future};
use rig::agent::{Agent, MultiTurnStreamItem};
use rig::client::{CompletionClient, Nothing};
use rig::providers::ollama;
use rig::streaming::{StreamedAssistantContent, StreamingChat};
use serde_json::json;
use tracing::{debug, info};

use super::{Generator, TokenStream, split_prompt};
use crate::config::AppConfig;
use crate::conversation::ConversationTurn;

/// Streams replies from a local Ollama model through RIG.
pub struct LocalGenerator {
    client: ollama::Client,
    model: String,
    temperature: f64,
    max_tokens: u64,
}

impl LocalGenerator {
    /// Create the Ollama client.
    ///
    /// # Errors
    /// Returns an error if the client cannot be built.
    pub fn new(config: &AppConfig) -> Result<Self> {
        info!("Connecting to Ollama at {}", config.ollama_url);
        info!("Using local model: {}", config.ollama_model);

        let client = ollama::Client::builder()
            .api_key(Nothing)
            .base_url(config.ollama_url.trim_end_matches('/'))
            .build()
            .context("Failed to create Ollama client")?;

        Ok(Self {
            client,
            model: config.ollama_model.clone(),
            temperature: config.offline_temperature as f64,
            max_tokens: config.max_tokens,
        })
    }

    fn agent(&self, system_prompt: &str) -> Agent<ollama::CompletionModel> {
        self.client
            .agent(&self.model)
            .preamble(system_prompt)
            .temperature(self.temperature)
            .additional_params(json!({ "num_predict": self.max_tokens }))
            .build()
    }
}

#[async_trait]
impl Generator for LocalGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system_prompt: &str, history: &[ConversationTurn]) -> Result<TokenStream> {
        let (prompt, prior) = split_prompt(history)?;
        debug!("Local request with {} prior turns", prior.len());

        let stream = self.agent(system_prompt).stream_chat(prompt, prior).await;

        // Only text deltas are spoken; the first error ends the reply
        let tokens = stream
            .filter_map(|item| {
                future::ready(match item {
                    Ok(MultiTurnStreamItem::StreamAssistantItem(StreamedAssistantContent::Text(text))) => Some(Ok(text.text)),
                    Ok(_) => None,
                    Err(e) => Some(Err(anyhow!("Ollama stream failed: {}", e))),
                })
            })
            .scan(false, |failed, item: Result<String>| {
                if *failed {
                    return future::ready(None);
                }
                *failed = item.is_err();
                future::ready(Some(item))
            });
        Ok(tokens.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(server: &MockServer) -> LocalGenerator {
        let config = AppConfig::parse_from(["voice-consult", "--ollama-url", &server.uri(), "--ollama-model", "test-model"]);
        LocalGenerator::new(&config).unwrap()
    }

    /// A request failure and a stream failure both count as a failed reply.
    async fn reply(generator: &LocalGenerator, history: &[ConversationTurn]) -> Vec<std::result::Result<String, String>> {
        match generator.generate("You are a doctor.", history).await {
            Ok(stream) => stream.map(|item| item.map_err(|e| e.to_string())).collect().await,
            Err(e) => vec![Err(e.to_string())],
        }
    }

    fn chunk(content: &str, done: bool) -> serde_json::Value {
        json!({
            "model": "test-model",
            "created_at": "2026-01-01T00:00:00Z",
            "message": {"role": "assistant", "content": content},
            "done": done
        })
    }

    fn ndjson(lines: &[serde_json::Value]) -> String {
        lines.iter().map(|line| format!("{line}\n")).collect()
    }

    #[tokio::test]
    async fn test_streams_tokens_in_order() {
        let server = MockServer::start().await;
        let body = ndjson(&[chunk("Drink water. ", false), chunk("Rest", false), chunk("", true)]);
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "test-model", "stream": true, "options": {"num_predict": 1024}})))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let tokens = reply(&generator(&server), &[ConversationTurn::user("I have a headache")]).await;
        assert_eq!(tokens, vec![Ok("Drink water. ".to_string()), Ok("Rest".to_string())]);
    }

    #[tokio::test]
    async fn test_system_prompt_leads_history() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"messages": [
                {"role": "system", "content": "You are a doctor."},
                {"role": "user", "content": "I feel dizzy"},
                {"role": "assistant", "content": "Since when?"},
                {"role": "user", "content": "This morning"}
            ]})))
            .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[chunk("", true)])))
            .expect(1)
            .mount(&server)
            .await;

        let history = [ConversationTurn::user("I feel dizzy"), ConversationTurn::assistant("Since when?"), ConversationTurn::user("This morning")];
        assert!(reply(&generator(&server), &history).await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_line_ends_stream_with_error() {
        let server = MockServer::start().await;
        let body = format!("{}not json\n{}", ndjson(&[chunk("Partial", false)]), ndjson(&[chunk("lost", true)]));
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200).set_body_string(body)).mount(&server).await;

        let tokens = reply(&generator(&server), &[ConversationTurn::user("Hi")]).await;
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0], Ok("Partial".to_string()));
        assert!(tokens[1].is_err());
    }

    #[tokio::test]
    async fn test_error_object_and_http_failure() {
        let server = MockServer::start().await;
        Mock::given(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[json!({"error": "model not found"})])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(path("/api/chat")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

        let generator = generator(&server);
        let tokens = reply(&generator, &[ConversationTurn::user("Hi")]).await;
        assert!(matches!(tokens.as_slice(), [Err(_)]));

        let tokens = reply(&generator, &[ConversationTurn::user("Hi")]).await;
        assert!(matches!(tokens.as_slice(), [Err(_)]));
    }

    #[tokio::test]
    async fn test_reply_needs_a_user_turn() {
        let server = MockServer::start().await;
        assert!(generator(&server).generate("You are a doctor.", &[]).await.is_err());
    }
}
