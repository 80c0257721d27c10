//! Connectivity detection driving the Online/Offline mode.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::assistant::Assistant;

/// Timeout for a single reachability check.
const CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Checks whether the hosted services can be reached.
#[derive(Clone)]
pub struct ConnectivityCheck {
    client: reqwest::Client,
    url: String,
}

impl ConnectivityCheck {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(CHECK_TIMEOUT).build().context("Failed to create HTTP client")?;
        Ok(Self { client, url: url.into() })
    }

    /// Any HTTP response counts as connected, whatever its status.
    pub async fn check(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(response) => {
                debug!("Connectivity check: HTTP {}", response.status());
                true
            }
            Err(e) => {
                debug!("Connectivity check failed: {}", e);
                false
            }
        }
    }
}

/// Check every `interval` and report the result to the assistant until
/// `shutdown` is cancelled.
pub fn spawn_monitor(connectivity: ConnectivityCheck, assistant: Assistant, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let available = connectivity.check().await;
                    assistant.set_network_available(available).await;
                }
            }
        }
        debug!("Connectivity monitor stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use clap::Parser;
    use tokio::sync::mpsc;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::assistant::AssistantParts;
    use crate::config::{AppConfig, Mode};
    use crate::llm::{Generators, LocalGenerator};
    use crate::speech::ConsoleSpeaker;
    use crate::stt::ConsoleSessionFactory;

    /// A local port with nothing listening on it.
    fn unreachable_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}")
    }

    #[tokio::test]
    async fn test_any_response_counts_as_connected() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD")).respond_with(ResponseTemplate::new(404)).mount(&server).await;

        assert!(ConnectivityCheck::new(server.uri()).unwrap().check().await);
        assert!(!ConnectivityCheck::new(unreachable_url()).unwrap().check().await);
    }

    #[tokio::test]
    async fn test_monitor_forces_offline_when_unreachable() {
        let config = AppConfig::parse_from(["voice-consult"]);
        let local = Arc::new(LocalGenerator::new(&config).unwrap());
        let (_tx, rx) = mpsc::unbounded_channel();
        let assistant = Assistant::new(AssistantParts {
            sessions: Arc::new(ConsoleSessionFactory::from_channel(rx)),
            generators: Generators { online: Some(local.clone()), offline: local },
            speaker: Arc::new(ConsoleSpeaker),
            system_prompt: config.system_prompt.clone(),
            max_history: config.max_history,
            mode: Mode::Online,
            network_available: true,
        });

        let shutdown = CancellationToken::new();
        let connectivity = ConnectivityCheck::new(unreachable_url()).unwrap();
        let monitor = spawn_monitor(connectivity, assistant.clone(), Duration::from_millis(20), shutdown.clone());

        for _ in 0..200 {
            if assistant.mode() == Mode::Offline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(assistant.mode(), Mode::Offline);
        assert!(!assistant.network_available());

        shutdown.cancel();
        monitor.await.unwrap();
    }
}
