//! Speaker double shared by the speech and assistant tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::speaker::{Speaker, SpeechTicket};

/// Records every utterance and the highest number of overlapping `speak` calls.
#[derive(Default)]
pub struct RecordingSpeaker {
    spoken: Mutex<Vec<String>>,
    delay: Duration,
    fail: bool,
    active: AtomicUsize,
    max_active: AtomicUsize,
    cancels: AtomicUsize,
    cancelled: Notify,
    gate: Option<Arc<Gate>>,
}

/// Holds a `speak` call between being handed the utterance and playing it.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl RecordingSpeaker {
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Default::default() }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    pub fn gated(gate: Arc<Gate>) -> Self {
        Self { gate: Some(gate), ..Default::default() }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Speaker for RecordingSpeaker {
    async fn speak(&self, text: &str, ticket: &SpeechTicket) -> Result<()> {
        let notified = self.cancelled.notified();
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if !ticket.is_cancelled() {
            self.spoken.lock().push(text.to_string());
        }

        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {}
            _ = notified => {}
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("synthesis failed");
        }
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.cancelled.notify_waiters();
    }
}
