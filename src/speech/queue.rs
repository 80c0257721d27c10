//! FIFO speech queue with a single playback worker.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::speaker::{Speaker, SpeechTicket};

/// Counters describing everything the queue has handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpeechStats {
    /// Utterances accepted by `enqueue`.
    pub enqueued: u64,
    /// Utterances handed to the speaker and finished (successfully or not).
    pub played: u64,
    /// Utterances discarded by `clear`, queued or already taken by the worker.
    pub dropped: u64,
}

/// Called with every error a speaker returns.
pub type FailureHandler = Box<dyn Fn(anyhow::Error) + Send + Sync>;

struct QueueInner {
    pending: Mutex<VecDeque<String>>,
    busy: AtomicBool, // A worker is draining the queue
    generation: Arc<AtomicU64>, // Bumped by every clear, under the pending lock
    speaker: Arc<dyn Speaker>,
    on_failure: FailureHandler,
    enqueued: AtomicU64,
    played: AtomicU64,
    dropped: AtomicU64,
    idle: Notify,
}

/// Ordered queue of utterances played strictly one after another.
///
/// Enqueueing never blocks: the first utterance starts a worker task that keeps
/// draining until the queue is empty. The busy flag guarantees a single worker,
/// so two utterances are never played at the same time.
#[derive(Clone)]
pub struct SpeechQueue {
    inner: Arc<QueueInner>,
}

impl SpeechQueue {
    pub fn new(speaker: Arc<dyn Speaker>) -> Self {
        Self::with_failure_handler(speaker, Box::new(|e| warn!("❌ Speech error: {:#}", e)))
    }

    /// Like `new`, but speaker errors go to `on_failure` instead of the log.
    pub fn with_failure_handler(speaker: Arc<dyn Speaker>, on_failure: FailureHandler) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                pending: Mutex::new(VecDeque::new()),
                busy: AtomicBool::new(false),
                generation: Arc::new(AtomicU64::new(0)),
                speaker,
                on_failure,
                enqueued: AtomicU64::new(0),
                played: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Queue an utterance and start playback if nothing is playing.
    /// Blank text is ignored. Must be called from within a Tokio runtime.
    pub fn enqueue(&self, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            return;
        }
        debug!("Queued utterance: \"{}\"", text);
        self.inner.pending.lock().push_back(text);
        self.inner.enqueued.fetch_add(1, Ordering::SeqCst);

        if self.inner.busy.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
            tokio::spawn(drain(self.inner.clone()));
        }
    }

    /// Drop every pending utterance and abort the one playing.
    /// Utterances already taken by the worker are cancelled through their ticket.
    /// Returns the number of utterances discarded.
    pub fn clear(&self) -> usize {
        let discarded = {
            let mut pending = self.inner.pending.lock();
            let n = pending.len();
            pending.clear();
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            n
        };
        self.inner.dropped.fetch_add(discarded as u64, Ordering::SeqCst);
        self.inner.speaker.cancel();
        if discarded > 0 {
            debug!("Discarded {} queued utterance(s)", discarded);
        }
        discarded
    }

    /// Whether an utterance is playing or about to play.
    pub fn is_speaking(&self) -> bool {
        self.inner.busy.load(Ordering::SeqCst)
    }

    /// Number of utterances waiting to be played.
    pub fn pending(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn stats(&self) -> SpeechStats {
        SpeechStats {
            enqueued: self.inner.enqueued.load(Ordering::SeqCst),
            played: self.inner.played.load(Ordering::SeqCst),
            dropped: self.inner.dropped.load(Ordering::SeqCst),
        }
    }

    /// Wait until nothing is queued or playing.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if !self.is_speaking() && self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Worker loop: plays utterances until the queue is empty, then releases the busy flag.
async fn drain(inner: Arc<QueueInner>) {
    loop {
        let next = {
            let mut pending = inner.pending.lock();
            pending.pop_front().map(|text| (text, SpeechTicket::new(inner.generation.clone())))
        };
        match next {
            Some((text, ticket)) => {
                if let Err(e) = inner.speaker.speak(&text, &ticket).await {
                    (inner.on_failure)(e);
                }
                if ticket.is_cancelled() {
                    inner.dropped.fetch_add(1, Ordering::SeqCst);
                } else {
                    inner.played.fetch_add(1, Ordering::SeqCst);
                }
            }
            None => {
                inner.busy.store(false, Ordering::SeqCst);
                // An utterance may have been queued between the pop and the store;
                // if so, take the busy flag back unless another worker already has.
                let refill = !inner.pending.lock().is_empty();
                if !refill || inner.busy.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
                    break;
                }
            }
        }
    }
    inner.idle.notify_waiters();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::testing::{Gate, RecordingSpeaker};
    use std::time::Duration;

    #[tokio::test]
    async fn test_plays_in_fifo_order() {
        let speaker = Arc::new(RecordingSpeaker::with_delay(Duration::from_millis(5)));
        let queue = SpeechQueue::new(speaker.clone());

        for text in ["first", "second", "third"] {
            queue.enqueue(text);
        }
        queue.wait_idle().await;

        assert_eq!(speaker.spoken(), vec!["first", "second", "third"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_plays_two_at_once() {
        let speaker = Arc::new(RecordingSpeaker::with_delay(Duration::from_millis(2)));
        let queue = SpeechQueue::new(speaker.clone());

        let mut producers = Vec::new();
        for p in 0..4 {
            let queue = queue.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..10 {
                    queue.enqueue(format!("p{p}-{i}"));
                    tokio::task::yield_now().await;
                }
            }));
        }
        for producer in producers {
            producer.await.ok();
        }
        queue.wait_idle().await;

        let stats = queue.stats();
        assert_eq!(speaker.max_concurrent(), 1);
        assert_eq!(stats.enqueued, 40);
        assert_eq!(stats.played, stats.enqueued);
        assert_eq!(speaker.spoken().len(), 40);
    }

    #[tokio::test]
    async fn test_blank_text_ignored() {
        let speaker = Arc::new(RecordingSpeaker::default());
        let queue = SpeechQueue::new(speaker.clone());
        queue.enqueue("   ");
        queue.wait_idle().await;
        assert_eq!(queue.stats(), SpeechStats::default());
        assert!(!queue.is_speaking());
    }

    #[tokio::test]
    async fn test_clear_discards_pending_and_cancels() {
        let speaker = Arc::new(RecordingSpeaker::with_delay(Duration::from_secs(30)));
        let queue = SpeechQueue::new(speaker.clone());

        queue.enqueue("one");
        queue.enqueue("two");
        queue.enqueue("three");
        tokio::task::yield_now().await;

        let discarded = queue.clear();
        queue.wait_idle().await;

        assert_eq!(queue.pending(), 0);
        assert!(speaker.cancel_count() >= 1);
        let stats = queue.stats();
        assert_eq!(discarded, 2);
        assert_eq!(stats.played, 0);
        assert_eq!(stats.dropped, stats.enqueued);
    }

    #[tokio::test]
    async fn test_failed_utterance_still_counts_as_played() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        let speaker = Arc::new(RecordingSpeaker::failing());
        let queue = SpeechQueue::with_failure_handler(speaker.clone(), Box::new(move |e| sink.lock().push(format!("{e:#}"))));
        queue.enqueue("a");
        queue.enqueue("b");
        queue.wait_idle().await;
        assert_eq!(queue.stats().played, 2);
        assert_eq!(*failures.lock(), vec!["synthesis failed", "synthesis failed"]);
    }

    #[tokio::test]
    async fn test_clear_after_pop_suppresses_playback() {
        let gate = Arc::new(Gate::default());
        let speaker = Arc::new(RecordingSpeaker::gated(gate.clone()));
        let queue = SpeechQueue::new(speaker.clone());

        queue.enqueue("stale");
        // The worker has popped the utterance but not played it yet
        gate.entered.notified().await;
        assert_eq!(queue.clear(), 0);
        gate.release.notify_one();
        queue.wait_idle().await;

        assert!(speaker.spoken().is_empty());
        let stats = queue.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.played, 0);
    }

    #[tokio::test]
    async fn test_queue_plays_again_after_clear() {
        let speaker = Arc::new(RecordingSpeaker::default());
        let queue = SpeechQueue::new(speaker.clone());

        queue.clear();
        queue.enqueue("fresh");
        queue.wait_idle().await;

        assert_eq!(speaker.spoken(), vec!["fresh"]);
    }
}
