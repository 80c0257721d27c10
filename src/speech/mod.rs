//! Speech output: sentence chunking, the FIFO speech queue and speakers.

mod chunker;
#[cfg(feature = "voice")]
mod kokoro;
mod queue;
mod speaker;
#[cfg(test)]
pub(crate) mod testing;

pub use chunker::SentenceChunker;
#[cfg(feature = "voice")]
pub use kokoro::KokoroSpeaker;
pub use queue::{SpeechQueue, SpeechStats};
pub use speaker::{ConsoleSpeaker, Speaker};
