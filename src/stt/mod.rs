//! Speech-to-text: recognition sessions and the recognizers behind them.
//!
//! Online mode endpoints the microphone by energy and sends the utterance to a
//! hosted Whisper model. Offline mode runs Silero VAD and a local Whisper model
//! through sherpa-rs. The console factory stands in for the microphone.

#[cfg(feature = "voice")]
mod cloud;
mod console;
#[cfg(feature = "voice")]
mod device;
#[cfg(feature = "voice")]
mod endpoint;
#[cfg(feature = "voice")]
mod local;
pub(crate) mod session;

pub use console::ConsoleSessionFactory;
#[cfg(feature = "voice")]
pub use device::DeviceSessionFactory;
pub use session::{MediaGauge, SessionFactory};
