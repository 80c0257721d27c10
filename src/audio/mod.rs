//! Audio I/O module for microphone capture and speech playback.
//!
//! Cross-platform device access through cpal, with resampling via rubato.

mod capture;
mod playback;
pub mod resampler;
pub mod util;

pub use capture::Capturer;
pub use playback::Player;
