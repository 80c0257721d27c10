//! Configuration module for the voice consultation assistant.
//!
//! Provides CLI argument parsing, the operating mode and voice selection.

#[allow(clippy::module_inception)]
mod config;
mod voices;

pub use config::{AppConfig, Mode};
#[cfg(feature = "voice")]
pub use config::Provider;
