//! The conversation orchestrator and its observable state.

mod orchestrator;
mod state;

pub use orchestrator::{Assistant, AssistantParts};
pub use state::AssistantEvent;
