//! Conversation state: the turn log and the health report.

mod report;
mod transcript;

pub use report::{REPORT_SYSTEM_PROMPT, report_prompt, save_report};
pub use transcript::{ConversationTurn, Role, Transcript};
