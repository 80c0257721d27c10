//! Health report prompt built from a finished consultation.

use std::path::Path;

use anyhow::{Context, Result};

use super::transcript::{ConversationTurn, Role};

/// System prompt used when summarising a consultation.
pub const REPORT_SYSTEM_PROMPT: &str = "You are a kind and professional virtual doctor who provides helpful summaries in markdown.";

/// Build the user prompt asking for a Markdown health report of `turns`.
pub fn report_prompt(turns: &[ConversationTurn]) -> String {
    let conversation = turns
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{}: {}", speaker, turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a caring virtual doctor summarizing the following conversation between a patient and assistant.\n\
Create a detailed but concise health report in Markdown format covering:\n\n\
- What problem or symptoms the user described\n\
- Any specific details or concerns mentioned\n\
- Suggestions, remedies, or medicines given\n\
- Additional helpful advice based on the conversation\n\n\
Use friendly, easy-to-understand language. Format clearly using headings and bullet points where needed.\n\n\
Conversation:\n{conversation}\n\nReport in markdown:\n"
    )
}

/// Write a finished report to `path` as a Markdown file.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn save_report(path: &Path, report: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, format!("{}\n", report.trim_end())).with_context(|| format!("Failed to write report to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_turns_in_order() {
        let turns = vec![ConversationTurn::user("I feel dizzy"), ConversationTurn::assistant("How long has it lasted?")];
        let prompt = report_prompt(&turns);

        let user = prompt.find("User: I feel dizzy");
        let assistant = prompt.find("Assistant: How long has it lasted?");
        assert!(user.is_some() && assistant.is_some());
        assert!(user < assistant);
        assert!(prompt.ends_with("Report in markdown:\n"));
    }

    #[test]
    fn test_save_report_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("consult.md");

        save_report(&path, "# Health Report\n\n- Mild cold\n\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Health Report\n\n- Mild cold\n");
    }
}
