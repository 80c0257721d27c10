//! Post-processing of hosted model replies.

use serde_json::Value;

/// Spoken when the model returns nothing usable.
pub const FALLBACK_REPLY: &str = "Sorry, I didn't understand that.";

/// Turn a raw hosted reply into the text to show and speak.
///
/// Markdown code fences are stripped. When what remains is a JSON object with
/// a non-empty `summary` string, that summary is the reply; otherwise the
/// cleaned text is used as is.
pub fn extract_reply(raw: &str) -> String {
    let cleaned = strip_fences(raw);
    if cleaned.is_empty() {
        return FALLBACK_REPLY.to_string();
    }

    match serde_json::from_str::<Value>(&cleaned) {
        Ok(value) => match value.get("summary").and_then(Value::as_str).map(str::trim) {
            Some(summary) if !summary.is_empty() => summary.to_string(),
            _ => cleaned,
        },
        Err(_) => cleaned,
    }
}

fn strip_fences(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.strip_prefix("json").unwrap_or(rest);
    }
    text = text.strip_suffix("```").unwrap_or(text);
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(extract_reply("  How long have you had the fever?\n"), "How long have you had the fever?");
    }

    #[test]
    fn test_fenced_json_uses_summary() {
        let raw = "```json\n{\"summary\": \"Rest and drink fluids.\", \"severity\": \"mild\"}\n```";
        assert_eq!(extract_reply(raw), "Rest and drink fluids.");
    }

    #[test]
    fn test_json_without_summary_keeps_text() {
        assert_eq!(extract_reply("{\"advice\": \"rest\"}"), "{\"advice\": \"rest\"}");
    }

    #[test]
    fn test_empty_reply_falls_back() {
        assert_eq!(extract_reply(""), FALLBACK_REPLY);
        assert_eq!(extract_reply("```\n```"), FALLBACK_REPLY);
    }
}
