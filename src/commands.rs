//! Typed commands accepted on stdin next to (or instead of) the microphone.

/// A line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Text spoken by the user (console front-end only).
    Utterance(String),
    Command(Command),
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Stop,
    ToggleMode,
    Report,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "Commands: /stop (interrupt the assistant), /mode (switch online/offline), \
/report (health report of the conversation), /status (assistant state), /quit";

/// Classify one line. Lines starting with `/` are commands.
pub fn parse(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(name) = line.strip_prefix('/') else {
        return Some(Input::Utterance(line.to_string()));
    };

    let command = match name.trim().to_ascii_lowercase().as_str() {
        "stop" => Command::Stop,
        "mode" | "toggle" => Command::ToggleMode,
        "report" => Command::Report,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => return Some(Input::Unknown(line.to_string())),
    };
    Some(Input::Command(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_and_utterances() {
        assert_eq!(parse("  "), None);
        assert_eq!(parse(" I have a rash "), Some(Input::Utterance("I have a rash".into())));
        assert_eq!(parse("/MODE"), Some(Input::Command(Command::ToggleMode)));
        assert_eq!(parse("/quit"), Some(Input::Command(Command::Quit)));
        assert_eq!(parse("/status"), Some(Input::Command(Command::Status)));
        assert_eq!(parse("/dance"), Some(Input::Unknown("/dance".into())));
    }
}
