//! Input classification.
//!
//! Raw input is either ordinary chat or an assistant command: trimmed text
//! that starts with `/ai`, compared case-insensitively.

/// Command prefix that routes input to the assistant.
pub const AI_PREFIX: &str = "/ai";

/// Classified user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Ordinary chat text.
    Chat,
    /// An assistant command. `prompt` may be empty for a bare `/ai`.
    Ask {
        /// Text after the prefix, with leading whitespace removed.
        prompt: &'a str,
    },
}

impl<'a> Command<'a> {
    /// Whether the input starts with the assistant prefix.
    #[must_use]
    pub const fn is_ai_command(&self) -> bool {
        matches!(self, Self::Ask { .. })
    }

    /// The assistant prompt, if this is an assistant command.
    #[must_use]
    pub const fn prompt(&self) -> Option<&'a str> {
        match self {
            Self::Ask { prompt } => Some(*prompt),
            Self::Chat => None,
        }
    }
}

/// Classify raw input text.
#[must_use]
pub fn parse(raw: &str) -> Command<'_> {
    let trimmed = raw.trim();
    match trimmed.get(..AI_PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(AI_PREFIX) => Command::Ask {
            prompt: trimmed[AI_PREFIX.len()..].trim_start(),
        },
        _ => Command::Chat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_command_with_question() {
        let command = parse("/ai what is 2+2");
        assert!(command.is_ai_command());
        assert_eq!(command.prompt(), Some("what is 2+2"));
    }

    #[test]
    fn bare_prefix_has_empty_prompt() {
        assert_eq!(parse("/AI "), Command::Ask { prompt: "" });
        assert_eq!(parse("/ai"), Command::Ask { prompt: "" });
    }

    #[test]
    fn plain_text_is_chat() {
        let command = parse("hello there");
        assert!(!command.is_ai_command());
        assert_eq!(command.prompt(), None);
    }

    #[test]
    fn prefix_is_case_insensitive_and_trimmed() {
        assert_eq!(parse("  /Ai   explain\tthis  "), Command::Ask { prompt: "explain\tthis" });
    }

    #[test]
    fn prefix_must_lead() {
        assert_eq!(parse("ask /ai something"), Command::Chat);
        assert_eq!(parse("/a"), Command::Chat);
        assert_eq!(parse(""), Command::Chat);
    }

    #[test]
    fn prefix_glued_to_text() {
        assert_eq!(parse("/aiwhy"), Command::Ask { prompt: "why" });
    }

    #[test]
    fn multibyte_input_does_not_panic() {
        assert_eq!(parse("é/ai"), Command::Chat);
        assert_eq!(parse("日本語"), Command::Chat);
    }
}
