//! User-facing results.
//!
//! Every checker ends with a finite list of [`Message`]s (error or warning,
//! headline, reasons) collected in a [`Summary`]. The CLI prints them as
//! wrapped text or serialises them as JSON.

use serde::Serialize;

use crate::alphabet::Alphabet;

/// One problem found in a file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub is_error: bool,
    pub message: String,
    pub reasons: Vec<String>,
}

impl Message {
    pub fn error(message: impl Into<String>, reasons: Vec<String>) -> Self {
        Self {
            is_error: true,
            message: message.into(),
            reasons,
        }
    }

    pub fn warning(message: impl Into<String>, reasons: Vec<String>) -> Self {
        Self {
            is_error: false,
            message: message.into(),
            reasons,
        }
    }
}

/// Overall verdict on a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub error: bool,
    pub warning: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alphabet: Option<Alphabet>,
    pub messages: Vec<Message>,
}

impl Summary {
    pub fn add(&mut self, message: Message) {
        if message.is_error {
            self.error = true;
        } else {
            self.warning = true;
        }
        self.messages.push(message);
    }

    pub fn add_error(&mut self, message: impl Into<String>, reasons: Vec<String>) {
        self.add(Message::error(message, reasons));
    }

    pub fn add_warning(&mut self, message: impl Into<String>, reasons: Vec<String>) {
        self.add(Message::warning(message, reasons));
    }

    /// Renders the messages as indented text wrapped to `width` columns.
    pub fn to_text(&self, width: usize) -> String {
        render_messages(&self.messages, width)
    }
}

/// Renders messages as an indented list wrapped to `width` columns.
pub fn render_messages(messages: &[Message], width: usize) -> String {
    let width = width.max(20);
    let mut out = String::new();
    for message in messages {
        let label = if message.is_error { "ERROR" } else { "WARNING" };
        let head = format!("{}: {}", label, message.message);
        let options = textwrap::Options::new(width).subsequent_indent("    ");
        out.push_str(&textwrap::fill(&head, options));
        out.push('\n');
        for reason in &message.reasons {
            let options = textwrap::Options::new(width)
                .initial_indent("  - ")
                .subsequent_indent("    ");
            out.push_str(&textwrap::fill(reason, options));
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_flags() {
        let mut summary = Summary::default();
        summary.add_warning("Potential malformed sequence start", vec![]);
        assert!(summary.warning);
        assert!(!summary.error);
        summary.add_error("No sequences found", vec![]);
        assert!(summary.error);
        assert_eq!(summary.messages.len(), 2);
    }

    #[test]
    fn test_text_wraps_reasons() {
        let mut summary = Summary::default();
        summary.add_error(
            "Junk text found",
            vec!["Junk found before the first sequence on lines 1, 2 and 3 including the characters 'x' and 'y'.".to_string()],
        );
        let text = summary.to_text(40);
        assert!(text.starts_with("ERROR: Junk text found\n  - Junk found"));
        assert!(text.lines().all(|line| line.chars().count() <= 40));
        assert!(text.lines().skip(2).all(|line| line.starts_with("    ")));
    }

    #[test]
    fn test_json_shape() {
        let mut summary = Summary {
            alphabet: Some(Alphabet::Dna),
            ..Summary::default()
        };
        summary.add_warning("Long identifier", vec!["line 3".to_string()]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["alphabet"], "DNA");
        assert_eq!(json["messages"][0]["is_error"], false);
        assert_eq!(json["messages"][0]["reasons"][0], "line 3");
    }
}
