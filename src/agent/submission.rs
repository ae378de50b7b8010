//! Submission types: what an inbound event asks the quiz to do.

use crate::channels::EventKind;

/// Parsed intent of an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// `/start`: begin (or restart) the quiz.
    Start,
    /// `/help`: static help text.
    Help,
    /// An answer button press; `payload` is `None` when the platform sent none.
    Answer { payload: Option<String> },
    /// Anything else. Ignored.
    Unrecognized { text: String },
}

/// Parses inbound events into Submission types.
pub struct SubmissionParser;

impl SubmissionParser {
    /// Parse an event into a Submission.
    pub fn parse(kind: &EventKind) -> Submission {
        match kind {
            EventKind::ButtonChosen { payload, .. } => Submission::Answer {
                payload: payload.clone(),
            },
            EventKind::Message { text } => parse_text(text),
        }
    }
}

/// Match a chat command. Accepts the `/cmd@botname` form and ignores any
/// arguments (e.g. deep-link start parameters).
fn parse_text(text: &str) -> Submission {
    let trimmed = text.trim();
    let command = trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .split('@')
        .next()
        .unwrap_or_default()
        .to_lowercase();

    match command.as_str() {
        "/start" => Submission::Start,
        "/help" | "/?" => Submission::Help,
        _ => Submission::Unrecognized {
            text: trimmed.to_string(),
        },
    }
}
