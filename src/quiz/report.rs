//! Result rendering: the user-facing verdict and the chunked operator report.

use serde::Deserialize;

use super::scoring::Tier;
use super::questions::Category;
use super::session::{Session, Tally, UserId};

pub const HIGH_READINESS_MESSAGE: &str = "You are ready to begin your personal transformation. \
     Apply to join our School.";

pub const MEDIUM_READINESS_MESSAGE: &str = "You have potential, and with support you can open up. \
     We will be there. Apply to join:";

pub const LOW_READINESS_MESSAGE: &str = "You may not be ready for the process of personal \
     transformation just yet. Come back when you feel the inner call.";

/// First line of the detailed answers section.
const DETAILS_TITLE: &str = "Detailed answers:";

/// Blank line between report blocks.
const BLOCK_SEPARATOR: &str = "\n\n";

/// Display name fields returned by a profile lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserProfile {
    /// `"first last"` with missing parts dropped.
    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }
}

/// The message a user gets for their tier, followed by the call-to-action link.
pub fn user_result_message(tier: Tier, link: &str) -> String {
    let template = match tier {
        Tier::High => HIGH_READINESS_MESSAGE,
        Tier::Medium => MEDIUM_READINESS_MESSAGE,
        Tier::Low => LOW_READINESS_MESSAGE,
    };
    format!("{template}\n{link}")
}

/// Link to a user's profile: the public handle when known, else a deep link
/// built from the numeric id.
pub fn profile_link(user_id: UserId, handle: Option<&str>) -> String {
    match handle {
        Some(h) => format!("https://t.me/{h}"),
        None => format!("tg://user?id={user_id}"),
    }
}

/// Operator-facing summary of one completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorReport {
    /// Identity and tallies. Always sent as its own first message.
    pub header: String,
    /// One block per answered question, in answer order.
    pub entries: Vec<String>,
}

impl OperatorReport {
    /// Build the report for a session.
    ///
    /// `profile` is `None` when the profile lookup failed; the header then
    /// falls back to the profile link alone.
    pub fn build(session: &Session, profile: Option<&UserProfile>) -> Self {
        let handle = session.display_handle.as_deref();
        let link = profile_link(session.user_id, handle);
        let tally = session.tally();

        let mut header = match profile {
            Some(profile) => {
                let mut h = String::from("New participant completed the quiz:\n\n");
                let name = profile.full_name();
                if !name.is_empty() {
                    h.push_str(&format!("Name: {name}\n"));
                }
                if let Some(handle) = handle {
                    h.push_str(&format!("Username: @{handle}\n"));
                }
                h.push_str(&format!("Profile: {link}"));
                h
            }
            None => format!("Quiz results from {link}"),
        };
        header.push_str(BLOCK_SEPARATOR);
        header.push_str(&tally_lines(&tally));

        let entries = session
            .transcript()
            .iter()
            .map(|rec| {
                format!(
                    "{}\n   Answer: {}) {}",
                    rec.question,
                    rec.category.letter().to_ascii_uppercase(),
                    rec.option_text
                )
            })
            .collect();

        Self { header, entries }
    }

    /// The whole report as one text, for logging when delivery fails.
    pub fn full_text(&self) -> String {
        let mut text = self.header.clone();
        for entry in &self.entries {
            text.push_str(BLOCK_SEPARATOR);
            text.push_str(entry);
        }
        text
    }

    /// Split the report into messages of at most `max_len` chars.
    ///
    /// The header is always the first message. Entries are packed in order
    /// behind a "Detailed answers" title and are never split across two
    /// messages; an entry that could not fit even on its own is truncated.
    pub fn chunks(&self, max_len: usize) -> Vec<String> {
        let mut chunks = vec![truncate_chars(&self.header, max_len)];
        if self.entries.is_empty() {
            return chunks;
        }

        let mut current = String::from(DETAILS_TITLE);
        let mut current_len = char_len(DETAILS_TITLE);
        let mut current_has_entry = false;
        let sep_len = char_len(BLOCK_SEPARATOR);

        for entry in &self.entries {
            let entry = truncate_chars(entry, max_len);
            let entry_len = char_len(&entry);

            if current_len + sep_len + entry_len <= max_len {
                current.push_str(BLOCK_SEPARATOR);
                current.push_str(&entry);
                current_len += sep_len + entry_len;
            } else {
                // Only the title is pending: drop it rather than send it alone.
                if current_has_entry {
                    chunks.push(std::mem::take(&mut current));
                }
                current = entry;
                current_len = entry_len;
            }
            current_has_entry = true;
        }

        chunks.push(current);
        chunks
    }
}

fn tally_lines(tally: &Tally) -> String {
    Category::ALL
        .iter()
        .map(|c| format!("Answers {}: {}", c.letter(), tally.get(*c)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Cut `s` to at most `max` chars, marking the cut with an ellipsis.
fn truncate_chars(s: &str, max: usize) -> String {
    if char_len(s) <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
