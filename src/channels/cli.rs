//! CLI channel: stdin/stdout REPL for local testing.
//!
//! Typing `a`, `b` or `c` presses the matching button of the last question.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, EventStream, EventUser, InboundEvent, OutgoingMessage};
use crate::error::ChannelError;
use crate::quiz::{Category, UserId, UserProfile};

/// User id the local terminal user is known by.
pub const CLI_USER_ID: UserId = UserId(1);

/// A simple CLI channel that reads from stdin and writes to stdout.
pub struct CliChannel {
    user: EventUser,
}

impl CliChannel {
    pub fn new() -> Self {
        Self {
            user: EventUser {
                id: CLI_USER_ID,
                handle: std::env::var("USER").ok().filter(|u| !u.is_empty()),
            },
        }
    }

    /// Map one input line to an event.
    fn parse_line(&self, line: &str) -> InboundEvent {
        let chat_id = self.user.id.0;
        let user = Some(self.user.clone());
        let lower = line.to_lowercase();
        if Category::parse(&lower).is_some() {
            InboundEvent::button("cli", chat_id, user, None, Some(lower))
        } else {
            InboundEvent::message("cli", chat_id, user, line)
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a message the way it would look in a chat client.
fn render(chat_id: i64, message: &OutgoingMessage) -> String {
    let mut out = String::new();
    if chat_id != CLI_USER_ID.0 {
        out.push_str(&format!("[to {chat_id}]\n"));
    }
    out.push_str(&message.text);
    for button in &message.buttons {
        out.push_str(&format!("\n  [{}]", button.label));
    }
    out
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let parser = Self {
            user: self.user.clone(),
        };

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            // Print prompt
            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        if tx.send(parser.parse_line(&line)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_message(
        &self,
        chat_id: i64,
        message: OutgoingMessage,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", render(chat_id, &message));
        eprint!("> ");
        Ok(())
    }

    async fn resolve_profile(&self, _user_id: UserId) -> Result<UserProfile, ChannelError> {
        Ok(UserProfile {
            first_name: self.user.handle.clone(),
            last_name: None,
        })
    }
}
