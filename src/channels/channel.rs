//! Transport adapter contract.
//!
//! A channel turns platform updates into [`InboundEvent`]s and delivers
//! [`OutgoingMessage`]s. Events for one user must come out of the stream in
//! the order the user produced them; interleaving across users is fine.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;

use crate::error::ChannelError;
use crate::quiz::{UserId, UserProfile};

/// Stream of inbound events from a channel.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// Who sent an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventUser {
    pub id: UserId,
    /// Public handle (username), if the user has one.
    pub handle: Option<String>,
}

/// What kind of event arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A plain chat message (commands included).
    Message { text: String },
    /// An inline button press.
    ButtonChosen {
        /// Platform id used to acknowledge the press.
        callback_id: Option<String>,
        payload: Option<String>,
    },
}

/// One inbound event.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Channel that produced the event.
    pub channel: String,
    /// Chat to reply into.
    pub chat_id: i64,
    /// Sender; `None` when the platform did not identify one.
    pub user: Option<EventUser>,
    pub kind: EventKind,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn message(channel: &str, chat_id: i64, user: Option<EventUser>, text: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id,
            user,
            kind: EventKind::Message {
                text: text.to_string(),
            },
            received_at: Utc::now(),
        }
    }

    pub fn button(
        channel: &str,
        chat_id: i64,
        user: Option<EventUser>,
        callback_id: Option<String>,
        payload: Option<String>,
    ) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id,
            user,
            kind: EventKind::ButtonChosen {
                callback_id,
                payload,
            },
            received_at: Utc::now(),
        }
    }
}

/// An inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    /// Opaque data returned in the press event.
    pub payload: String,
}

/// A message to deliver, optionally with one button per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub buttons: Vec<InlineButton>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_buttons(mut self, buttons: Vec<InlineButton>) -> Self {
        self.buttons = buttons;
        self
    }
}

/// Entry in the platform's command menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotCommand {
    pub command: &'static str,
    pub description: &'static str,
}

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving events.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Deliver a message to a chat.
    async fn send_message(&self, chat_id: i64, message: OutgoingMessage)
    -> Result<(), ChannelError>;

    /// Acknowledge a button press so the client stops waiting.
    async fn acknowledge(&self, _event: &InboundEvent) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Best-effort display name lookup.
    async fn resolve_profile(&self, user_id: UserId) -> Result<UserProfile, ChannelError>;

    /// Publish the command menu.
    async fn register_commands(&self, _commands: &[BotCommand]) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
