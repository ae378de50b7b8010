//! Telegram channel: long-polls the Bot API for updates.
//!
//! Talks to the Bot API directly over `reqwest`: `getUpdates`,
//! `sendMessage` with inline keyboards, `answerCallbackQuery`, `getChat`,
//! `setMyCommands` and `getMe`.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use crate::channels::{
    BotCommand, Channel, EventStream, EventUser, InboundEvent, OutgoingMessage,
};
use crate::error::ChannelError;
use crate::quiz::{UserId, UserProfile};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed poll.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram channel: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString) -> Self {
        Self::with_api_base(bot_token, DEFAULT_API_BASE)
    }

    /// Point the channel at a different Bot API server.
    pub fn with_api_base(bot_token: SecretString, api_base: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()
            .unwrap_or_default();
        Self {
            bot_token,
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.api_base, &self.bot_token, method)
    }

    /// POST a Bot API method and return its `result` field.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        call_api(&self.client, &self.api_url(method), method, body).await
    }
}

fn api_url(api_base: &str, token: &SecretString, method: &str) -> String {
    format!("{api_base}/bot{}/{method}", token.expose_secret())
}

async fn call_api(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    body: &Value,
) -> Result<Value, ChannelError> {
    let resp = client
        .post(url)
        .json(body)
        .send()
        .await
        // Strip the URL: it embeds the bot token.
        .map_err(|e| ChannelError::Http(format!("{method}: {}", e.without_url())))?;

    let status = resp.status();
    let data: Value = resp
        .json()
        .await
        .map_err(|e| ChannelError::Http(format!("{method}: invalid response body: {}", e.without_url())))?;

    interpret_response(method, status.as_u16(), data)
}

/// Map a Bot API reply envelope to a result or a typed error.
fn interpret_response(method: &str, status: u16, data: Value) -> Result<Value, ChannelError> {
    if data.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(data.get("result").cloned().unwrap_or(Value::Null));
    }

    let description = data
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("no description")
        .to_string();
    let error_code = data
        .get("error_code")
        .and_then(Value::as_u64)
        .map(|c| c as u16)
        .unwrap_or(status);

    if error_code == 429 {
        let retry_after = data
            .get("parameters")
            .and_then(|p| p.get("retry_after"))
            .and_then(Value::as_u64)
            .map(Duration::from_secs);
        return Err(ChannelError::RateLimited {
            name: "telegram".into(),
            retry_after,
        });
    }
    if error_code >= 500 {
        return Err(ChannelError::Http(format!(
            "{method} returned {error_code}: {description}"
        )));
    }
    Err(ChannelError::SendFailed {
        name: "telegram".into(),
        reason: format!("{method} returned {error_code}: {description}"),
    })
}

/// Build the sendMessage body, with one keyboard row per button.
fn send_message_body(chat_id: i64, message: &OutgoingMessage) -> Value {
    let mut body = serde_json::json!({
        "chat_id": chat_id,
        "text": message.text,
    });
    if !message.buttons.is_empty() {
        let rows: Vec<Value> = message
            .buttons
            .iter()
            .map(|b| {
                serde_json::json!([{
                    "text": b.label,
                    "callback_data": b.payload,
                }])
            })
            .collect();
        body["reply_markup"] = serde_json::json!({ "inline_keyboard": rows });
    }
    body
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        // Drop updates that piled up while the bot was offline.
        if let Err(e) = self
            .call(
                "deleteWebhook",
                &serde_json::json!({ "drop_pending_updates": true }),
            )
            .await
        {
            tracing::warn!("Telegram: could not drop pending updates: {e}");
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message", "callback_query"]
                });

                let updates = match call_api(&client, &url, "getUpdates", &body).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                        continue;
                    }
                };

                let Some(updates) = updates.as_array() else {
                    continue;
                };

                for update in updates {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(event) = parse_update(update) else {
                        tracing::debug!("Telegram: skipping unsupported update");
                        continue;
                    };

                    if tx.send(event).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = tokio_stream::wrappers::UnboundedReceiverStream::new(rx);
        Ok(Box::pin(stream))
    }

    async fn send_message(
        &self,
        chat_id: i64,
        message: OutgoingMessage,
    ) -> Result<(), ChannelError> {
        let len = message.text.chars().count();
        if len > TELEGRAM_MAX_MESSAGE_LENGTH {
            return Err(ChannelError::InvalidMessage(format!(
                "message of {len} chars exceeds the {TELEGRAM_MAX_MESSAGE_LENGTH} limit"
            )));
        }
        self.call("sendMessage", &send_message_body(chat_id, &message))
            .await?;
        Ok(())
    }

    async fn acknowledge(&self, event: &InboundEvent) -> Result<(), ChannelError> {
        if let crate::channels::EventKind::ButtonChosen {
            callback_id: Some(id),
            ..
        } = &event.kind
        {
            self.call(
                "answerCallbackQuery",
                &serde_json::json!({ "callback_query_id": id }),
            )
            .await?;
        }
        Ok(())
    }

    async fn resolve_profile(&self, user_id: UserId) -> Result<UserProfile, ChannelError> {
        let chat = self
            .call("getChat", &serde_json::json!({ "chat_id": user_id.0 }))
            .await
            .map_err(|e| ChannelError::ProfileLookup {
                user_id,
                reason: e.to_string(),
            })?;
        serde_json::from_value(chat).map_err(|e| ChannelError::ProfileLookup {
            user_id,
            reason: format!("unexpected getChat result: {e}"),
        })
    }

    async fn register_commands(&self, commands: &[BotCommand]) -> Result<(), ChannelError> {
        self.call("setMyCommands", &serde_json::json!({ "commands": commands }))
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.call("getMe", &serde_json::json!({}))
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Update {
    message: Option<TgMessage>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    from: Option<TgUser>,
    chat: Option<TgChat>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: Option<String>,
    from: Option<TgUser>,
    message: Option<TgMessage>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: UserId,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

impl From<TgUser> for EventUser {
    fn from(user: TgUser) -> Self {
        EventUser {
            id: user.id,
            handle: user.username.filter(|u| !u.is_empty()),
        }
    }
}

/// Chat to answer into; private chats fall back to the sender's id.
fn reply_chat_id(chat: Option<TgChat>, user: Option<&EventUser>) -> Option<i64> {
    chat.map(|c| c.id).or_else(|| user.map(|u| u.id.0))
}

/// Turn one getUpdates entry into an event. Updates other than text
/// messages and callback queries are skipped.
fn parse_update(update: &Value) -> Option<InboundEvent> {
    let update = Update::deserialize(update).ok()?;

    if let Some(message) = update.message {
        let user = message.from.map(EventUser::from);
        let chat_id = reply_chat_id(message.chat, user.as_ref())?;
        let text = message.text?;
        return Some(InboundEvent::message("telegram", chat_id, user, &text));
    }

    if let Some(query) = update.callback_query {
        let user = query.from.map(EventUser::from);
        let chat_id = reply_chat_id(query.message.and_then(|m| m.chat), user.as_ref())?;
        return Some(InboundEvent::button(
            "telegram",
            chat_id,
            user,
            query.id,
            query.data,
        ));
    }

    None
}

// ── Tests ───────────────────────────────────────────────────────────
