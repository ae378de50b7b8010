//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::quiz::{QUESTION_COUNT, UserId};
use crate::quiz::scoring::Thresholds;

/// Operator that receives every completed report unless `ADMIN_ID` is set.
pub const DEFAULT_OPERATOR_ID: i64 = 456_319_202;

/// Call-to-action link appended to every result message.
pub const DEFAULT_CHANNEL_LINK: &str = "https://t.me/+ph_7tRCN12EwNDM0";

/// Telegram's hard per-message limit.
pub const TELEGRAM_HARD_MESSAGE_LIMIT: usize = 4096;

/// Operator report chunk size, kept a little under the hard limit.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 4000;

/// Which transport the binary talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Telegram,
    Cli,
}

/// Quiz bot configuration.
#[derive(Debug, Clone)]
pub struct QuizConfig {
    /// Bot API credential. Only absent for the CLI transport.
    pub bot_token: Option<SecretString>,
    /// Recipient of the per-user result reports.
    pub operator_id: UserId,
    /// Link appended to the user-facing result.
    pub channel_link: String,
    /// Tier thresholds.
    pub thresholds: Thresholds,
    /// Maximum length (in chars) of one operator report message.
    pub max_message_len: usize,
    /// Sessions idle for longer than this are evicted.
    pub session_idle_timeout: Duration,
    /// How often the eviction sweep runs.
    pub prune_interval: Duration,
    /// How often undelivered operator reports are retried.
    pub report_retry_interval: Duration,
    pub transport: TransportKind,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            operator_id: UserId(DEFAULT_OPERATOR_ID),
            channel_link: DEFAULT_CHANNEL_LINK.to_string(),
            thresholds: Thresholds::default(),
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            session_idle_timeout: Duration::from_secs(24 * 3600), // 1 day
            prune_interval: Duration::from_secs(600),             // 10 minutes
            report_retry_interval: Duration::from_secs(60),
            transport: TransportKind::Telegram,
        }
    }
}

impl QuizConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let transport = match get("QUIZ_TRANSPORT").as_deref() {
            None | Some("telegram") => TransportKind::Telegram,
            Some("cli") => TransportKind::Cli,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "QUIZ_TRANSPORT".into(),
                    message: format!("expected 'telegram' or 'cli', got '{other}'"),
                });
            }
        };

        let bot_token = get("BOT_TOKEN").map(SecretString::from);
        if bot_token.is_none() && transport == TransportKind::Telegram {
            return Err(ConfigError::MissingEnvVar("BOT_TOKEN".into()));
        }

        let operator_id = match get("ADMIN_ID") {
            Some(raw) => UserId(parse_value("ADMIN_ID", &raw)?),
            None => defaults.operator_id,
        };

        let channel_link = get("CHANNEL_LINK").unwrap_or(defaults.channel_link);

        let thresholds = Thresholds {
            high: match get("QUIZ_HIGH_THRESHOLD") {
                Some(raw) => parse_threshold("QUIZ_HIGH_THRESHOLD", &raw)?,
                None => defaults.thresholds.high,
            },
            medium: match get("QUIZ_MEDIUM_THRESHOLD") {
                Some(raw) => parse_threshold("QUIZ_MEDIUM_THRESHOLD", &raw)?,
                None => defaults.thresholds.medium,
            },
        };

        let max_message_len = match get("QUIZ_MAX_MESSAGE_LEN") {
            Some(raw) => parse_value("QUIZ_MAX_MESSAGE_LEN", &raw)?,
            None => defaults.max_message_len,
        };
        if max_message_len == 0 || max_message_len > TELEGRAM_HARD_MESSAGE_LIMIT {
            return Err(ConfigError::InvalidValue {
                key: "QUIZ_MAX_MESSAGE_LEN".into(),
                message: format!("must be between 1 and {TELEGRAM_HARD_MESSAGE_LIMIT}"),
            });
        }

        let session_idle_timeout = match get("QUIZ_SESSION_TTL_SECS") {
            Some(raw) => Duration::from_secs(parse_value("QUIZ_SESSION_TTL_SECS", &raw)?),
            None => defaults.session_idle_timeout,
        };

        Ok(Self {
            bot_token,
            operator_id,
            channel_link,
            thresholds,
            max_message_len,
            session_idle_timeout,
            prune_interval: defaults.prune_interval,
            report_retry_interval: defaults.report_retry_interval,
            transport,
        })
    }
}

/// A tier threshold must be reachable with the question bank.
fn parse_threshold(key: &str, raw: &str) -> Result<u32, ConfigError> {
    let value: u32 = parse_value(key, raw)?;
    if value == 0 || value as usize > QUESTION_COUNT {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be between 1 and {QUESTION_COUNT}, got {value}"),
        });
    }
    Ok(value)
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{raw}': {e}"),
    })
}
