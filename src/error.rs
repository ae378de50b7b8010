//! Error types for the readiness quiz.

use std::time::Duration;

use crate::quiz::UserId;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Quiz error: {0}")]
    Quiz(#[from] QuizError),
}

/// Configuration-related errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Channel (transport) errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Rate limited on channel {name}, retry after {retry_after:?}")]
    RateLimited {
        name: String,
        retry_after: Option<Duration>,
    },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Profile lookup failed for user {user_id}: {reason}")]
    ProfileLookup { user_id: UserId, reason: String },
}

impl ChannelError {
    /// Whether retrying the same call might succeed.
    ///
    /// Network-level failures and rate limits are transient; a request the
    /// platform rejected outright (bad chat id, blocked bot) is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::RateLimited { .. })
    }

    /// Server-suggested wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Failures of the quiz session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuizError {
    #[error("No active quiz session for user {user_id}")]
    NoActiveSession { user_id: UserId },

    #[error("Session for user {user_id} is already at step {step}, no question left to answer")]
    InvalidStep { user_id: UserId, step: usize },

    #[error("Step {step} is outside the question bank for user {user_id}")]
    StepOutOfRange { user_id: UserId, step: usize },

    #[error("Invalid answer payload: {payload:?}")]
    InvalidAnswer { payload: String },

    #[error("Malformed event: {reason}")]
    MalformedEvent { reason: String },

    #[error("Stale answer for question {answered}, session for user {user_id} is at {current}")]
    StaleAnswer {
        user_id: UserId,
        answered: usize,
        current: usize,
    },
}

/// Shown when the user presses a button without a running quiz.
pub const START_HINT: &str = "Send /start to begin the quiz.";

/// Shown for malformed events and unexpected failures.
pub const RESTART_APOLOGY: &str =
    "Something went wrong. Please send /start to begin again.";

impl QuizError {
    /// Text to show the user for this failure, if the user should see one.
    ///
    /// This is the only place core failures are turned into user-facing
    /// text. A stale button press is silently acknowledged.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::NoActiveSession { .. } => Some(START_HINT),
            Self::InvalidStep { .. }
            | Self::StepOutOfRange { .. }
            | Self::InvalidAnswer { .. }
            | Self::MalformedEvent { .. } => Some(RESTART_APOLOGY),
            Self::StaleAnswer { .. } => None,
        }
    }
}

/// Result type alias for the quiz.
pub type Result<T> = std::result::Result<T, Error>;
