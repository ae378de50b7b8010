//! Main agent loop: event dispatch, result delivery and error replies.
//!
//! Events are handled one at a time in arrival order, which keeps each
//! user's events strictly sequential. Every per-event failure is turned
//! into at most one user-facing message here and never ends the loop.

use std::sync::Arc;

use futures::StreamExt;

use crate::agent::submission::{Submission, SubmissionParser};
use crate::channels::{
    BotCommand, Channel, EventKind, EventUser, InboundEvent, InlineButton, OutgoingMessage,
};
use crate::config::QuizConfig;
use crate::error::{ChannelError, Error, QuizError, RESTART_APOLOGY};
use crate::quiz::report::user_result_message;
use crate::quiz::store::spawn_prune_task;
use crate::quiz::{
    Answer, AnswerOutcome, CompletedQuiz, OperatorReport, QUESTION_COUNT, Question,
    QuizEngine, Session, SessionStore,
};
use crate::retry::RetryPolicy;

pub const WELCOME_MESSAGE: &str = "Hi. Answer 10 short questions and we'll find out \
     whether you are ready for transformation.";

pub const HELP_TEXT: &str = "This bot runs a test of your readiness for personal \
     transformation.\n\n\
     Commands:\n\
     /start - Begin the test\n\
     /help - Show this help\n\n\
     The test has 10 questions. When you finish you will get personal feedback.";

/// Command menu published at startup.
pub const COMMANDS: [BotCommand; 2] = [
    BotCommand {
        command: "start",
        description: "Begin test",
    },
    BotCommand {
        command: "help",
        description: "Show help",
    },
];

/// Connects a channel to the quiz engine.
pub struct QuizAgent {
    config: QuizConfig,
    engine: Arc<QuizEngine>,
    channel: Arc<dyn Channel>,
    retry: RetryPolicy,
}

impl QuizAgent {
    /// Create an agent with a fresh, empty session store.
    pub fn new(config: QuizConfig, channel: Arc<dyn Channel>) -> Self {
        let engine = Arc::new(QuizEngine::new(SessionStore::new(), config.thresholds));
        Self {
            config,
            engine,
            channel,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn engine(&self) -> &Arc<QuizEngine> {
        &self.engine
    }

    // ── Main loop ───────────────────────────────────────────────────

    /// Run until Ctrl+C or until the channel stream ends.
    pub async fn run(self) -> Result<(), Error> {
        match self.channel.health_check().await {
            Ok(()) => tracing::info!(channel = self.channel.name(), "Channel health check passed"),
            Err(e) => tracing::warn!(channel = self.channel.name(), "Channel health check failed: {e}"),
        }

        if let Err(e) = self.channel.register_commands(&COMMANDS).await {
            tracing::warn!("Failed to register bot commands: {e}");
        } else {
            tracing::info!("Bot commands set");
        }

        let mut events = self.channel.start().await?;

        let pruning_handle = spawn_prune_task(
            Arc::clone(self.engine.store()),
            self.config.prune_interval,
            self.config.session_idle_timeout,
        );

        let mut report_retry = tokio::time::interval(self.config.report_retry_interval);
        report_retry.tick().await; // Skip immediate first tick

        tracing::info!(channel = self.channel.name(), "Quiz bot ready and listening");

        loop {
            tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                event = events.next() => {
                    match event {
                        Some(e) => self.handle_event(&e).await,
                        None => {
                            tracing::info!("Channel stream ended, shutting down...");
                            break;
                        }
                    }
                }
                _ = report_retry.tick() => self.retry_operator_reports().await,
            }
        }

        tracing::info!("Quiz bot shutting down...");
        pruning_handle.abort();
        self.channel.shutdown().await?;

        Ok(())
    }

    // ── Event dispatch ──────────────────────────────────────────────

    /// Handle one inbound event. Never fails: errors are logged and
    /// translated to a user-facing reply here.
    pub async fn handle_event(&self, event: &InboundEvent) {
        if matches!(event.kind, EventKind::ButtonChosen { .. })
            && let Err(e) = self.channel.acknowledge(event).await
        {
            tracing::debug!(chat_id = event.chat_id, "Failed to acknowledge button press: {e}");
        }

        let user_id = event.user.as_ref().map(|u| u.id);
        tracing::debug!(
            channel = %event.channel,
            user_id = ?user_id,
            queued_ms = (chrono::Utc::now() - event.received_at).num_milliseconds(),
            "Handling event"
        );

        let reply = match self.dispatch(event).await {
            Ok(()) => None,
            Err(Error::Quiz(e)) => {
                match &e {
                    QuizError::StaleAnswer { .. } => {
                        tracing::debug!(user_id = ?user_id, "Ignoring stale answer: {e}")
                    }
                    QuizError::NoActiveSession { .. } => {
                        tracing::info!(user_id = ?user_id, "{e}")
                    }
                    _ => tracing::warn!(user_id = ?user_id, "Rejected event: {e}"),
                }
                e.user_message()
            }
            Err(e) => {
                tracing::error!(user_id = ?user_id, "Error handling event: {e}");
                Some(RESTART_APOLOGY)
            }
        };

        if let Some(text) = reply
            && let Err(e) = self.deliver(reply_chat(event), OutgoingMessage::text(text)).await
        {
            tracing::error!(chat_id = reply_chat(event), "Failed to send error reply: {e}");
        }
    }

    async fn dispatch(&self, event: &InboundEvent) -> Result<(), Error> {
        match SubmissionParser::parse(&event.kind) {
            Submission::Help => {
                let chat_id = reply_chat(event);
                self.deliver(chat_id, OutgoingMessage::text(HELP_TEXT))
                    .await?;
                tracing::info!(chat_id, "Sent help information");
                Ok(())
            }
            Submission::Start => {
                let user = require_user(event)?;
                self.process_start(user).await
            }
            Submission::Answer { payload } => {
                let user = require_user(event)?;
                let payload = payload.ok_or_else(|| QuizError::MalformedEvent {
                    reason: "button press without payload".into(),
                })?;
                self.process_answer(user, &payload).await
            }
            Submission::Unrecognized { text } => {
                tracing::debug!(chat_id = event.chat_id, chars = text.len(), "Ignoring free text");
                Ok(())
            }
        }
    }

    async fn process_start(&self, user: &EventUser) -> Result<(), Error> {
        // A restart replaces the session, so flush any report still owed.
        if let Some(done) = self.engine.pending_completion(user.id).await
            && !done.session.delivery.operator_reported
        {
            self.send_operator_report(&done.session).await;
        }

        let question = self.engine.start(user.id, user.handle.clone()).await;
        self.deliver(user.id.0, OutgoingMessage::text(WELCOME_MESSAGE))
            .await?;
        self.send_question(user.id.0, 0, question).await?;
        Ok(())
    }

    async fn process_answer(&self, user: &EventUser, payload: &str) -> Result<(), Error> {
        // Results that could not be delivered earlier go out on the next press.
        if let Some(done) = self.engine.pending_completion(user.id).await {
            tracing::info!(user_id = %user.id, "Retrying delivery of completed quiz");
            let result_already_sent = done.session.delivery.user_notified;
            self.finalize(done).await;
            if result_already_sent {
                return Err(QuizError::NoActiveSession { user_id: user.id }.into());
            }
            return Ok(());
        }

        let answer = Answer::parse(payload)?;
        match self.engine.submit_answer(user.id, answer).await? {
            AnswerOutcome::Next { step, question } => {
                self.send_question(user.id.0, step, question).await?;
            }
            AnswerOutcome::Completed(done) => self.finalize(done).await,
        }
        Ok(())
    }

    /// Send question `step` with one inline button per option.
    async fn send_question(
        &self,
        chat_id: i64,
        step: usize,
        question: &Question,
    ) -> Result<(), ChannelError> {
        let buttons = question
            .button_labels()
            .into_iter()
            .map(|(category, label)| InlineButton {
                label,
                payload: Answer::payload(step, category),
            })
            .collect();
        self.deliver(
            chat_id,
            OutgoingMessage::text(question.prompt).with_buttons(buttons),
        )
        .await?;
        tracing::info!(chat_id, question = step + 1, of = QUESTION_COUNT, "Sent question");
        Ok(())
    }

    // ── Finalize ────────────────────────────────────────────────────

    /// Deliver the operator report and the user's result.
    ///
    /// Each part is delivered once: progress is recorded on the session as
    /// messages go out, and a retry resumes where the last attempt stopped.
    /// The session is removed only once both parts are delivered. Until
    /// then it stays in the store; the user's result is retried on their
    /// next button press and the operator report by the periodic retry.
    async fn finalize(&self, done: CompletedQuiz) {
        let user_id = done.session.user_id;
        let delivery = done.session.delivery;

        if !delivery.operator_reported {
            self.send_operator_report(&done.session).await;
        }

        if !delivery.user_notified {
            let text = user_result_message(done.tier, &self.config.channel_link);
            match self.deliver(user_id.0, OutgoingMessage::text(text)).await {
                Ok(()) => {
                    self.engine.mark_user_notified(user_id).await;
                    tracing::info!(user_id = %user_id, tier = %done.tier, "Sent readiness result");
                }
                Err(e) => {
                    tracing::error!(
                        user_id = %user_id,
                        "Failed to deliver result, keeping completed session: {e}"
                    );
                }
            }
        }

        if !self.engine.finish(user_id).await {
            tracing::debug!(user_id = %user_id, "Completed session kept until delivery finishes");
        }
    }

    /// Send the operator report, skipping messages an earlier attempt
    /// already delivered.
    async fn send_operator_report(&self, session: &Session) {
        let user_id = session.user_id;
        let already_sent = session.delivery.operator_chunks_sent;

        // Only the header uses the profile, so skip the lookup once it went out.
        let profile = if already_sent == 0 {
            match self.channel.resolve_profile(user_id).await {
                Ok(profile) => Some(profile),
                Err(e) => {
                    tracing::warn!(user_id = %user_id, "Profile lookup failed, using fallback report: {e}");
                    None
                }
            }
        } else {
            None
        };

        let report = OperatorReport::build(session, profile.as_ref());
        let chunks = report.chunks(self.config.max_message_len);
        let total = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate().skip(already_sent) {
            if let Err(e) = self
                .deliver(self.config.operator_id.0, OutgoingMessage::text(chunk))
                .await
            {
                tracing::error!(
                    user_id = %user_id,
                    chunk = index + 1,
                    of = total,
                    report = %report.full_text(),
                    "Failed to send quiz results to operator: {e}"
                );
                return;
            }
            self.engine.record_operator_chunk(user_id).await;
        }

        self.engine.mark_operator_reported(user_id).await;
        tracing::info!(user_id = %user_id, chunks = total, resumed_at = already_sent, "Sent quiz results to operator");
    }

    /// Retry operator reports that could not be delivered earlier.
    pub async fn retry_operator_reports(&self) {
        for done in self.engine.pending_deliveries().await {
            if done.session.delivery.operator_reported {
                continue;
            }
            let user_id = done.session.user_id;
            tracing::info!(user_id = %user_id, "Retrying operator report");
            self.send_operator_report(&done.session).await;
            self.engine.finish(user_id).await;
        }
    }

    // ── Delivery ────────────────────────────────────────────────────

    /// Send one message, retrying transient failures.
    async fn deliver(&self, chat_id: i64, message: OutgoingMessage) -> Result<(), ChannelError> {
        self.retry
            .run("sendMessage", || {
                self.channel.send_message(chat_id, message.clone())
            })
            .await
    }
}

/// Replies go to the sender's private chat; events without a sender fall
/// back to the chat they came from.
fn reply_chat(event: &InboundEvent) -> i64 {
    event.user.as_ref().map_or(event.chat_id, |u| u.id.0)
}

fn require_user(event: &InboundEvent) -> Result<&EventUser, QuizError> {
    event.user.as_ref().ok_or_else(|| QuizError::MalformedEvent {
        reason: "event without sender identity".into(),
    })
}
