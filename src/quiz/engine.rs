//! Quiz engine: start, answer, and completion bookkeeping over the store.
//!
//! The engine performs no I/O. Callers deliver the returned questions and
//! results, record progress via [`QuizEngine::record_operator_chunk`],
//! [`QuizEngine::mark_operator_reported`] and
//! [`QuizEngine::mark_user_notified`], then call [`QuizEngine::finish`].

use std::sync::Arc;

use chrono::Utc;

use tracing::{debug, info};

use super::questions::{Category, Question};
use super::scoring::{Thresholds, Tier, classify};
use super::session::{Session, SessionPhase, UserId};
use super::store::SessionStore;
use crate::error::QuizError;

/// A parsed answer button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Answer {
    pub category: Category,
    /// Question index the button belonged to, when the payload carries it.
    pub step: Option<usize>,
}

impl Answer {
    /// Parse a callback payload: either a bare tag (`"c"`) or a tag bound
    /// to its question index (`"3:c"`).
    pub fn parse(payload: &str) -> Result<Self, QuizError> {
        let invalid = || QuizError::InvalidAnswer {
            payload: payload.to_string(),
        };
        match payload.split_once(':') {
            Some((step, tag)) => {
                let step: usize = step.parse().map_err(|_| invalid())?;
                let category = Category::parse(tag).ok_or_else(invalid)?;
                Ok(Self {
                    category,
                    step: Some(step),
                })
            }
            None => {
                let category = Category::parse(payload).ok_or_else(invalid)?;
                Ok(Self {
                    category,
                    step: None,
                })
            }
        }
    }

    /// Payload for the button of `category` on question `step`.
    pub fn payload(step: usize, category: Category) -> String {
        format!("{step}:{}", category.tag())
    }
}

/// A session that has answered every question.
#[derive(Debug, Clone)]
pub struct CompletedQuiz {
    pub session: Session,
    pub tier: Tier,
}

/// What happened after an accepted answer.
#[derive(Debug, Clone)]
pub enum AnswerOutcome {
    /// Ask question `step` next.
    Next {
        step: usize,
        question: &'static Question,
    },
    /// The last question was answered.
    Completed(CompletedQuiz),
}

/// Drives per-user sessions through the question bank.
pub struct QuizEngine {
    store: Arc<SessionStore>,
    thresholds: Thresholds,
}

impl QuizEngine {
    pub fn new(store: Arc<SessionStore>, thresholds: Thresholds) -> Self {
        Self { store, thresholds }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// (Re)start a quiz for a user, discarding any earlier progress.
    /// Returns the first question.
    pub async fn start(&self, user_id: UserId, display_handle: Option<String>) -> &'static Question {
        let session = Session::new(user_id, display_handle);
        let session_id = session.id;
        if let Some(previous) = self.store.insert(session).await {
            debug!(
                user_id = %user_id,
                discarded_step = previous.step(),
                "Discarded previous session on restart"
            );
        }
        info!(user_id = %user_id, session_id = %session_id, "Started quiz");
        &super::questions::QUESTIONS[0]
    }

    /// Record an answer for a user's current question.
    pub async fn submit_answer(
        &self,
        user_id: UserId,
        answer: Answer,
    ) -> Result<AnswerOutcome, QuizError> {
        let result = self
            .store
            .with_session(user_id, |session| {
                session
                    .record_answer(answer.category, answer.step)
                    .map(|phase| (phase, session.clone()))
            })
            .await
            .ok_or(QuizError::NoActiveSession { user_id })?;

        let (phase, session) = result?;
        match phase {
            SessionPhase::InProgress { step } => {
                debug!(user_id = %user_id, step, category = %answer.category, "Answer recorded");
                let question = session.current_question()?;
                Ok(AnswerOutcome::Next { step, question })
            }
            SessionPhase::Complete => {
                let tier = classify(&session.tally(), &self.thresholds);
                info!(
                    user_id = %user_id,
                    session_id = %session.id,
                    tier = %tier,
                    a = session.tally().a,
                    b = session.tally().b,
                    c = session.tally().c,
                    elapsed_secs = (Utc::now() - session.started_at).num_seconds(),
                    "Quiz completed"
                );
                Ok(AnswerOutcome::Completed(CompletedQuiz { session, tier }))
            }
        }
    }

    /// The question a user is currently on, with its index.
    pub async fn current_question(
        &self,
        user_id: UserId,
    ) -> Result<(usize, &'static Question), QuizError> {
        let session = self
            .store
            .get(user_id)
            .await
            .ok_or(QuizError::NoActiveSession { user_id })?;
        let question = session.current_question()?;
        Ok((session.step(), question))
    }

    /// A completed session whose results have not been fully delivered yet.
    pub async fn pending_completion(&self, user_id: UserId) -> Option<CompletedQuiz> {
        let session = self.store.get(user_id).await?;
        if !session.is_complete() {
            return None;
        }
        let tier = classify(&session.tally(), &self.thresholds);
        Some(CompletedQuiz { session, tier })
    }

    /// Completed sessions whose results are not fully delivered yet.
    pub async fn pending_deliveries(&self) -> Vec<CompletedQuiz> {
        self.store
            .completed()
            .await
            .into_iter()
            .filter(|s| !s.delivery.is_done())
            .map(|session| {
                let tier = classify(&session.tally(), &self.thresholds);
                CompletedQuiz { session, tier }
            })
            .collect()
    }

    /// Count one more operator report message as delivered.
    pub async fn record_operator_chunk(&self, user_id: UserId) {
        self.store
            .with_session(user_id, |s| s.delivery.operator_chunks_sent += 1)
            .await;
    }

    /// Record that the whole operator report went out.
    pub async fn mark_operator_reported(&self, user_id: UserId) {
        self.store
            .with_session(user_id, |s| s.delivery.operator_reported = true)
            .await;
    }

    /// Record that the user received their result.
    pub async fn mark_user_notified(&self, user_id: UserId) {
        self.store
            .with_session(user_id, |s| s.delivery.user_notified = true)
            .await;
    }

    /// Remove a completed session once every result is delivered.
    /// In-progress and partly delivered sessions are left alone.
    pub async fn finish(&self, user_id: UserId) -> bool {
        let done = self
            .store
            .with_session(user_id, |s| s.is_complete() && s.delivery.is_done())
            .await
            .unwrap_or(false);
        if done {
            self.store.remove(user_id).await;
            info!(user_id = %user_id, "Cleared completed session");
        }
        done
    }
}
