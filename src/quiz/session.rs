//! Per-user quiz session: progress, tally and transcript.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::questions::{self, Category, QUESTION_COUNT, Question};
use crate::error::QuizError;

/// Opaque chat-platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Running count of chosen categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub a: u32,
    pub b: u32,
    pub c: u32,
}

impl Tally {
    pub fn new(a: u32, b: u32, c: u32) -> Self {
        Self { a, b, c }
    }

    pub fn get(&self, category: Category) -> u32 {
        match category {
            Category::A => self.a,
            Category::B => self.b,
            Category::C => self.c,
        }
    }

    fn increment(&mut self, category: Category) {
        match category {
            Category::A => self.a += 1,
            Category::B => self.b += 1,
            Category::C => self.c += 1,
        }
    }

    /// Sum over all categories.
    pub fn total(&self) -> u32 {
        self.a + self.b + self.c
    }
}

/// One answered question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub question: String,
    pub category: Category,
    pub option_text: String,
}

/// Where a session is in its lifecycle.
///
/// `NoSession` is represented by absence from the store; a session is
/// dropped from the store once its results are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for the answer to question `step`.
    InProgress { step: usize },
    /// All questions answered, results not yet delivered.
    Complete,
}

/// How far result delivery for a completed session has got.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryProgress {
    /// Operator report messages delivered so far, in order.
    pub operator_chunks_sent: usize,
    /// Set once every operator report message is delivered.
    pub operator_reported: bool,
    /// Set once the user has received their result.
    pub user_notified: bool,
}

impl DeliveryProgress {
    pub fn is_done(&self) -> bool {
        self.operator_reported && self.user_notified
    }
}

/// The mutable progress record for one quiz attempt.
#[derive(Debug, Clone)]
pub struct Session {
    /// Attempt id, used to correlate log lines.
    pub id: Uuid,
    pub user_id: UserId,
    /// Platform handle captured at start, if the user has one.
    pub display_handle: Option<String>,
    step: usize,
    tally: Tally,
    transcript: Vec<AnswerRecord>,
    pub delivery: DeliveryProgress,
    pub started_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    /// A fresh session at step 0 with an empty tally and transcript.
    pub fn new(user_id: UserId, display_handle: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            display_handle,
            step: 0,
            tally: Tally::default(),
            transcript: Vec::with_capacity(QUESTION_COUNT),
            delivery: DeliveryProgress::default(),
            started_at: now,
            last_active_at: now,
        }
    }

    /// Index of the next unanswered question; `QUESTION_COUNT` once complete.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    pub fn transcript(&self) -> &[AnswerRecord] {
        &self.transcript
    }

    pub fn phase(&self) -> SessionPhase {
        if self.step >= QUESTION_COUNT {
            SessionPhase::Complete
        } else {
            SessionPhase::InProgress { step: self.step }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == SessionPhase::Complete
    }

    /// The question waiting to be answered.
    pub fn current_question(&self) -> Result<&'static Question, QuizError> {
        questions::question(self.step).ok_or(QuizError::StepOutOfRange {
            user_id: self.user_id,
            step: self.step,
        })
    }

    /// Record an answer to the current question and advance.
    ///
    /// `answered_step` is the question index the answer was given for, when
    /// the transport knows it. A mismatch with the current step means a
    /// stale or duplicate press and is rejected. On any error the session
    /// is left untouched.
    pub fn record_answer(
        &mut self,
        category: Category,
        answered_step: Option<usize>,
    ) -> Result<SessionPhase, QuizError> {
        if self.step >= QUESTION_COUNT {
            return Err(QuizError::InvalidStep {
                user_id: self.user_id,
                step: self.step,
            });
        }
        if let Some(answered) = answered_step
            && answered != self.step
        {
            return Err(QuizError::StaleAnswer {
                user_id: self.user_id,
                answered,
                current: self.step,
            });
        }

        let question = self.current_question()?;
        self.tally.increment(category);
        self.transcript.push(AnswerRecord {
            question: question.prompt.to_string(),
            category,
            option_text: question.option(category).to_string(),
        });
        self.step += 1;
        self.touch();

        Ok(self.phase())
    }

    /// Mark the session as active now.
    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }

    /// Whether the session has been idle for longer than `timeout`.
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: std::time::Duration) -> bool {
        match chrono::Duration::from_std(timeout) {
            Ok(timeout) => now.signed_duration_since(self.last_active_at) > timeout,
            Err(_) => false,
        }
    }
}
