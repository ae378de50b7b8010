//! Quiz core: question bank, per-user sessions, scoring and reporting.
//!
//! A session moves `start → answering (step 0..9) → complete → removed`.
//! Everything here is transport-agnostic; see `agent::agent_loop` for the
//! part that talks to a chat channel.

pub mod engine;
pub mod questions;
pub mod report;
pub mod scoring;
pub mod session;
pub mod store;

pub use engine::{Answer, AnswerOutcome, CompletedQuiz, QuizEngine};
pub use questions::{Category, QUESTION_COUNT, QUESTIONS, Question};
pub use report::{OperatorReport, UserProfile};
pub use scoring::{Thresholds, Tier};
pub use session::{AnswerRecord, DeliveryProgress, Session, SessionPhase, Tally, UserId};
pub use store::SessionStore;
