//! Quiz agent: turns channel events into quiz operations and replies.

pub mod agent_loop;
pub mod submission;

pub use agent_loop::{COMMANDS, HELP_TEXT, QuizAgent, WELCOME_MESSAGE};
pub use submission::{Submission, SubmissionParser};
