//! Readiness Quiz: a ten-question chat quiz with per-user scoring and an
//! operator report on completion.

pub mod agent;
pub mod channels;
pub mod config;
pub mod error;
pub mod quiz;
pub mod retry;
