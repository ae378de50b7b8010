//! Readiness classification of a completed tally.

use super::session::Tally;

/// Number of `c` answers needed for [`Tier::High`].
pub const HIGH_READINESS_THRESHOLD: u32 = 7;

/// Number of `b` answers needed for [`Tier::Medium`].
pub const MEDIUM_READINESS_THRESHOLD: u32 = 5;

/// Readiness tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        write!(f, "{s}")
    }
}

/// Tier thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Minimum `c` count for high readiness.
    pub high: u32,
    /// Minimum `b` count for medium readiness.
    pub medium: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high: HIGH_READINESS_THRESHOLD,
            medium: MEDIUM_READINESS_THRESHOLD,
        }
    }
}

/// Classify a tally.
///
/// Checks run high first, then medium. A tally that meets both conditions
/// is classified high.
pub fn classify(tally: &Tally, thresholds: &Thresholds) -> Tier {
    if tally.c >= thresholds.high {
        Tier::High
    } else if tally.b >= thresholds.medium {
        Tier::Medium
    } else {
        Tier::Low
    }
}
