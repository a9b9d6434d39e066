//! Quote request pipeline.
//!
//! A quote only ever moves when its owner asks for a specific next status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStatus {
    New,
    Discussing,
    Quoted,
    Accepted,
    Rejected,
}

pub const ALL_QUOTE_STATUSES: [QuoteStatus; 5] = [
    QuoteStatus::New,
    QuoteStatus::Discussing,
    QuoteStatus::Quoted,
    QuoteStatus::Accepted,
    QuoteStatus::Rejected,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    Unchanged(QuoteStatus),
    Terminal(QuoteStatus),
    NotAllowed { from: QuoteStatus, to: QuoteStatus },
    MissingAmount,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::Unchanged(s) => write!(f, "Quote is already '{}'", s),
            TransitionError::Terminal(s) => {
                write!(f, "Quote is '{}' and can no longer change status", s)
            }
            TransitionError::NotAllowed { from, to } => {
                write!(f, "Cannot move a quote from '{}' to '{}'", from, to)
            }
            TransitionError::MissingAmount => {
                write!(f, "A positive quoted amount is required to mark a quote as quoted")
            }
        }
    }
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::New => "new",
            QuoteStatus::Discussing => "discussing",
            QuoteStatus::Quoted => "quoted",
            QuoteStatus::Accepted => "accepted",
            QuoteStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QuoteStatus::Accepted | QuoteStatus::Rejected)
    }

    /// Statuses reachable from `self` in one step.
    pub fn next_statuses(&self) -> &'static [QuoteStatus] {
        match self {
            QuoteStatus::New => &[
                QuoteStatus::Discussing,
                QuoteStatus::Quoted,
                QuoteStatus::Rejected,
            ],
            QuoteStatus::Discussing => &[QuoteStatus::Quoted, QuoteStatus::Rejected],
            QuoteStatus::Quoted => &[
                QuoteStatus::Accepted,
                QuoteStatus::Rejected,
                QuoteStatus::Discussing,
            ],
            QuoteStatus::Accepted | QuoteStatus::Rejected => &[],
        }
    }

    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        self.next_statuses().contains(&next)
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(QuoteStatus::New),
            "discussing" => Ok(QuoteStatus::Discussing),
            "quoted" => Ok(QuoteStatus::Quoted),
            "accepted" => Ok(QuoteStatus::Accepted),
            "rejected" => Ok(QuoteStatus::Rejected),
            other => Err(format!("Unknown quote status '{}'", other)),
        }
    }
}

/// Checks a requested move. Entering `quoted` needs a positive amount.
pub fn check_transition(
    from: QuoteStatus,
    to: QuoteStatus,
    quoted_amount_cents: Option<i64>,
) -> Result<(), TransitionError> {
    if from == to {
        return Err(TransitionError::Unchanged(from));
    }
    if from.is_terminal() {
        return Err(TransitionError::Terminal(from));
    }
    if !from.can_transition_to(to) {
        return Err(TransitionError::NotAllowed { from, to });
    }
    if to == QuoteStatus::Quoted && !matches!(quoted_amount_cents, Some(a) if a > 0) {
        return Err(TransitionError::MissingAmount);
    }
    Ok(())
}
