//! Queue entry and visit status definitions
//!
//! This module defines the lifecycle of a queue entry and the outcome
//! recorded for each visit in the ledger.

use serde::Serialize;
use std::fmt;

/// Represents the current state of a URL entry in the work queue
///
/// The only legal transitions are `Pending -> Claimed` and
/// `Claimed -> Done | Failed`. Crash recovery additionally moves
/// `Claimed -> Pending`, and re-admission after the cooldown moves
/// `Done | Failed -> Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// Waiting to be claimed by a worker
    Pending,

    /// Reserved by exactly one worker
    Claimed,

    /// Processed successfully (terminal)
    Done,

    /// Processing failed (terminal, no automatic requeue)
    Failed,
}

impl EntryState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the entry still represents outstanding work
    ///
    /// At most one in-flight entry may exist per canonical URL.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Claimed)
    }

    /// Returns true if a worker may move the entry from `self` to `next`
    pub fn can_transition_to(&self, next: EntryState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Claimed) | (Self::Claimed, Self::Done) | (Self::Claimed, Self::Failed)
        )
    }

    /// Converts the entry state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parses an entry state from its database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "claimed" => Some(Self::Claimed),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible entry states
    pub fn all_states() -> [Self; 4] {
        [Self::Pending, Self::Claimed, Self::Done, Self::Failed]
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Outcome recorded in the visit ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitStatus {
    Success,
    Failure,
}

impl VisitStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
