//! Run states and outcomes

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::HqError;
use crate::protocol::StopReason;
use crate::sink::LiveCounters;

/// Coordinator lifecycle
///
/// `AwaitingTurrets → Running → {Complete, Aborted}`; the last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    AwaitingTurrets,
    Running,
    Complete,
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Complete | RunState::Aborted)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingTurrets => write!(f, "awaiting_turrets"),
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// Time budget reached
    Complete,
    /// Loop stopped early; carries the failure that caused it
    Aborted(HqError),
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, RunOutcome::Complete)
    }

    pub fn state(&self) -> RunState {
        match self {
            RunOutcome::Complete => RunState::Complete,
            RunOutcome::Aborted(_) => RunState::Aborted,
        }
    }

    pub fn stop_reason(&self) -> StopReason {
        match self {
            RunOutcome::Complete => StopReason::Completed,
            RunOutcome::Aborted(_) => StopReason::Premature,
        }
    }

    pub fn cause(&self) -> Option<&HqError> {
        match self {
            RunOutcome::Complete => None,
            RunOutcome::Aborted(cause) => Some(cause),
        }
    }
}

/// Everything the run loop knows once it exits
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Time between the start broadcast and loop exit
    pub elapsed: Duration,
    pub counters: LiveCounters,
    /// Turrets known when the loop exited
    pub turrets: usize,
}
