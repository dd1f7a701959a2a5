//! HQ error types

use std::time::Duration;
use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::sink::SinkError;

/// Errors raised by the coordinator core
///
/// Each variant names the failure source so an aborted run can report which
/// category triggered the shutdown.
#[derive(Debug, Error)]
pub enum HqError {
    #[error("Failed to bind {channel} channel on {addr}: {source}")]
    Bind {
        channel: &'static str,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Timed out after {waited:?} waiting for {required} turrets ({registered} registered)")]
    BarrierTimeout {
        required: usize,
        registered: usize,
        waited: Duration,
    },

    #[error("Turret barrier has not been satisfied ({registered} turrets registered)")]
    BarrierNotSatisfied { registered: usize },

    #[error("Run already started; a coordinator drives a single run")]
    RunFinished,

    #[error("Cancelled by shutdown signal")]
    Cancelled,
}

impl HqError {
    /// Short category label used in logs and run summaries
    pub fn category(&self) -> &'static str {
        match self {
            HqError::Bind { .. } | HqError::Transport(_) => "transport",
            HqError::Protocol(_) => "protocol",
            HqError::Sink(_) => "sink",
            HqError::BarrierTimeout { .. } | HqError::BarrierNotSatisfied { .. } => "barrier",
            HqError::RunFinished => "state",
            HqError::Cancelled => "cancelled",
        }
    }

    /// Check if this error came from the shutdown signal rather than a fault
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HqError::Cancelled)
    }
}
