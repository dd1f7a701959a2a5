//! Control-plane and data-plane message types
//!
//! Control commands go out on the broadcast channel as
//! `{"command": "...", "msg": ...}`. Everything turrets send back is tagged
//! with an explicit `kind` so registrations and results are never told apart
//! by field presence.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ProtocolError;

/// Note attached to the `start` command
pub const OPEN_FIRE: &str = "open fire";

/// Note attached to the terminal `stop` after a normal run
pub const STOPPING_FIRE: &str = "stopping fire";

/// Note attached to the terminal `stop` after an aborted run
pub const PREMATURE_STOP: &str = "premature stop";

/// Kind of control command
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    StatusRequest,
    Start,
    Stop,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StatusRequest => write!(f, "status_request"),
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// Why the terminal stop is being sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The run reached its time budget
    Completed,
    /// The run loop aborted on a failure or cancellation
    Premature,
}

impl StopReason {
    pub fn note(self) -> &'static str {
        match self {
            Self::Completed => STOPPING_FIRE,
            Self::Premature => PREMATURE_STOP,
        }
    }
}

/// Control command broadcast to every turret
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Command {
    #[serde(rename = "command")]
    pub kind: CommandKind,

    #[serde(rename = "msg")]
    pub note: Option<String>,
}

impl Command {
    /// Ask already-running turrets to announce themselves
    pub fn status_request() -> Self {
        Self {
            kind: CommandKind::StatusRequest,
            note: None,
        }
    }

    pub fn start() -> Self {
        Self {
            kind: CommandKind::Start,
            note: Some(OPEN_FIRE.to_string()),
        }
    }

    pub fn stop(reason: StopReason) -> Self {
        Self {
            kind: CommandKind::Stop,
            note: Some(reason.note().to_string()),
        }
    }
}

/// Status reported by a turret
///
/// `ready` is the only status the coordinator interprets; anything else is
/// kept verbatim for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TurretStatus {
    Ready,
    Other(String),
}

impl From<String> for TurretStatus {
    fn from(value: String) -> Self {
        if value == "ready" {
            Self::Ready
        } else {
            Self::Other(value)
        }
    }
}

impl From<TurretStatus> for String {
    fn from(value: TurretStatus) -> Self {
        match value {
            TurretStatus::Ready => "ready".to_string(),
            TurretStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for TurretStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Turret announcing itself (barrier phase) or reporting status (run phase)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Human-readable turret name
    pub turret: String,

    pub status: TurretStatus,

    /// Identity chosen by the turret; the only deduplication key
    pub uuid: String,
}

/// One timed measurement emitted by a turret during the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Name of the emitting turret
    pub turret: String,

    /// Identity of the emitting turret
    pub turret_uuid: String,

    /// Wall-clock seconds since the Unix epoch at emission
    pub epoch: f64,

    /// Latency of the primary request in seconds
    pub elapsed: f64,

    #[serde(default)]
    pub run_timestamp: Option<String>,

    #[serde(default)]
    pub error: Option<String>,

    /// Worker-defined timers, name to seconds
    #[serde(default)]
    pub custom_timers: Option<BTreeMap<String, f64>>,
}

impl ResultRecord {
    /// Check if the record carries a non-empty error
    pub fn is_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Number of custom timers carried by the record
    pub fn timer_count(&self) -> usize {
        self.custom_timers.as_ref().map_or(0, BTreeMap::len)
    }
}

/// Any message a turret sends on the collection channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurretMessage {
    Registration(Registration),
    Result(ResultRecord),
}

impl TurretMessage {
    /// Reject messages that parse but cannot be acted on
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Self::Registration(reg) => {
                if reg.uuid.trim().is_empty() {
                    return Err(ProtocolError::Invalid("registration without uuid".to_string()));
                }
            }
            Self::Result(record) => {
                if record.turret_uuid.trim().is_empty() {
                    return Err(ProtocolError::Invalid("result without turret_uuid".to_string()));
                }
                if !record.epoch.is_finite() {
                    return Err(ProtocolError::Invalid(format!("non-finite epoch {}", record.epoch)));
                }
                if !record.elapsed.is_finite() || record.elapsed < 0.0 {
                    return Err(ProtocolError::Invalid(format!("bad elapsed {}", record.elapsed)));
                }
                let bad_timer = record
                    .custom_timers
                    .iter()
                    .flatten()
                    .find(|(_, value)| !value.is_finite());
                if let Some((name, value)) = bad_timer {
                    return Err(ProtocolError::Invalid(format!("bad custom timer {}={}", name, value)));
                }
            }
        }
        Ok(())
    }

    /// Short label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Registration(_) => "registration",
            Self::Result(_) => "result",
        }
    }
}
