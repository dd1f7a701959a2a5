//! Wire protocol between HQ and turrets
//!
//! Simple JSON-over-newline protocol on two TCP channels:
//! - **Broadcast channel**: HQ publishes [`Command`]s to every connected turret
//! - **Collection channel**: turrets push [`TurretMessage`]s to HQ

use thiserror::Error;

pub mod codec;
pub mod messages;

pub use codec::{DEFAULT_MAX_MESSAGE_SIZE, decode_command, decode_message, encode_line, read_line, send_message};
pub use messages::{
    Command, CommandKind, OPEN_FIRE, PREMATURE_STOP, Registration, ResultRecord, STOPPING_FIRE, StopReason,
    TurretMessage, TurretStatus,
};

/// Errors decoding or framing a wire message
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Empty message received")]
    Empty,

    #[error("Message too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid message: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the connection can keep reading after this error
    ///
    /// Framing errors leave the stream mid-line; content errors do not.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProtocolError::Empty | ProtocolError::Json(_) | ProtocolError::Invalid(_))
    }
}
