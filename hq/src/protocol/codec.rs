//! Newline-delimited JSON framing
//!
//! Each message is a single line of JSON followed by `\n`, on both channels.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::ProtocolError;
use super::messages::{Command, TurretMessage};

/// Default ceiling for a single data-plane line (64KB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Serialize a message as one JSON line, newline included
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

fn decode<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// Parse and validate a data-plane line
pub fn decode_message(line: &str) -> Result<TurretMessage, ProtocolError> {
    let message: TurretMessage = decode(line)?;
    message.validate()?;
    debug!(kind = message.kind(), "decode_message: parsed message");
    Ok(message)
}

/// Parse a control-plane line
pub fn decode_command(line: &str) -> Result<Command, ProtocolError> {
    decode(line)
}

/// Read one line, refusing lines longer than `max_size` bytes
///
/// Returns `Ok(None)` at end of stream. An oversized line leaves the stream
/// mid-frame, so callers should drop the connection on `TooLarge`. A line
/// that is not UTF-8 is consumed whole and reported as `Invalid`.
pub async fn read_line<R>(reader: &mut R, max_size: usize) -> Result<Option<String>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut limited = reader.take(max_size as u64 + 1);
    let bytes_read = limited.read_until(b'\n', &mut buf).await?;

    if bytes_read == 0 {
        return Ok(None);
    }
    if bytes_read > max_size {
        return Err(ProtocolError::TooLarge {
            size: bytes_read,
            max: max_size,
        });
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|e| ProtocolError::Invalid(format!("line is not UTF-8: {}", e.utf8_error())))
}

/// Write one message as a JSON line and flush
pub async fn send_message<W, T>(writer: &mut W, message: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let line = encode_line(message)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
