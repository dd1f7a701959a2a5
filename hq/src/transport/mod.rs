//! Transport bindings for the two HQ channels
//!
//! - [`ControlChannel`]: one-to-many, at-most-once, no acknowledgment. A turret
//!   that subscribes after a broadcast never sees it.
//! - [`CollectionChannel`]: many-to-one queue drained by the coordinator loop.
//!   FIFO per turret, no ordering across turrets.
//!
//! TCP implementations live in [`tcp`], in-process ones in [`memory`].

use std::time::Duration;

use async_trait::async_trait;

use crate::error::HqError;
use crate::protocol::{Command, TurretMessage};

pub mod memory;
pub mod tcp;

pub use memory::{MemoryCollector, MemoryControl, MemoryTurretLink, memory_collection};
pub use tcp::{Collector, Publisher};

/// Broadcast side of the control plane
pub trait ControlChannel: Send {
    /// Send a command to every current subscriber
    ///
    /// Fire-and-forget: returns how many subscribers it was queued for, which
    /// may be zero. Never fails on an empty audience.
    fn broadcast(&self, command: &Command) -> usize;

    /// Number of turrets currently subscribed
    fn subscriber_count(&self) -> usize;
}

/// Receiving side of the data plane
#[async_trait]
pub trait CollectionChannel: Send {
    /// Wait at most `wait` for the next message
    ///
    /// `Ok(None)` means the poll cycle elapsed with nothing queued. Must be
    /// cancel-safe: dropping the future loses no message.
    async fn poll(&mut self, wait: Duration) -> Result<Option<TurretMessage>, HqError>;
}
