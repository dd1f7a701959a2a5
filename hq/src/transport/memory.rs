//! In-process channel bindings
//!
//! Same semantics as the TCP bindings without sockets: used by tests and by
//! embedders that run turrets as tasks in the same process.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use super::{CollectionChannel, ControlChannel};
use crate::error::HqError;
use crate::protocol::{Command, CommandKind, TurretMessage};

/// Broadcast channel that also keeps a log of everything it sent
#[derive(Debug, Clone)]
pub struct MemoryControl {
    tx: broadcast::Sender<Command>,
    sent: Arc<Mutex<Vec<Command>>>,
}

impl MemoryControl {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribe like a turret would; only later commands are seen
    pub fn subscribe(&self) -> broadcast::Receiver<Command> {
        self.tx.subscribe()
    }

    /// Every command broadcast so far, in order
    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// How many commands of `kind` were broadcast
    pub fn count(&self, kind: CommandKind) -> usize {
        self.sent().iter().filter(|c| c.kind == kind).count()
    }
}

impl Default for MemoryControl {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ControlChannel for MemoryControl {
    fn broadcast(&self, command: &Command) -> usize {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(command.clone());
        }
        let reached = self.tx.send(command.clone()).unwrap_or(0);
        debug!(kind = %command.kind, reached, "MemoryControl::broadcast");
        reached
    }

    fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Create a linked turret-side sender and coordinator-side collector
pub fn memory_collection(capacity: usize) -> (MemoryTurretLink, MemoryCollector) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MemoryTurretLink { tx }, MemoryCollector { rx })
}

/// Turret side of an in-process collection channel
#[derive(Debug, Clone)]
pub struct MemoryTurretLink {
    tx: mpsc::Sender<TurretMessage>,
}

impl MemoryTurretLink {
    /// Queue a message after the same validation the TCP boundary applies
    pub async fn send(&self, message: TurretMessage) -> Result<(), HqError> {
        message.validate()?;
        self.tx
            .send(message)
            .await
            .map_err(|_| HqError::Transport("collector dropped".to_string()))
    }
}

/// Coordinator side of an in-process collection channel
#[derive(Debug)]
pub struct MemoryCollector {
    rx: mpsc::Receiver<TurretMessage>,
}

#[async_trait]
impl CollectionChannel for MemoryCollector {
    async fn poll(&mut self, wait: Duration) -> Result<Option<TurretMessage>, HqError> {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => Err(HqError::Transport("all turret links closed".to_string())),
            Err(_) => Ok(None),
        }
    }
}
