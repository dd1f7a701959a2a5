//! Command broadcaster
//!
//! Wraps the control channel with the three commands HQ ever sends. Keeps a
//! tally per kind and refuses a second terminal stop. Once `start` went out,
//! dropping the broadcaster without a stop sends a premature one.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::protocol::{Command, CommandKind, StopReason};
use crate::transport::ControlChannel;

pub struct Broadcaster<C: ControlChannel> {
    channel: C,
    tally: HashMap<CommandKind, usize>,
    stopped: Option<StopReason>,
}

impl<C: ControlChannel> Broadcaster<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            tally: HashMap::new(),
            stopped: None,
        }
    }

    fn send(&mut self, command: Command) {
        let reached = self.channel.broadcast(&command);
        *self.tally.entry(command.kind).or_default() += 1;
        debug!(kind = %command.kind, note = ?command.note, reached, "Broadcaster::send");
    }

    /// Best-effort prompt for already-running turrets to announce themselves
    pub fn status_request(&mut self) {
        self.send(Command::status_request());
    }

    pub fn start(&mut self) {
        info!(subscribers = self.channel.subscriber_count(), "Sending start command to turrets");
        self.send(Command::start());
    }

    /// Send the terminal stop; returns false if one was already sent
    pub fn stop(&mut self, reason: StopReason) -> bool {
        if let Some(previous) = self.stopped {
            warn!(?previous, ?reason, "Broadcaster::stop: stop already sent, ignoring");
            return false;
        }
        info!(note = reason.note(), "Sending stop command to turrets");
        self.stopped = Some(reason);
        self.send(Command::stop(reason));
        true
    }

    /// How many commands of `kind` went out
    pub fn sent(&self, kind: CommandKind) -> usize {
        self.tally.get(&kind).copied().unwrap_or(0)
    }

    /// Reason of the terminal stop, if sent
    pub fn stopped(&self) -> Option<StopReason> {
        self.stopped
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }
}

impl<C: ControlChannel> Drop for Broadcaster<C> {
    fn drop(&mut self) {
        if self.sent(CommandKind::Start) > 0 && self.stopped.is_none() {
            warn!("Broadcaster dropped mid-run, sending premature stop");
            self.stop(StopReason::Premature);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryControl;

    #[test]
    fn test_stop_is_sent_once() {
        let control = MemoryControl::default();
        let mut broadcaster = Broadcaster::new(control.clone());

        assert!(broadcaster.stop(StopReason::Premature));
        assert!(!broadcaster.stop(StopReason::Completed));

        assert_eq!(broadcaster.sent(CommandKind::Stop), 1);
        assert_eq!(broadcaster.stopped(), Some(StopReason::Premature));
        assert_eq!(control.sent(), vec![Command::stop(StopReason::Premature)]);
    }

    #[test]
    fn test_drop_after_start_sends_premature_stop() {
        let control = MemoryControl::default();
        let mut broadcaster = Broadcaster::new(control.clone());
        broadcaster.start();
        drop(broadcaster);

        assert_eq!(control.count(CommandKind::Stop), 1);
        assert_eq!(control.sent().last(), Some(&Command::stop(StopReason::Premature)));
    }

    #[test]
    fn test_drop_before_start_sends_nothing() {
        let control = MemoryControl::default();
        let mut broadcaster = Broadcaster::new(control.clone());
        broadcaster.status_request();
        drop(broadcaster);

        assert_eq!(control.count(CommandKind::Stop), 0);
    }

    #[test]
    fn test_tally_per_kind() {
        let mut broadcaster = Broadcaster::new(MemoryControl::default());
        broadcaster.status_request();
        broadcaster.start();

        assert_eq!(broadcaster.sent(CommandKind::StatusRequest), 1);
        assert_eq!(broadcaster.sent(CommandKind::Start), 1);
        assert_eq!(broadcaster.sent(CommandKind::Stop), 0);
        assert_eq!(broadcaster.stopped(), None);
    }
}
