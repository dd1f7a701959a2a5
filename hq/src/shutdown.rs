//! Shutdown signal shared by the barrier and the run loop
//!
//! A single `watch` flag: the trigger side is held by whoever listens for OS
//! signals, the signal side is polled alongside every bounded wait.

use tokio::sync::watch;
use tracing::{debug, warn};

/// Exit code when a repeated signal forces the process down
pub const FORCED_EXIT_CODE: i32 = 130;

/// What one received OS signal should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Trip the flag and let the run wind down with a premature stop
    Shutdown,
    /// The flag was already set; stop waiting and exit now
    ForceExit,
}

/// Create a connected trigger/signal pair
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

/// Fires the shutdown signal
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Trip the signal. Idempotent.
    pub fn trigger(&self) {
        debug!("ShutdownTrigger::trigger: called");
        self.tx.send_replace(true);
    }

    /// Handle one OS signal: the first trips the flag, later ones force an exit
    pub fn on_signal(&self) -> SignalAction {
        if self.tx.send_replace(true) {
            SignalAction::ForceExit
        } else {
            SignalAction::Shutdown
        }
    }
}

/// Observes the shutdown signal
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Check whether the signal has fired
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal fires
    ///
    /// If the trigger is dropped without firing, this never resolves.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|triggered| *triggered).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::never()
    }
}

/// Spawn a task that trips `trigger` on SIGINT or SIGTERM (ctrl-c elsewhere)
///
/// The task keeps listening after the first signal. A second one exits the
/// process with [`FORCED_EXIT_CODE`] without waiting for the stop drain.
pub fn listen_for_signals(trigger: ShutdownTrigger) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let (mut sigint, mut sigterm) = match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "Failed to install signal handlers");
                    return;
                }
            };

            loop {
                let name = tokio::select! {
                    _ = sigint.recv() => "SIGINT",
                    _ = sigterm.recv() => "SIGTERM",
                };
                handle_signal(&trigger, name);
            }
        }

        #[cfg(not(unix))]
        {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for ctrl-c");
                    return;
                }
                handle_signal(&trigger, "ctrl-c");
            }
        }
    })
}

fn handle_signal(trigger: &ShutdownTrigger, name: &str) {
    debug!(signal = name, "handle_signal: called");
    match trigger.on_signal() {
        SignalAction::Shutdown => warn!(signal = name, "Shutdown requested, signal again to force exit"),
        SignalAction::ForceExit => {
            warn!(signal = name, "Second signal received, exiting without waiting");
            std::process::exit(FORCED_EXIT_CODE);
        }
    }
}
