//! HeadQuarters: the single owner of coordinator state

use std::time::Duration;

use tracing::debug;

use super::broadcaster::Broadcaster;
use super::outcome::RunState;
use super::progress::{NoProgress, ProgressDisplay, ProgressSnapshot};
use super::registry::{Turret, TurretRegistry};
use crate::config::Config;
use crate::error::HqError;
use crate::protocol::TurretMessage;
use crate::shutdown::ShutdownSignal;
use crate::sink::ResultSink;
use crate::transport::{CollectionChannel, ControlChannel};

/// Extra time past `run_time` so one more poll cycle can drain late results
pub const RUN_SLACK: Duration = Duration::from_secs(1);

/// Timing knobs for one coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HqSettings {
    /// Nominal test duration
    pub run_time: Duration,

    /// Upper bound on each blocking poll; also the cancellation latency
    pub poll_interval: Duration,

    /// Give up on the barrier after this long; `None` waits forever
    pub barrier_timeout: Option<Duration>,
}

impl Default for HqSettings {
    fn default() -> Self {
        Self {
            run_time: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            barrier_timeout: None,
        }
    }
}

impl HqSettings {
    pub fn from_config(config: &Config) -> Self {
        debug!("HqSettings::from_config: called");
        Self {
            run_time: config.run.run_time(),
            poll_interval: config.coordinator.poll_interval(),
            barrier_timeout: config.coordinator.barrier_timeout(),
        }
    }
}

/// The coordinator
///
/// Owns both channels, the turret registry and the result sink. Created at
/// startup (which sends the initial `status_request`), driven through
/// [`await_turrets`](Self::await_turrets) and then [`run`](Self::run), and
/// discarded at exit.
pub struct HeadQuarters<C: ControlChannel, R: CollectionChannel, S: ResultSink> {
    pub(super) settings: HqSettings,
    pub(super) broadcaster: Broadcaster<C>,
    pub(super) collector: R,
    pub(super) sink: S,
    pub(super) registry: TurretRegistry,
    pub(super) state: RunState,
    pub(super) barrier_met: bool,
    pub(super) shutdown: ShutdownSignal,
    pub(super) progress: Box<dyn ProgressDisplay>,
}

impl<C: ControlChannel, R: CollectionChannel, S: ResultSink> HeadQuarters<C, R, S> {
    /// Take ownership of the bound channels and ask turrets to announce themselves
    pub fn new(control: C, collector: R, sink: S, settings: HqSettings) -> Self {
        debug!(?settings, "HeadQuarters::new: called");
        let mut broadcaster = Broadcaster::new(control);
        // Best-effort: turrets that are not subscribed yet miss this
        broadcaster.status_request();

        Self {
            settings,
            broadcaster,
            collector,
            sink,
            registry: TurretRegistry::new(),
            state: RunState::AwaitingTurrets,
            barrier_met: false,
            shutdown: ShutdownSignal::never(),
            progress: Box::new(NoProgress),
        }
    }

    /// Observe `signal` in every poll
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = signal;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressDisplay>) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn settings(&self) -> &HqSettings {
        &self.settings
    }

    /// Known turrets in first-seen order
    pub fn turrets(&self) -> &[Turret] {
        self.registry.turrets()
    }

    pub fn broadcaster(&self) -> &Broadcaster<C> {
        &self.broadcaster
    }

    pub fn control(&self) -> &C {
        self.broadcaster.channel()
    }

    pub fn collector(&self) -> &R {
        &self.collector
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// One bounded wait on the collection channel
    ///
    /// The only suspension point of the coordinator, and the only place the
    /// shutdown signal is observed.
    pub(super) async fn poll_once(&mut self, wait: Duration) -> Result<Option<TurretMessage>, HqError> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(HqError::Cancelled),
            polled = self.collector.poll(wait) => polled,
        }
    }

    pub(super) fn snapshot(&self, elapsed: Duration) -> ProgressSnapshot {
        ProgressSnapshot {
            turrets: self.registry.len(),
            elapsed,
            counters: self.sink.counters(),
        }
    }
}
