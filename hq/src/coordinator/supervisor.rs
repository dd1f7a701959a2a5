//! Run loop: result ingestion bounded by the time budget

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::core::{HeadQuarters, RUN_SLACK};
use super::outcome::{RunOutcome, RunReport, RunState};
use super::registry::Registered;
use crate::error::HqError;
use crate::protocol::{CommandKind, TurretMessage};
use crate::sink::ResultSink;
use crate::transport::{CollectionChannel, ControlChannel};

impl<C: ControlChannel, R: CollectionChannel, S: ResultSink> HeadQuarters<C, R, S> {
    /// Start the turrets and ingest results until the time budget runs out
    ///
    /// Requires a satisfied barrier. Sends exactly one `start` and exactly one
    /// terminal `stop` per HQ, even if an earlier `run` future was dropped
    /// mid-run. Any failure while running (transport, sink, shutdown signal)
    /// aborts the loop with a premature stop and is reported in the returned
    /// [`RunReport`] rather than as an error.
    pub async fn run(&mut self) -> Result<RunReport, HqError> {
        debug!(state = %self.state, "run: called");
        if self.state != RunState::AwaitingTurrets || self.broadcaster.sent(CommandKind::Start) > 0 {
            return Err(HqError::RunFinished);
        }
        if !self.barrier_met {
            return Err(HqError::BarrierNotSatisfied {
                registered: self.registry.len(),
            });
        }

        self.state = RunState::Running;
        self.broadcaster.start();
        let started = Instant::now();
        let started_at = Utc::now();
        let budget = self.settings.run_time + RUN_SLACK;
        info!(run_time = ?self.settings.run_time, turrets = self.registry.len(), "Run started");

        let outcome = loop {
            if let Err(cause) = self.ingest_once().await {
                break RunOutcome::Aborted(cause);
            }

            let elapsed = started.elapsed();
            let snapshot = self.snapshot(elapsed);
            self.progress.update(&snapshot);

            if elapsed > budget {
                info!(?elapsed, "Run time reached");
                break RunOutcome::Complete;
            }
        };

        self.broadcaster.stop(outcome.stop_reason());
        if let Some(cause) = outcome.cause() {
            error!(category = cause.category(), error = %cause, "Run aborted");
            self.progress.aborted(cause);
        }

        let elapsed = started.elapsed();
        self.progress.finish();
        self.state = outcome.state();

        if let Err(e) = self.sink.flush().await {
            warn!(error = %e, "Failed to flush result sink");
        }

        let counters = self.sink.counters();
        info!(
            state = %self.state,
            ?elapsed,
            transactions = counters.transaction_count,
            timers = counters.timer_count,
            errors = counters.error_count,
            "Run finished"
        );

        Ok(RunReport {
            outcome,
            started_at,
            finished_at: Utc::now(),
            elapsed,
            counters,
            turrets: self.registry.len(),
        })
    }

    /// Poll once and route whatever arrived
    async fn ingest_once(&mut self) -> Result<(), HqError> {
        let poll_interval = self.settings.poll_interval;
        match self.poll_once(poll_interval).await? {
            None => {}
            Some(TurretMessage::Registration(registration)) => {
                let uuid = registration.uuid.clone();
                match self.registry.observe_status(registration) {
                    Registered::Added => info!(%uuid, "Late turret joined the run"),
                    Registered::Updated => debug!(%uuid, "ingest_once: turret status updated"),
                    Registered::Unchanged => {}
                }
            }
            Some(TurretMessage::Result(record)) => {
                self.sink.write_result(record).await?;
            }
        }
        Ok(())
    }
}
