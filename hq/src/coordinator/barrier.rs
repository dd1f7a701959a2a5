//! Registration barrier

use tokio::time::Instant;
use tracing::{debug, info};

use super::core::HeadQuarters;
use super::outcome::RunState;
use crate::error::HqError;
use crate::protocol::TurretMessage;
use crate::sink::ResultSink;
use crate::transport::{CollectionChannel, ControlChannel};

impl<C: ControlChannel, R: CollectionChannel, S: ResultSink> HeadQuarters<C, R, S> {
    /// Block until `required` distinct turrets have registered
    ///
    /// Repeated registrations from one identity count once. Results that show
    /// up before the run are discarded. Fails with `BarrierTimeout` once the
    /// configured deadline passes, or `Cancelled` on the shutdown signal;
    /// every error here propagates to the caller.
    pub async fn await_turrets(&mut self, required: usize) -> Result<(), HqError> {
        debug!(required, "await_turrets: called");
        if self.state != RunState::AwaitingTurrets {
            return Err(HqError::RunFinished);
        }

        info!(required, "Waiting for turrets");
        let started = Instant::now();
        let deadline = self.settings.barrier_timeout.map(|timeout| started + timeout);

        while self.registry.len() < required {
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(HqError::BarrierTimeout {
                            required,
                            registered: self.registry.len(),
                            waited: now.saturating_duration_since(started),
                        });
                    }
                    self.settings.poll_interval.min(deadline - now)
                }
                None => self.settings.poll_interval,
            };

            match self.poll_once(wait).await? {
                Some(TurretMessage::Registration(registration)) => {
                    self.registry.register(registration);
                }
                Some(TurretMessage::Result(record)) => {
                    debug!(uuid = %record.turret_uuid, "await_turrets: result before start, discarded");
                }
                None => {
                    debug!(registered = self.registry.len(), required, "await_turrets: still waiting");
                }
            }
        }

        self.barrier_met = true;
        info!(registered = self.registry.len(), "All turrets ready");
        Ok(())
    }
}
