//! Headquarters coordinator
//!
//! One [`HeadQuarters`] drives one load test through three phases:
//! - **Barrier:** wait for the required number of distinct turrets
//! - **Run:** broadcast `start`, ingest results until the time budget runs out
//! - **Stop:** broadcast exactly one terminal `stop`, normal or premature

mod barrier;
mod broadcaster;
mod core;
mod outcome;
mod progress;
mod registry;
mod supervisor;

pub use broadcaster::Broadcaster;
pub use core::{HeadQuarters, HqSettings, RUN_SLACK};
pub use outcome::{RunOutcome, RunReport, RunState};
pub use progress::{NoProgress, ProgressDisplay, ProgressSnapshot, TerminalProgress};
pub use registry::{Phase, Registered, Turret, TurretRegistry};
