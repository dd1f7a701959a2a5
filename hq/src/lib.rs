//! oct-hq - Headquarters for distributed load tests
//!
//! HQ is the single coordinator of a load test. Turrets (load generators)
//! connect to two channels it binds: a broadcast channel that carries
//! `status_request`, `start` and `stop` commands, and a collection channel
//! that carries their registrations and per-transaction results.
//!
//! # Lifecycle
//!
//! - **Announce:** a `status_request` goes out as soon as HQ is created
//! - **Barrier:** HQ waits until the required number of distinct turrets registered
//! - **Run:** `start` goes out, results stream into a [`sink::ResultSink`] until
//!   the time budget runs out
//! - **Stop:** exactly one terminal `stop`, `stopping fire` or `premature stop`
//!
//! # Modules
//!
//! - [`protocol`] - Wire messages and line codec
//! - [`transport`] - TCP and in-memory channel bindings
//! - [`coordinator`] - Barrier, broadcaster and run loop
//! - [`sink`] - Result sinks and live counters
//! - [`results`] - Run directories and summaries
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod results;
pub mod shutdown;
pub mod sink;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{HeadQuarters, HqSettings, RunOutcome, RunReport, RunState};
pub use error::HqError;
pub use protocol::{Command, CommandKind, Registration, ResultRecord, StopReason, TurretMessage, TurretStatus};
pub use shutdown::{ShutdownSignal, ShutdownTrigger, shutdown_channel};
pub use sink::{JsonlSink, LiveCounters, MemorySink, ResultSink};
pub use transport::{CollectionChannel, Collector, ControlChannel, Publisher};
