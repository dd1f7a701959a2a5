//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

/// oct-hq - load test headquarters
#[derive(Debug, Parser)]
#[command(
    name = "oct-hq",
    about = "Coordinates turrets for a distributed load test and collects their results",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/oct-hq/logs/oct-hq.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file (.yml or project .json)")]
    pub config: Option<PathBuf>,

    /// Log filter, overrides the config file and RUST_LOG
    #[arg(short, long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test: wait for turrets, start them, collect results
    Run(RunArgs),

    /// Print the effective configuration as YAML
    Config,
}

/// Overrides for a single run
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RunArgs {
    /// Distinct turrets required before starting
    #[arg(short, long)]
    pub turrets: Option<usize>,

    /// Test duration in seconds
    #[arg(short, long, value_name = "SECS")]
    pub run_time: Option<u64>,

    /// Give up waiting for turrets after this many seconds
    #[arg(short, long, value_name = "SECS")]
    pub barrier_timeout: Option<u64>,

    /// Directory run directories are created under
    #[arg(long, value_name = "DIR")]
    pub results_dir: Option<PathBuf>,

    /// Control channel port
    #[arg(long)]
    pub publish_port: Option<u16>,

    /// Collection channel port
    #[arg(long)]
    pub rc_port: Option<u16>,
}

impl RunArgs {
    /// Layer these flags over a loaded config
    pub fn apply(&self, config: &mut Config) {
        if let Some(turrets) = self.turrets {
            config.coordinator.turrets = turrets;
        }
        if let Some(run_time) = self.run_time {
            config.run.run_time = run_time;
        }
        if let Some(timeout) = self.barrier_timeout {
            config.coordinator.barrier_timeout_secs = Some(timeout);
        }
        if let Some(dir) = &self.results_dir {
            config.results.directory = dir.clone();
        }
        if let Some(port) = self.publish_port {
            config.network.publish_port = port;
        }
        if let Some(port) = self.rc_port {
            config.network.rc_port = port;
        }
    }
}

/// Get the path to the log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("oct-hq")
        .join("logs")
        .join("oct-hq.log")
}
