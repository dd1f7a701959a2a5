//! oct-hq - load test headquarters
//!
//! CLI entry point: bind both channels, wait for turrets, run the test.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use oct_hq::cli::{Cli, Command, RunArgs, get_log_path};
use oct_hq::config::{Config, load_log_level};
use oct_hq::coordinator::{HeadQuarters, HqSettings, TerminalProgress};
use oct_hq::results::{self, RESULTS_FILE, RunSummary};
use oct_hq::shutdown::{listen_for_signals, shutdown_channel};
use oct_hq::sink::JsonlSink;
use oct_hq::transport::{Collector, Publisher};

/// How long to wait for the terminal stop to reach subscribers before exit
const STOP_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

fn setup_logging(level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to log file, stdout belongs to the progress line
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context(format!("Invalid log level: {}", level))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();

    info!("Logging initialized (level: {})", level.unwrap_or("default"));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG sits between the flag and the config file
    let level = match cli.log_level.clone() {
        Some(level) => Some(level),
        None if std::env::var("RUST_LOG").is_ok() => None,
        None => load_log_level(cli.config.as_ref()),
    };
    setup_logging(level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Run(args) => cmd_run(config, &args).await,
        Command::Config => cmd_config(&config),
    }
}

/// Print the effective configuration
fn cmd_config(config: &Config) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}

/// Run one load test end to end
async fn cmd_run(mut config: Config, args: &RunArgs) -> Result<()> {
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    info!(
        "oct-hq run: turrets={}, run_time={}s, publish={}, rc={}",
        config.coordinator.turrets,
        config.run.run_time,
        config.publish_addr(),
        config.rc_addr()
    );

    let run_dir = results::create_run_directory(&config.results.directory)?;
    results::write_config(&run_dir, &config)?;

    let publisher = Publisher::bind(&config.publish_addr()).await?;
    let collector = Collector::bind(
        &config.rc_addr(),
        config.network.max_message_size,
        config.network.queue_capacity,
    )
    .await?;
    let sink = JsonlSink::create(run_dir.join(RESULTS_FILE)).await?;

    println!(
        "Broadcasting on {}, collecting on {}",
        publisher.local_addr(),
        collector.local_addr()
    );

    let (trigger, signal) = shutdown_channel();
    // Stays alive until exit so a repeated signal can still force it
    let _signals = listen_for_signals(trigger);

    let mut hq = HeadQuarters::new(publisher, collector, sink, HqSettings::from_config(&config))
        .with_shutdown(signal)
        .with_progress(Box::new(TerminalProgress::new()));

    println!("Waiting for {} turrets...", config.coordinator.turrets);
    hq.await_turrets(config.coordinator.turrets)
        .await
        .context("Turrets did not report in")?;

    println!("{}", "Turrets ready:".green());
    for turret in hq.turrets() {
        println!("  {}", turret);
    }

    let report = hq.run().await?;
    hq.control().drain(STOP_DRAIN_TIMEOUT).await;

    let summary = RunSummary::new(&report, hq.turrets(), hq.collector().rejected_count());
    let summary_path = summary.write(&run_dir)?;
    if summary.rejected_messages > 0 {
        warn!(rejected = summary.rejected_messages, "Malformed messages were dropped");
    }

    println!(
        "{} turrets, {} transactions, {} timers, {} errors in {:.1}s",
        report.turrets,
        report.counters.transaction_count,
        report.counters.timer_count,
        report.counters.error_count,
        report.elapsed.as_secs_f64()
    );
    println!("Results written to {}", run_dir.display());
    info!(summary = %summary_path.display(), outcome = %summary.outcome, "Run summary written");

    match report.outcome.cause() {
        Some(cause) if cause.is_cancelled() => Err(eyre::eyre!("Run interrupted, turrets were told to stop")),
        Some(cause) => Err(eyre::eyre!("Run aborted ({}): {}", cause.category(), cause)),
        None => Ok(()),
    }
}
