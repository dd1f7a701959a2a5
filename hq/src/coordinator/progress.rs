//! Live progress display

use std::fmt;
use std::io::Write;
use std::time::Duration;

use colored::Colorize;

use crate::error::HqError;
use crate::sink::LiveCounters;

/// What the progress line shows after each poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub turrets: usize,
    pub elapsed: Duration,
    pub counters: LiveCounters,
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "turrets: {}, elapsed: {}   transactions: {}  timers: {}  errors: {}",
            self.turrets,
            self.elapsed.as_secs_f64().round() as u64,
            self.counters.transaction_count,
            self.counters.timer_count,
            self.counters.error_count
        )
    }
}

/// Receives progress updates from the run loop
pub trait ProgressDisplay: Send {
    fn update(&mut self, snapshot: &ProgressSnapshot);

    /// Called once when the run aborts, before the loop exits
    fn aborted(&mut self, _cause: &HqError) {}

    /// Called once when the loop exits, either way
    fn finish(&mut self) {}
}

/// Discards updates
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressDisplay for NoProgress {
    fn update(&mut self, _snapshot: &ProgressSnapshot) {}
}

/// Rewrites a single terminal line with `\r`
#[derive(Debug, Default)]
pub struct TerminalProgress {
    drawn: bool,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressDisplay for TerminalProgress {
    fn update(&mut self, snapshot: &ProgressSnapshot) {
        let mut out = std::io::stdout().lock();
        let errors = if snapshot.counters.error_count > 0 {
            snapshot.to_string().yellow()
        } else {
            snapshot.to_string().normal()
        };
        let _ = write!(out, "\r{}   ", errors);
        let _ = out.flush();
        self.drawn = true;
    }

    fn aborted(&mut self, cause: &HqError) {
        eprintln!();
        eprintln!("{}", "Stopping test, sending stop command to turrets".red());
        eprintln!("{}", cause);
        self.drawn = false;
    }

    fn finish(&mut self) {
        if self.drawn {
            println!();
            self.drawn = false;
        }
    }
}
