//! Per-run output directory and summary

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::coordinator::{Phase, RunReport, RunState, Turret};
use crate::sink::LiveCounters;

pub const RESULTS_FILE: &str = "results.jsonl";
pub const CONFIG_FILE: &str = "config.yml";
pub const SUMMARY_FILE: &str = "summary.json";

/// Create `results_<YYYYmmdd_HHMMSS>` under `base`
///
/// A second run in the same second gets a numeric suffix rather than sharing
/// a directory.
pub fn create_run_directory(base: &Path) -> Result<PathBuf> {
    debug!(base = %base.display(), "create_run_directory: called");
    fs::create_dir_all(base).context(format!("Failed to create results directory {}", base.display()))?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let mut dir = base.join(format!("results_{}", stamp));
    let mut suffix = 1;
    while dir.exists() {
        dir = base.join(format!("results_{}_{}", stamp, suffix));
        suffix += 1;
    }

    fs::create_dir(&dir).context(format!("Failed to create run directory {}", dir.display()))?;
    info!(dir = %dir.display(), "Created run directory");
    Ok(dir)
}

/// Store the effective config next to the results it produced
pub fn write_config(dir: &Path, config: &Config) -> Result<()> {
    let yaml = config.to_yaml()?;
    fs::write(dir.join(CONFIG_FILE), yaml).context("Failed to write config snapshot")
}

/// What `summary.json` holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub outcome: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_category: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_cause: Option<String>,

    pub turrets: Vec<TurretSummary>,
    pub counters: LiveCounters,

    /// Inbound lines dropped as malformed
    pub rejected_messages: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurretSummary {
    pub uuid: String,
    pub name: String,
    pub status: String,
    pub first_seen: String,
}

impl From<&Turret> for TurretSummary {
    fn from(turret: &Turret) -> Self {
        Self {
            uuid: turret.identity.clone(),
            name: turret.name.clone(),
            status: turret.status.to_string(),
            first_seen: match turret.first_seen {
                Phase::Barrier => "barrier".to_string(),
                Phase::Run => "run".to_string(),
            },
        }
    }
}

impl RunSummary {
    pub fn new(report: &RunReport, turrets: &[Turret], rejected_messages: u64) -> Self {
        let state = report.outcome.state();
        let cause = report.outcome.cause();
        Self {
            run_id: Uuid::now_v7(),
            started_at: report.started_at,
            finished_at: report.finished_at,
            elapsed_secs: report.elapsed.as_secs_f64(),
            outcome: state.to_string(),
            abort_category: cause.map(|c| c.category().to_string()),
            abort_cause: cause.map(|c| c.to_string()),
            turrets: turrets.iter().map(TurretSummary::from).collect(),
            counters: report.counters,
            rejected_messages,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outcome == RunState::Complete.to_string()
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(SUMMARY_FILE);
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run summary")?;
        fs::write(&path, json).context(format!("Failed to write {}", path.display()))?;
        debug!(path = %path.display(), "RunSummary::write: written");
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse run summary")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::RunOutcome;
    use crate::error::HqError;
    use crate::protocol::TurretStatus;
    use std::time::Duration;
    use tempfile::TempDir;

    fn report(outcome: RunOutcome) -> RunReport {
        RunReport {
            outcome,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            elapsed: Duration::from_millis(31_500),
            counters: LiveCounters {
                transaction_count: 40,
                timer_count: 80,
                error_count: 2,
            },
            turrets: 1,
        }
    }

    fn turret() -> Turret {
        Turret {
            identity: "u1".to_string(),
            name: "navigation".to_string(),
            status: TurretStatus::Ready,
            first_seen: Phase::Barrier,
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_run_directories_are_distinct() {
        let base = TempDir::new().unwrap();
        let nested = base.path().join("out");

        let first = create_run_directory(&nested).unwrap();
        let second = create_run_directory(&nested).unwrap();

        assert!(first.is_dir());
        assert!(second.is_dir());
        assert_ne!(first, second);
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("results_"));
        assert_eq!(name.len(), "results_20240101_120000".len());
    }

    #[test]
    fn test_summary_round_trip() {
        let dir = TempDir::new().unwrap();
        let summary = RunSummary::new(&report(RunOutcome::Complete), &[turret()], 3);

        let path = summary.write(dir.path()).unwrap();
        let loaded = RunSummary::load(&path).unwrap();

        assert_eq!(loaded, summary);
        assert!(loaded.is_complete());
        assert_eq!(loaded.turrets[0].first_seen, "barrier");
        assert_eq!(loaded.rejected_messages, 3);
    }

    #[test]
    fn test_aborted_summary_names_cause() {
        let summary = RunSummary::new(
            &report(RunOutcome::Aborted(HqError::Transport("collector closed".to_string()))),
            &[],
            0,
        );

        assert!(!summary.is_complete());
        assert_eq!(summary.outcome, "aborted");
        assert_eq!(summary.abort_category.as_deref(), Some("transport"));
        assert!(summary.abort_cause.unwrap().contains("collector closed"));
    }

    #[test]
    fn test_write_config_snapshot() {
        let dir = TempDir::new().unwrap();
        write_config(dir.path(), &Config::default()).unwrap();

        let yaml = fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(yaml.contains("run-time: 30"));
    }
}
