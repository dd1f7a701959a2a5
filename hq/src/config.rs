//! oct-hq configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_MAX_MESSAGE_SIZE;

/// Main oct-hq configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Test timing
    pub run: RunConfig,

    /// Socket addresses and limits
    pub network: NetworkConfig,

    /// Barrier and poll settings
    pub coordinator: CoordinatorConfig,

    /// Where run directories are created
    pub results: ResultsConfig,

    /// Log filter directive (`info`, `debug`, `oct_hq=trace`, ...)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Config {
    /// Reject values the coordinator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.run.run_time == 0 {
            return Err(eyre::eyre!("run-time must be greater than zero"));
        }
        if self.coordinator.poll_interval_ms == 0 {
            return Err(eyre::eyre!("poll-interval-ms must be greater than zero"));
        }
        if self.coordinator.turrets == 0 {
            return Err(eyre::eyre!("turrets must be at least 1"));
        }
        if self.network.publish_port == self.network.rc_port {
            return Err(eyre::eyre!(
                "publish-port and rc-port must differ (both {})",
                self.network.publish_port
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local: ./oct-hq.yml
        let local_config = PathBuf::from("oct-hq.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User: ~/.config/oct-hq/oct-hq.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("oct-hq").join("oct-hq.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Parse one file; `.json` is read as a project config, anything else as YAML
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).context("Failed to read config file")?;

        let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            let project: ProjectConfig = serde_json::from_str(&content).context("Failed to parse project config")?;
            project.into_config()
        } else {
            serde_yaml::from_str(&content).context("Failed to parse config file")?
        };

        tracing::info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Effective configuration as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }

    /// Address the control channel binds to
    pub fn publish_addr(&self) -> String {
        format!("{}:{}", self.network.bind_address, self.network.publish_port)
    }

    /// Address the collection channel binds to
    pub fn rc_addr(&self) -> String {
        format!("{}:{}", self.network.bind_address, self.network.rc_port)
    }
}

/// Log level from a config file, read before logging is set up
///
/// Errors are swallowed here: the real load runs right after and reports them.
pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
    Config::load(config_path).ok().and_then(|config| config.log_level)
}

/// Test timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Nominal test duration in seconds
    #[serde(rename = "run-time")]
    pub run_time: u64,

    /// Bucket width in seconds for time-series reports built from the results
    #[serde(rename = "results-ts-interval")]
    pub results_ts_interval: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_time: 30,
            results_ts_interval: 10,
        }
    }
}

impl RunConfig {
    pub fn run_time(&self) -> Duration {
        Duration::from_secs(self.run_time)
    }
}

/// Socket addresses and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    #[serde(rename = "bind-address")]
    pub bind_address: String,

    /// Control channel port (commands out)
    #[serde(rename = "publish-port")]
    pub publish_port: u16,

    /// Collection channel port (registrations and results in)
    #[serde(rename = "rc-port")]
    pub rc_port: u16,

    /// Longest accepted inbound line in bytes
    #[serde(rename = "max-message-size")]
    pub max_message_size: usize,

    /// Inbound messages buffered between the sockets and the run loop
    #[serde(rename = "queue-capacity")]
    pub queue_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            publish_port: 5000,
            rc_port: 5001,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            queue_capacity: 10_000,
        }
    }
}

/// Barrier and poll settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Distinct turrets required before the run starts
    pub turrets: usize,

    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Give up waiting for turrets after this many seconds
    #[serde(rename = "barrier-timeout-secs", skip_serializing_if = "Option::is_none")]
    pub barrier_timeout_secs: Option<u64>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            turrets: 1,
            poll_interval_ms: 1000,
            barrier_timeout_secs: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn barrier_timeout(&self) -> Option<Duration> {
        self.barrier_timeout_secs.map(Duration::from_secs)
    }
}

/// Where run directories are created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    pub directory: PathBuf,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("results"),
        }
    }
}

/// Flat JSON project config as written next to a test plan
#[derive(Debug, Deserialize)]
struct ProjectConfig {
    run_time: Option<u64>,
    results_ts_interval: Option<u64>,
    publish_port: Option<u16>,
    rc_port: Option<u16>,
    min_turrets: Option<usize>,
}

impl ProjectConfig {
    fn into_config(self) -> Config {
        let mut config = Config::default();
        if let Some(run_time) = self.run_time {
            config.run.run_time = run_time;
        }
        if let Some(interval) = self.results_ts_interval {
            config.run.results_ts_interval = interval;
        }
        if let Some(port) = self.publish_port {
            config.network.publish_port = port;
        }
        if let Some(port) = self.rc_port {
            config.network.rc_port = port;
        }
        if let Some(turrets) = self.min_turrets {
            config.coordinator.turrets = turrets;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.run.run_time, 30);
        assert_eq!(config.network.publish_port, 5000);
        assert_eq!(config.network.rc_port, 5001);
        assert_eq!(config.network.max_message_size, 64 * 1024);
        assert_eq!(config.coordinator.turrets, 1);
        assert_eq!(config.coordinator.barrier_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_partial_override() {
        let yaml = r#"
run:
  run-time: 5
coordinator:
  turrets: 4
  barrier-timeout-secs: 60
log-level: debug
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.run.run_time(), Duration::from_secs(5));
        assert_eq!(config.run.results_ts_interval, 10);
        assert_eq!(config.coordinator.turrets, 4);
        assert_eq!(config.coordinator.barrier_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.coordinator.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.run.run_time = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.coordinator.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.coordinator.turrets = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.network.rc_port = config.network.publish_port;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_load_json_project_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"run_time": 12, "results_ts_interval": 2, "publish_port": 6000, "rc_port": 6001, "min_turrets": 3, "testing": false}"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.run.run_time, 12);
        assert_eq!(config.run.results_ts_interval, 2);
        assert_eq!(config.publish_addr(), "0.0.0.0:6000");
        assert_eq!(config.rc_addr(), "0.0.0.0:6001");
        assert_eq!(config.coordinator.turrets, 3);
    }

    #[test]
    fn test_explicit_path_errors_are_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.yml");
        fs::write(&path, "run: [not, a, map").unwrap();

        assert!(Config::load(Some(&path)).is_err());
        assert!(Config::load(Some(&dir.path().join("missing.yml"))).is_err());
    }

    #[test]
    fn test_yaml_round_trip_keeps_kebab_keys() {
        let config = Config::default();
        let yaml = config.to_yaml().unwrap();

        assert!(yaml.contains("run-time: 30"));
        assert!(yaml.contains("publish-port: 5000"));
        assert!(!yaml.contains("barrier-timeout-secs"));
        assert_eq!(serde_yaml::from_str::<Config>(&yaml).unwrap(), config);
    }

    #[test]
    #[serial]
    fn test_local_config_fallback() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("oct-hq.yml"), "run:\n  run-time: 7\n").unwrap();
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        let config = Config::load(None);
        let log_level = load_log_level(None);

        std::env::set_current_dir(previous).unwrap();
        assert_eq!(config.unwrap().run.run_time, 7);
        assert_eq!(log_level, None);
    }
}
