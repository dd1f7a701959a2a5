//! Append-only JSON-lines result sink
//!
//! One record per line, buffered. Good enough to hand a finished run to the
//! reporting stage; not a storage engine.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use super::{LiveCounters, ResultSink, SinkError};
use crate::protocol::ResultRecord;

pub struct JsonlSink {
    path: PathBuf,
    writer: BufWriter<fs::File>,
    counters: LiveCounters,
}

impl JsonlSink {
    /// Create (or truncate) the results file
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        debug!(?path, "JsonlSink::create: called");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = fs::File::create(&path).await?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            counters: LiveCounters::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResultSink for JsonlSink {
    async fn write_result(&mut self, record: ResultRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.counters.record(&record);
        Ok(())
    }

    fn counters(&self) -> LiveCounters {
        self.counters
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        debug!(path = ?self.path, "JsonlSink::flush: called");
        self.writer.flush().await?;
        Ok(())
    }
}

/// Read back a results file written by [`JsonlSink`]
pub async fn read_results(path: impl AsRef<Path>) -> Result<Vec<ResultRecord>, SinkError> {
    let content = fs::read_to_string(path).await?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(SinkError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn record(n: u32) -> ResultRecord {
        ResultRecord {
            turret: "nav".to_string(),
            turret_uuid: "u1".to_string(),
            epoch: 1_700_000_000.0 + n as f64,
            elapsed: 0.05,
            run_timestamp: Some("2026-10-19T10:00:00".to_string()),
            error: None,
            custom_timers: Some(BTreeMap::from([("login".to_string(), 0.02)])),
        }
    }

    #[tokio::test]
    async fn test_write_flush_read_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run").join("results.jsonl");

        let mut sink = JsonlSink::create(&path).await.unwrap();
        sink.write_result(record(1)).await.unwrap();
        sink.write_result(record(2)).await.unwrap();
        sink.flush().await.unwrap();

        let records = read_results(&path).await.unwrap();
        assert_eq!(records, vec![record(1), record(2)]);
        assert_eq!(sink.counters().transaction_count, 2);
        assert_eq!(sink.counters().timer_count, 2);
    }

    #[tokio::test]
    async fn test_create_truncates() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("results.jsonl");
        std::fs::write(&path, "stale\n").unwrap();

        let mut sink = JsonlSink::create(&path).await.unwrap();
        sink.flush().await.unwrap();

        assert!(read_results(&path).await.unwrap().is_empty());
    }
}
