//! In-memory result sink

use async_trait::async_trait;

use super::{LiveCounters, ResultSink, SinkError};
use crate::protocol::ResultRecord;

/// Keeps every record in a `Vec`; can be told to start failing
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<ResultRecord>,
    counters: LiveCounters,
    fail_after: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `accepted` records, then reject every write after that
    pub fn failing_after(accepted: usize) -> Self {
        Self {
            fail_after: Some(accepted),
            ..Default::default()
        }
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn write_result(&mut self, record: ResultRecord) -> Result<(), SinkError> {
        if self.fail_after.is_some_and(|limit| self.records.len() >= limit) {
            return Err(SinkError::Rejected(format!(
                "sink full after {} records",
                self.records.len()
            )));
        }
        self.counters.record(&record);
        self.records.push(record);
        Ok(())
    }

    fn counters(&self) -> LiveCounters {
        self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ResultRecord {
        ResultRecord {
            turret: "nav".to_string(),
            turret_uuid: "u1".to_string(),
            epoch: 1.0,
            elapsed: 0.1,
            run_timestamp: None,
            error: Some("boom".to_string()),
            custom_timers: None,
        }
    }

    #[tokio::test]
    async fn test_failing_after() {
        let mut sink = MemorySink::failing_after(1);
        assert!(sink.write_result(record()).await.is_ok());
        assert!(matches!(sink.write_result(record()).await, Err(SinkError::Rejected(_))));
        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.counters().error_count, 1);
    }
}
