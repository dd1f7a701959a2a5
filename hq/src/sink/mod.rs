//! Result sink contract
//!
//! The run loop hands every result record to a [`ResultSink`] and reads its
//! [`LiveCounters`] for the progress line. Persistence and reporting beyond
//! that belong to the sink.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::ResultRecord;

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlSink;
pub use memory::MemorySink;

/// Errors writing to a sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record rejected: {0}")]
    Rejected(String),
}

/// Running totals over ingested results
///
/// Display-only aggregate, not authoritative data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveCounters {
    pub transaction_count: u64,
    pub timer_count: u64,
    pub error_count: u64,
}

impl LiveCounters {
    /// Fold one record into the totals
    pub fn record(&mut self, result: &ResultRecord) {
        self.transaction_count += 1;
        self.timer_count += result.timer_count() as u64;
        if result.is_error() {
            self.error_count += 1;
        }
    }
}

/// Destination for ingested result records
#[async_trait]
pub trait ResultSink: Send {
    /// Persist one record; ownership passes to the sink
    async fn write_result(&mut self, record: ResultRecord) -> Result<(), SinkError>;

    /// Current totals; must not block
    fn counters(&self) -> LiveCounters;

    /// Push buffered records to durable storage
    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(error: Option<&str>, timers: &[(&str, f64)]) -> ResultRecord {
        ResultRecord {
            turret: "nav".to_string(),
            turret_uuid: "u1".to_string(),
            epoch: 1.0,
            elapsed: 0.1,
            run_timestamp: None,
            error: error.map(str::to_string),
            custom_timers: if timers.is_empty() {
                None
            } else {
                Some(timers.iter().map(|(k, v)| (k.to_string(), *v)).collect::<BTreeMap<_, _>>())
            },
        }
    }

    #[test]
    fn test_counters_record() {
        let mut counters = LiveCounters::default();
        counters.record(&record(None, &[]));
        counters.record(&record(Some(""), &[("login", 0.2), ("search", 0.4)]));
        counters.record(&record(Some("timeout"), &[("login", 0.3)]));

        assert_eq!(
            counters,
            LiveCounters {
                transaction_count: 3,
                timer_count: 3,
                error_count: 1,
            }
        );
    }
}
