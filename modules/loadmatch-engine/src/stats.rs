//! Consumption counters and the recent-failure list.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The failure list keeps this many most-recent entries.
pub const MAX_FAILURE_RECORDS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchStats {
    pub events_processed: u64,
    pub events_by_type: BTreeMap<String, u64>,
    pub decode_failures: u64,
    pub handler_failures: u64,
    pub mutation_failures: u64,
    pub transport_errors: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", content = "detail", rename_all = "snake_case")]
pub enum FailureStage {
    Decode,
    Handler(String),
    Mutation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub at: DateTime<Utc>,
    pub event_id: Option<String>,
    pub event_type: Option<String>,
    #[serde(flatten)]
    pub stage: FailureStage,
    pub error: String,
}

/// Bounded FIFO of failures. Oldest entries are evicted first.
#[derive(Debug, Default)]
pub(crate) struct FailureLog {
    entries: VecDeque<FailureRecord>,
}

impl FailureLog {
    pub(crate) fn push(&mut self, record: FailureRecord) {
        if self.entries.len() == MAX_FAILURE_RECORDS {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    pub(crate) fn snapshot(&self) -> Vec<FailureRecord> {
        self.entries.iter().cloned().collect()
    }

    pub(crate) fn drain(&mut self) -> Vec<FailureRecord> {
        self.entries.drain(..).collect()
    }
}
