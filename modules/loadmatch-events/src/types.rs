//! Records as they come off the bus.

use chrono::{DateTime, Utc};
use loadmatch_common::{Envelope, LoadmatchError};
use serde::{Deserialize, Serialize};

/// One published envelope at its position in a topic partition.
///
/// The envelope is kept as raw JSON. A record whose event type this build
/// does not know still has to be delivered, so it can be logged, counted
/// and committed past.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusRecord {
    pub seq: i64,
    pub topic: String,
    pub partition: i32,
    pub partition_key: String,
    pub envelope: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

impl BusRecord {
    pub fn envelope(&self) -> Result<Envelope, LoadmatchError> {
        serde_json::from_value(self.envelope.clone()).map_err(|e| {
            LoadmatchError::Decode(format!(
                "envelope at {}/{}#{}: {e}",
                self.topic, self.partition, self.seq
            ))
        })
    }
}
