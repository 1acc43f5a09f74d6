//! Seams between the bus and its users.

use async_trait::async_trait;
use loadmatch_common::{Envelope, LoadmatchError};

use crate::types::BusRecord;

/// Publishes envelopes onto the bus.
///
/// Implemented by `EventLog` (Postgres) and `MemoryBus` (tests).
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Append the envelope to its event type's topic. Returns the record.
    async fn publish(&self, envelope: &Envelope) -> Result<BusRecord, LoadmatchError>;
}

/// A consumer-group member reading its assigned partitions.
#[async_trait]
pub trait EventSource: Send {
    /// Join the group on `topics`, resuming from the group's committed positions.
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), LoadmatchError>;

    /// Wait for the next record. Records of one partition arrive in publish order.
    ///
    /// Cancel-safe: dropping the future before it resolves loses nothing.
    async fn next(&mut self) -> Result<BusRecord, LoadmatchError>;

    /// Commit the position after every record returned by `next` so far.
    async fn commit(&mut self) -> Result<(), LoadmatchError>;
}
