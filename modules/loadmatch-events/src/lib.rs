//! Partitioned, append-only event bus.
//!
//! Producers publish `Envelope`s to the topic their event type maps to. The
//! partition is a stable hash of the envelope's primary entity id, so events
//! for one load (or vehicle, driver, ...) are always read back in publish order.
//! Consumers track a committed position per (group, topic, partition) and
//! resume from it after a restart, which makes delivery at-least-once.

pub mod log;
pub mod memory;
pub mod partition;
pub mod traits;
pub mod types;

pub use log::{EventLog, LogConsumer};
pub use memory::{MemoryBus, MemoryConsumer};
pub use partition::partition_for;
pub use traits::{EventPublisher, EventSource};
pub use types::BusRecord;
