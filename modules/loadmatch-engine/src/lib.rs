//! Event dispatch for the graph-sync consumer.
//!
//! One `EventDispatcher` per process pulls records off the bus one at a time,
//! runs the handlers registered for the record's event type, then hands the
//! event to the `GraphSynchronizer`. Every per-message failure is absorbed and
//! recorded; only a failed subscription stops the loop.

pub mod dispatcher;
pub mod handlers;
pub mod stats;
pub mod traits;

pub use dispatcher::{DispatchReport, DispatcherState, EventDispatcher};
pub use handlers::{ComplianceAlertLogger, EventLogger};
pub use stats::{DispatchStats, FailureRecord, FailureStage, MAX_FAILURE_RECORDS};
pub use traits::EventHandler;
