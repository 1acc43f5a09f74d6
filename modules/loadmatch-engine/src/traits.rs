use anyhow::Result;
use async_trait::async_trait;
use loadmatch_common::{DomainEvent, Envelope};

/// Side-effecting reaction to one event type. Errors are isolated: a failing
/// handler neither stops later handlers nor the graph projection.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and failure records.
    fn name(&self) -> &str;

    async fn handle(&self, envelope: &Envelope, event: &DomainEvent) -> Result<()>;
}
