//! Built-in handlers registered by the graph-sync consumer.

use anyhow::Result;
use async_trait::async_trait;
use loadmatch_common::{DomainEvent, Envelope, EventType};
use tracing::{info, warn};

use crate::traits::EventHandler;

/// Logs every event it is registered for at info level.
pub struct EventLogger;

#[async_trait]
impl EventHandler for EventLogger {
    fn name(&self) -> &str {
        "event-logger"
    }

    async fn handle(&self, envelope: &Envelope, _event: &DomainEvent) -> Result<()> {
        info!(
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            source = %envelope.source,
            correlation_id = envelope.correlation_id.as_deref().unwrap_or(""),
            "Event received"
        );
        Ok(())
    }
}

/// Surfaces compliance and operational alerts at warn level.
pub struct ComplianceAlertLogger;

impl ComplianceAlertLogger {
    pub const EVENT_TYPES: [EventType; 4] = [
        EventType::DriverHosViolation,
        EventType::VehicleMaintenanceDue,
        EventType::RouteDeviation,
        EventType::SystemAlert,
    ];
}

#[async_trait]
impl EventHandler for ComplianceAlertLogger {
    fn name(&self) -> &str {
        "compliance-alert-logger"
    }

    async fn handle(&self, envelope: &Envelope, _event: &DomainEvent) -> Result<()> {
        let subject = ["driver_id", "vehicle_id", "route_id"]
            .iter()
            .find_map(|k| envelope.payload.get(*k).and_then(|v| v.as_str()))
            .unwrap_or("-");
        let severity = envelope
            .payload
            .get("severity")
            .and_then(|v| v.as_str())
            .unwrap_or("unspecified");
        warn!(
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            subject,
            severity,
            "Operational alert"
        );
        Ok(())
    }
}
