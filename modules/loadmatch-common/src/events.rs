//! Domain events carried on the bus.
//!
//! An `Envelope` is what travels on the wire: metadata plus an untyped `data`
//! map. `Envelope::decode` turns it into a `DomainEvent`, a closed union whose
//! variants carry typed payloads, so consumers match exhaustively instead of
//! looking handlers up by string.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::LoadmatchError;
use crate::types::GeoPoint;

// ---------------------------------------------------------------------------
// EventType: closed enumeration of wire names
// ---------------------------------------------------------------------------

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub enum EventType {
    #[serde(rename = "load.created")]
    LoadCreated,
    #[serde(rename = "load.assigned")]
    LoadAssigned,
    #[serde(rename = "load.picked_up")]
    LoadPickedUp,
    #[serde(rename = "load.in_transit")]
    LoadInTransit,
    #[serde(rename = "load.delivered")]
    LoadDelivered,
    #[serde(rename = "load.cancelled")]
    LoadCancelled,
    #[serde(rename = "vehicle.location.updated")]
    VehicleLocationUpdated,
    #[serde(rename = "vehicle.status.changed")]
    VehicleStatusChanged,
    #[serde(rename = "vehicle.assigned")]
    VehicleAssigned,
    #[serde(rename = "vehicle.maintenance.due")]
    VehicleMaintenanceDue,
    #[serde(rename = "driver.status.changed")]
    DriverStatusChanged,
    #[serde(rename = "driver.location.updated")]
    DriverLocationUpdated,
    #[serde(rename = "driver.assigned")]
    DriverAssigned,
    #[serde(rename = "driver.hos.violation")]
    DriverHosViolation,
    #[serde(rename = "route.optimized")]
    RouteOptimized,
    #[serde(rename = "route.deviation")]
    RouteDeviation,
    #[serde(rename = "route.completed")]
    RouteCompleted,
    #[serde(rename = "carrier.performance.updated")]
    CarrierPerformanceUpdated,
    #[serde(rename = "carrier.capacity.changed")]
    CarrierCapacityChanged,
    #[serde(rename = "system.alert")]
    SystemAlert,
    #[serde(rename = "ai.prediction")]
    AiPrediction,
}

impl EventType {
    pub const ALL: [EventType; 21] = [
        EventType::LoadCreated,
        EventType::LoadAssigned,
        EventType::LoadPickedUp,
        EventType::LoadInTransit,
        EventType::LoadDelivered,
        EventType::LoadCancelled,
        EventType::VehicleLocationUpdated,
        EventType::VehicleStatusChanged,
        EventType::VehicleAssigned,
        EventType::VehicleMaintenanceDue,
        EventType::DriverStatusChanged,
        EventType::DriverLocationUpdated,
        EventType::DriverAssigned,
        EventType::DriverHosViolation,
        EventType::RouteOptimized,
        EventType::RouteDeviation,
        EventType::RouteCompleted,
        EventType::CarrierPerformanceUpdated,
        EventType::CarrierCapacityChanged,
        EventType::SystemAlert,
        EventType::AiPrediction,
    ];

    /// Payload keys naming the primary entity, tried in order. Empty for
    /// types that are not about one entity.
    pub fn primary_id_fields(&self) -> &'static [&'static str] {
        match self {
            EventType::LoadCreated => &["load_id", "id"],
            EventType::LoadAssigned
            | EventType::LoadPickedUp
            | EventType::LoadInTransit
            | EventType::LoadDelivered
            | EventType::LoadCancelled => &["load_id"],
            EventType::VehicleLocationUpdated
            | EventType::VehicleStatusChanged
            | EventType::VehicleAssigned
            | EventType::VehicleMaintenanceDue => &["vehicle_id"],
            EventType::DriverStatusChanged
            | EventType::DriverLocationUpdated
            | EventType::DriverAssigned
            | EventType::DriverHosViolation => &["driver_id"],
            EventType::RouteOptimized | EventType::RouteDeviation | EventType::RouteCompleted => {
                &["route_id"]
            }
            EventType::CarrierPerformanceUpdated | EventType::CarrierCapacityChanged => {
                &["carrier_id"]
            }
            EventType::SystemAlert | EventType::AiPrediction => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::LoadCreated => "load.created",
            EventType::LoadAssigned => "load.assigned",
            EventType::LoadPickedUp => "load.picked_up",
            EventType::LoadInTransit => "load.in_transit",
            EventType::LoadDelivered => "load.delivered",
            EventType::LoadCancelled => "load.cancelled",
            EventType::VehicleLocationUpdated => "vehicle.location.updated",
            EventType::VehicleStatusChanged => "vehicle.status.changed",
            EventType::VehicleAssigned => "vehicle.assigned",
            EventType::VehicleMaintenanceDue => "vehicle.maintenance.due",
            EventType::DriverStatusChanged => "driver.status.changed",
            EventType::DriverLocationUpdated => "driver.location.updated",
            EventType::DriverAssigned => "driver.assigned",
            EventType::DriverHosViolation => "driver.hos.violation",
            EventType::RouteOptimized => "route.optimized",
            EventType::RouteDeviation => "route.deviation",
            EventType::RouteCompleted => "route.completed",
            EventType::CarrierPerformanceUpdated => "carrier.performance.updated",
            EventType::CarrierCapacityChanged => "carrier.capacity.changed",
            EventType::SystemAlert => "system.alert",
            EventType::AiPrediction => "ai.prediction",
        }
    }

    /// Topic an event of this type is published to.
    pub fn topic(&self) -> &'static str {
        match self {
            EventType::LoadCreated
            | EventType::LoadAssigned
            | EventType::LoadPickedUp
            | EventType::LoadInTransit
            | EventType::LoadDelivered
            | EventType::LoadCancelled => "tms.loads",
            EventType::VehicleLocationUpdated => "tms.vehicles.tracking",
            EventType::VehicleStatusChanged | EventType::VehicleAssigned => "tms.vehicles",
            EventType::VehicleMaintenanceDue => "tms.vehicles.maintenance",
            EventType::DriverStatusChanged | EventType::DriverAssigned => "tms.drivers",
            EventType::DriverLocationUpdated => "tms.drivers.tracking",
            EventType::DriverHosViolation => "tms.drivers.compliance",
            EventType::RouteOptimized | EventType::RouteCompleted => "tms.routes",
            EventType::RouteDeviation => "tms.routes.alerts",
            EventType::CarrierPerformanceUpdated | EventType::CarrierCapacityChanged => {
                "tms.carriers"
            }
            EventType::SystemAlert => "tms.system.alerts",
            EventType::AiPrediction => "tms.ai.predictions",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = LoadmatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| LoadmatchError::Decode(format!("unknown event type: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Event message wrapper. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Envelope {
    #[serde(rename = "event_id", alias = "id")]
    pub id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(rename = "data", alias = "payload", default)]
    pub payload: Map<String, Value>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Envelope {
    /// Wrap a serializable payload. Assigns a fresh id and the current time.
    pub fn new(
        event_type: EventType,
        source: impl Into<String>,
        payload: &impl Serialize,
    ) -> Result<Self, LoadmatchError> {
        let payload = match serde_json::to_value(payload)? {
            Value::Object(map) => map,
            other => {
                return Err(LoadmatchError::Decode(format!(
                    "payload for {event_type} must be an object, got {other}"
                )))
            }
        };

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            timestamp: Utc::now(),
            source: source.into(),
            correlation_id: None,
            version: default_version(),
            payload,
        })
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The id of the event type's primary entity, falling back to the
    /// envelope id. Per-key ordering on the bus is keyed by this value, so
    /// every event about one route (or load, vehicle, ...) shares a partition
    /// whatever other ids its payload mentions.
    pub fn partition_key(&self) -> String {
        self.event_type
            .primary_id_fields()
            .iter()
            .find_map(|field| match self.payload.get(*field) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| self.id.clone())
    }

    /// Decode the payload into its typed variant.
    pub fn decode(&self) -> Result<DomainEvent, LoadmatchError> {
        let event = match self.event_type {
            EventType::LoadCreated => DomainEvent::LoadCreated(self.parse()?),
            EventType::LoadAssigned => DomainEvent::LoadAssigned(self.parse()?),
            EventType::LoadPickedUp => DomainEvent::LoadPickedUp(self.parse()?),
            EventType::LoadInTransit => DomainEvent::LoadInTransit(self.parse()?),
            EventType::LoadDelivered => DomainEvent::LoadDelivered(self.parse()?),
            EventType::LoadCancelled => DomainEvent::LoadCancelled(self.parse()?),
            EventType::VehicleLocationUpdated => DomainEvent::VehicleLocationUpdated(self.parse()?),
            EventType::VehicleStatusChanged => DomainEvent::VehicleStatusChanged(self.parse()?),
            EventType::VehicleAssigned => DomainEvent::VehicleAssigned(self.parse()?),
            EventType::DriverStatusChanged => DomainEvent::DriverStatusChanged(self.parse()?),
            EventType::DriverLocationUpdated => DomainEvent::DriverLocationUpdated(self.parse()?),
            EventType::DriverAssigned => DomainEvent::DriverAssigned(self.parse()?),
            EventType::RouteOptimized => DomainEvent::RouteOptimized(self.parse()?),
            EventType::RouteCompleted => DomainEvent::RouteCompleted(self.parse()?),
            EventType::CarrierPerformanceUpdated => {
                DomainEvent::CarrierPerformanceUpdated(self.parse()?)
            }
            EventType::VehicleMaintenanceDue
            | EventType::DriverHosViolation
            | EventType::RouteDeviation
            | EventType::CarrierCapacityChanged
            | EventType::SystemAlert
            | EventType::AiPrediction => DomainEvent::Informational(self.event_type),
        };
        Ok(event)
    }

    fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, LoadmatchError> {
        serde_json::from_value(Value::Object(self.payload.clone())).map_err(|e| {
            LoadmatchError::Decode(format!("{} payload for event {}: {e}", self.event_type, self.id))
        })
    }
}

// ---------------------------------------------------------------------------
// DomainEvent: typed payload union
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    LoadCreated(LoadCreated),
    LoadAssigned(LoadAssigned),
    LoadPickedUp(LoadStatusChange),
    LoadInTransit(LoadStatusChange),
    LoadDelivered(LoadStatusChange),
    LoadCancelled(LoadStatusChange),
    VehicleLocationUpdated(VehicleLocation),
    VehicleStatusChanged(VehicleStatus),
    VehicleAssigned(VehicleAssignment),
    DriverStatusChanged(DriverStatus),
    DriverLocationUpdated(DriverLocation),
    DriverAssigned(DriverAssignment),
    RouteOptimized(RouteOptimized),
    RouteCompleted(RouteCompleted),
    CarrierPerformanceUpdated(CarrierPerformance),
    /// Known types with no graph meaning (alerts, predictions, maintenance).
    Informational(EventType),
}

impl DomainEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            DomainEvent::LoadCreated(_) => EventType::LoadCreated,
            DomainEvent::LoadAssigned(_) => EventType::LoadAssigned,
            DomainEvent::LoadPickedUp(_) => EventType::LoadPickedUp,
            DomainEvent::LoadInTransit(_) => EventType::LoadInTransit,
            DomainEvent::LoadDelivered(_) => EventType::LoadDelivered,
            DomainEvent::LoadCancelled(_) => EventType::LoadCancelled,
            DomainEvent::VehicleLocationUpdated(_) => EventType::VehicleLocationUpdated,
            DomainEvent::VehicleStatusChanged(_) => EventType::VehicleStatusChanged,
            DomainEvent::VehicleAssigned(_) => EventType::VehicleAssigned,
            DomainEvent::DriverStatusChanged(_) => EventType::DriverStatusChanged,
            DomainEvent::DriverLocationUpdated(_) => EventType::DriverLocationUpdated,
            DomainEvent::DriverAssigned(_) => EventType::DriverAssigned,
            DomainEvent::RouteOptimized(_) => EventType::RouteOptimized,
            DomainEvent::RouteCompleted(_) => EventType::RouteCompleted,
            DomainEvent::CarrierPerformanceUpdated(_) => EventType::CarrierPerformanceUpdated,
            DomainEvent::Informational(t) => *t,
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Location {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lng")]
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zipcode: Option<String>,
}

impl Location {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            address: None,
            city: None,
            state: None,
            zipcode: None,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LoadCreated {
    #[serde(alias = "id", deserialize_with = "de::id")]
    pub load_id: String,
    #[serde(default, deserialize_with = "de::opt_id", skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, alias = "volume_cubic_feet", skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LoadAssigned {
    #[serde(deserialize_with = "de::id")]
    pub load_id: String,
    #[serde(default, deserialize_with = "de::opt_id", skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_id", skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_id", skip_serializing_if = "Option::is_none")]
    pub carrier_id: Option<String>,
}

/// Shared payload for picked-up, in-transit, delivered and cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LoadStatusChange {
    #[serde(deserialize_with = "de::id")]
    pub load_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VehicleLocation {
    #[serde(deserialize_with = "de::id")]
    pub vehicle_id: String,
    #[serde(default, deserialize_with = "de::opt_id", skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DriverLocation {
    #[serde(deserialize_with = "de::id")]
    pub driver_id: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VehicleStatus {
    #[serde(deserialize_with = "de::id")]
    pub vehicle_id: String,
    #[serde(alias = "new_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DriverStatus {
    #[serde(deserialize_with = "de::id")]
    pub driver_id: String,
    #[serde(alias = "new_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_remaining: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VehicleAssignment {
    #[serde(deserialize_with = "de::id")]
    pub vehicle_id: String,
    #[serde(default, deserialize_with = "de::opt_id", skip_serializing_if = "Option::is_none")]
    pub carrier_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_id", skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DriverAssignment {
    #[serde(deserialize_with = "de::id")]
    pub driver_id: String,
    #[serde(default, deserialize_with = "de::opt_id", skip_serializing_if = "Option::is_none")]
    pub load_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_id", skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
}

/// Emitted on optimization completion and consumed by the graph projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouteOptimized {
    #[serde(deserialize_with = "de::id")]
    pub route_id: String,
    #[serde(default, deserialize_with = "de::ids")]
    pub load_ids: Vec<String>,
    /// Single-load producers send `load_id` instead of `load_ids`.
    #[serde(default, deserialize_with = "de::opt_id", skip_serializing_if = "Option::is_none")]
    pub load_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_id")]
    pub vehicle_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_id")]
    pub driver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_distance: Option<f64>,
    #[serde(default, alias = "distance")]
    pub optimized_distance: Option<f64>,
    #[serde(default, alias = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization_score: Option<f64>,
    #[serde(default)]
    pub traffic_considered: bool,
    #[serde(default)]
    pub steps_count: usize,
}

impl RouteOptimized {
    /// Every load this route serves, deduplicated, in order of appearance.
    pub fn all_load_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::with_capacity(self.load_ids.len() + 1);
        for id in self.load_ids.iter().chain(self.load_id.iter()) {
            if !id.is_empty() && !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouteCompleted {
    #[serde(deserialize_with = "de::id")]
    pub route_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CarrierPerformance {
    #[serde(deserialize_with = "de::id")]
    pub carrier_id: String,
    #[serde(alias = "performance")]
    pub on_time_percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Identifier fields arrive as strings from most producers and as integers
/// from a few legacy ones. Both become strings.
mod de {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        match Value::deserialize(d)? {
            Value::String(s) if !s.is_empty() => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(D::Error::custom(format!("expected a non-empty id, got {other}"))),
        }
    }

    pub fn opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::String(s) if s.is_empty() => Ok(None),
            Value::String(s) => Ok(Some(s)),
            Value::Number(n) => Ok(Some(n.to_string())),
            other => Err(D::Error::custom(format!("expected an id, got {other}"))),
        }
    }

    pub fn ids<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) if s.is_empty() => None,
                    Value::String(s) => Some(Ok(s)),
                    Value::Number(n) => Some(Ok(n.to_string())),
                    other => Some(Err(D::Error::custom(format!("expected an id, got {other}")))),
                })
                .collect(),
            other => Err(D::Error::custom(format!("expected a list of ids, got {other}"))),
        }
    }
}
