//! GraphSynchronizer: projects domain events into the graph.
//!
//! `plan` is pure: it maps one decoded event to the mutations it implies and
//! never reads the graph or the clock. All timestamps come from the envelope,
//! so a redelivered event writes exactly what its first delivery wrote.
//!
//! Mutations are applied one by one. A failed mutation is recorded in the
//! `SyncReport` and the rest still run; nothing is retried here. Redelivery
//! from the bus is the only recovery path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use loadmatch_common::events::{
    DomainEvent, DriverAssignment, DriverStatus, LoadAssigned, LoadCreated, Location,
    RouteOptimized, VehicleAssignment, VehicleStatus,
};
use loadmatch_common::{status, Envelope, EventType, LoadmatchError};
use serde::Serialize;
use tracing::{debug, warn};

use crate::mutation::{push_opt, GraphMutation, NodeLabel, PropValue, Props, RelType};
use crate::store::GraphStore;

/// One mutation that failed to apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationFailure {
    pub mutation: String,
    pub error: String,
}

/// Outcome of projecting a single event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub event_id: String,
    pub event_type: EventType,
    pub planned: usize,
    pub applied: usize,
    pub failures: Vec<MutationFailure>,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.planned == 0
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct GraphSynchronizer {
    store: Arc<dyn GraphStore>,
}

impl GraphSynchronizer {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Decode and project an envelope.
    pub async fn handle_event(&self, envelope: &Envelope) -> Result<SyncReport, LoadmatchError> {
        let event = envelope.decode()?;
        Ok(self.apply(envelope, &event).await)
    }

    /// Project an already-decoded event.
    pub async fn apply(&self, envelope: &Envelope, event: &DomainEvent) -> SyncReport {
        let mutations = plan(event, envelope.timestamp);
        let mut report = SyncReport {
            event_id: envelope.id.clone(),
            event_type: envelope.event_type,
            planned: mutations.len(),
            applied: 0,
            failures: Vec::new(),
        };

        if mutations.is_empty() {
            debug!(event_id = %envelope.id, event_type = %envelope.event_type, "No-op (no graph projection)");
            return report;
        }

        for mutation in &mutations {
            match self.store.apply(mutation).await {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    warn!(
                        event_id = %envelope.id,
                        event_type = %envelope.event_type,
                        mutation = %mutation,
                        error = %e,
                        "Graph mutation failed"
                    );
                    report.failures.push(MutationFailure {
                        mutation: mutation.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        debug!(
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            applied = report.applied,
            failed = report.failures.len(),
            "Projected event"
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Event -> mutations
// ---------------------------------------------------------------------------

/// The mutations an event implies, in application order.
pub fn plan(event: &DomainEvent, at: DateTime<Utc>) -> Vec<GraphMutation> {
    match event {
        DomainEvent::LoadCreated(p) => load_created(p, at),
        DomainEvent::LoadAssigned(p) => load_assigned(p, at),
        DomainEvent::LoadPickedUp(p) => vec![load_status(&p.load_id, status::PICKED_UP, None, at)],
        DomainEvent::LoadInTransit(p) => {
            vec![load_status(&p.load_id, status::IN_TRANSIT, None, at)]
        }
        DomainEvent::LoadDelivered(p) => vec![load_status(
            &p.load_id,
            status::DELIVERED,
            Some("delivered_at"),
            at,
        )],
        DomainEvent::LoadCancelled(p) => {
            let mut set = load_status(&p.load_id, status::CANCELLED, Some("cancelled_at"), at);
            if let (Some(reason), GraphMutation::SetProps { props, .. }) = (&p.reason, &mut set) {
                props.push(("cancellation_reason", reason.clone().into()));
            }
            vec![
                set,
                GraphMutation::RemoveEdgesTo {
                    rel: RelType::ASSIGNED_TO,
                    to: p.load_id.clone(),
                },
                GraphMutation::RemoveEdgesTo {
                    rel: RelType::TRANSPORTS,
                    to: p.load_id.clone(),
                },
            ]
        }
        DomainEvent::VehicleLocationUpdated(p) => {
            let mut props = location_props(&p.location, at);
            push_opt(&mut props, "speed", p.speed);
            push_opt(&mut props, "heading", p.heading);
            vec![GraphMutation::merge_node(NodeLabel::Vehicle, &p.vehicle_id, props)]
        }
        DomainEvent::DriverLocationUpdated(p) => vec![GraphMutation::merge_node(
            NodeLabel::Driver,
            &p.driver_id,
            location_props(&p.location, at),
        )],
        DomainEvent::VehicleStatusChanged(p) => vec![vehicle_status(p, at)],
        DomainEvent::DriverStatusChanged(p) => vec![driver_status(p, at)],
        DomainEvent::VehicleAssigned(p) => vehicle_assigned(p, at),
        DomainEvent::DriverAssigned(p) => driver_assigned(p, at),
        DomainEvent::RouteOptimized(p) => route_optimized(p, at),
        DomainEvent::RouteCompleted(p) => vec![GraphMutation::set_props(
            NodeLabel::Route,
            &p.route_id,
            vec![
                ("status", status::COMPLETED.into()),
                ("completed_at", at.into()),
            ],
        )],
        DomainEvent::CarrierPerformanceUpdated(p) => {
            let mut props: Props = vec![
                ("on_time_percentage", p.on_time_percentage.into()),
                ("updated_at", at.into()),
            ];
            push_opt(&mut props, "name", p.name.clone());
            vec![GraphMutation::merge_node(NodeLabel::Carrier, &p.carrier_id, props)]
        }
        DomainEvent::Informational(_) => Vec::new(),
    }
}

fn load_created(p: &LoadCreated, at: DateTime<Utc>) -> Vec<GraphMutation> {
    let mut props: Props = Vec::new();
    push_opt(&mut props, "customer_id", p.customer_id.clone());
    if let Some(loc) = &p.pickup_location {
        props.push(("pickup_lat", loc.latitude.into()));
        props.push(("pickup_lng", loc.longitude.into()));
        push_opt(&mut props, "pickup_address", loc.address.clone());
        push_opt(&mut props, "pickup_city", loc.city.clone());
        push_opt(&mut props, "pickup_state", loc.state.clone());
    }
    if let Some(loc) = &p.delivery_location {
        props.push(("delivery_lat", loc.latitude.into()));
        props.push(("delivery_lng", loc.longitude.into()));
        push_opt(&mut props, "delivery_address", loc.address.clone());
        push_opt(&mut props, "delivery_city", loc.city.clone());
        push_opt(&mut props, "delivery_state", loc.state.clone());
    }
    push_opt(&mut props, "weight", p.weight);
    push_opt(&mut props, "volume", p.volume);
    props.push((
        "status",
        p.status.clone().unwrap_or_else(|| status::PENDING.to_string()).into(),
    ));
    props.push(("created_at", at.into()));

    let mut mutations = vec![GraphMutation::merge_node(NodeLabel::Load, &p.load_id, props)];
    // Only links a Customer node that some other writer already created.
    if let Some(customer_id) = &p.customer_id {
        mutations.push(GraphMutation::merge_edge(
            RelType::ORDERS,
            customer_id,
            &p.load_id,
            Vec::new(),
        ));
    }
    mutations
}

fn load_assigned(p: &LoadAssigned, at: DateTime<Utc>) -> Vec<GraphMutation> {
    let mut mutations = vec![GraphMutation::set_props(
        NodeLabel::Load,
        &p.load_id,
        vec![("status", status::ASSIGNED.into()), ("assigned_at", at.into())],
    )];
    if let Some(driver_id) = &p.driver_id {
        mutations.push(GraphMutation::ensure_node(NodeLabel::Driver, driver_id));
        mutations.push(GraphMutation::merge_edge(
            RelType::ASSIGNED_TO,
            driver_id,
            &p.load_id,
            vec![("assigned_at", at.into())],
        ));
    }
    if let Some(vehicle_id) = &p.vehicle_id {
        mutations.push(GraphMutation::ensure_node(NodeLabel::Vehicle, vehicle_id));
        mutations.push(GraphMutation::merge_edge(
            RelType::TRANSPORTS,
            vehicle_id,
            &p.load_id,
            vec![("assigned_at", at.into())],
        ));
    }
    mutations
}

fn load_status(
    load_id: &str,
    new_status: &str,
    terminal_field: Option<&'static str>,
    at: DateTime<Utc>,
) -> GraphMutation {
    let mut props: Props = vec![("status", new_status.into()), ("updated_at", at.into())];
    if let Some(field) = terminal_field {
        props.push((field, at.into()));
    }
    GraphMutation::set_props(NodeLabel::Load, load_id, props)
}

fn location_props(loc: &Location, at: DateTime<Utc>) -> Props {
    vec![
        ("latitude", loc.latitude.into()),
        ("longitude", loc.longitude.into()),
        ("updated_at", at.into()),
    ]
}

fn vehicle_status(p: &VehicleStatus, at: DateTime<Utc>) -> GraphMutation {
    let mut props: Props = vec![("status", p.status.clone().into()), ("updated_at", at.into())];
    push_opt(&mut props, "capacity_weight", p.capacity_weight);
    push_opt(&mut props, "capacity_volume", p.capacity_volume);
    GraphMutation::set_props(NodeLabel::Vehicle, &p.vehicle_id, props)
}

fn driver_status(p: &DriverStatus, at: DateTime<Utc>) -> GraphMutation {
    let mut props: Props = vec![("status", p.status.clone().into()), ("updated_at", at.into())];
    push_opt(&mut props, "hours_remaining", p.hours_remaining);
    push_opt(&mut props, "rating", p.rating);
    if let Some(loc) = &p.location {
        props.push(("latitude", PropValue::Float(loc.latitude)));
        props.push(("longitude", PropValue::Float(loc.longitude)));
    }
    GraphMutation::merge_node(NodeLabel::Driver, &p.driver_id, props)
}

fn vehicle_assigned(p: &VehicleAssignment, at: DateTime<Utc>) -> Vec<GraphMutation> {
    let mut mutations = vec![GraphMutation::ensure_node(NodeLabel::Vehicle, &p.vehicle_id)];
    if let Some(carrier_id) = &p.carrier_id {
        mutations.push(GraphMutation::ensure_node(NodeLabel::Carrier, carrier_id));
        mutations.push(GraphMutation::merge_edge(
            RelType::OWNED_BY,
            &p.vehicle_id,
            carrier_id,
            Vec::new(),
        ));
    }
    if let Some(driver_id) = &p.driver_id {
        mutations.push(GraphMutation::ensure_node(NodeLabel::Driver, driver_id));
        mutations.push(GraphMutation::merge_edge(
            RelType::DRIVES,
            driver_id,
            &p.vehicle_id,
            vec![("since", at.into())],
        ));
    }
    mutations
}

fn driver_assigned(p: &DriverAssignment, at: DateTime<Utc>) -> Vec<GraphMutation> {
    let mut mutations = vec![GraphMutation::ensure_node(NodeLabel::Driver, &p.driver_id)];
    if let Some(load_id) = &p.load_id {
        mutations.push(GraphMutation::merge_edge(
            RelType::ASSIGNED_TO,
            &p.driver_id,
            load_id,
            vec![("assigned_at", at.into())],
        ));
    }
    if let Some(vehicle_id) = &p.vehicle_id {
        mutations.push(GraphMutation::ensure_node(NodeLabel::Vehicle, vehicle_id));
        mutations.push(GraphMutation::merge_edge(
            RelType::DRIVES,
            &p.driver_id,
            vehicle_id,
            vec![("since", at.into())],
        ));
    }
    mutations
}

fn route_optimized(p: &RouteOptimized, at: DateTime<Utc>) -> Vec<GraphMutation> {
    let mut props: Props = vec![
        ("status", status::ACTIVE.into()),
        ("optimized_at", at.into()),
        ("traffic_considered", p.traffic_considered.into()),
        ("steps_count", (p.steps_count as i64).into()),
    ];
    push_opt(&mut props, "distance", p.optimized_distance);
    push_opt(&mut props, "original_distance", p.original_distance);
    push_opt(&mut props, "duration", p.duration_minutes);
    push_opt(&mut props, "algorithm_used", p.algorithm_used.clone());
    push_opt(&mut props, "optimization_score", p.optimization_score);

    let mut mutations = vec![GraphMutation::merge_node(NodeLabel::Route, &p.route_id, props)];
    for load_id in p.all_load_ids() {
        mutations.push(GraphMutation::merge_edge(
            RelType::OPTIMIZES,
            &p.route_id,
            load_id,
            Vec::new(),
        ));
    }
    if let Some(driver_id) = &p.driver_id {
        mutations.push(GraphMutation::merge_edge(
            RelType::EXECUTED_BY,
            &p.route_id,
            driver_id,
            Vec::new(),
        ));
    }
    if let Some(vehicle_id) = &p.vehicle_id {
        mutations.push(GraphMutation::merge_edge(
            RelType::USES_VEHICLE,
            &p.route_id,
            vehicle_id,
            Vec::new(),
        ));
    }
    mutations
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadmatch_common::events::{LoadStatusChange, RouteCompleted};
    use loadmatch_common::EventType;

    fn ts() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn every_informational_type_is_a_noop() {
        for t in [
            EventType::VehicleMaintenanceDue,
            EventType::DriverHosViolation,
            EventType::RouteDeviation,
            EventType::CarrierCapacityChanged,
            EventType::SystemAlert,
            EventType::AiPrediction,
        ] {
            assert!(plan(&DomainEvent::Informational(t), ts()).is_empty(), "{t}");
        }
    }

    #[test]
    fn cancellation_sets_status_then_drops_both_edge_types() {
        let event = DomainEvent::LoadCancelled(LoadStatusChange {
            load_id: "L1".into(),
            reason: None,
        });
        let plan = plan(&event, ts());
        assert_eq!(plan.len(), 3);
        assert!(matches!(&plan[0], GraphMutation::SetProps { label: NodeLabel::Load, .. }));
        assert_eq!(
            plan[1],
            GraphMutation::RemoveEdgesTo { rel: RelType::ASSIGNED_TO, to: "L1".into() }
        );
        assert_eq!(
            plan[2],
            GraphMutation::RemoveEdgesTo { rel: RelType::TRANSPORTS, to: "L1".into() }
        );
    }

    #[test]
    fn assignment_ensures_endpoints_before_edges() {
        let event = DomainEvent::LoadAssigned(LoadAssigned {
            load_id: "L1".into(),
            driver_id: Some("D1".into()),
            vehicle_id: Some("V1".into()),
            carrier_id: None,
        });
        let described: Vec<String> = plan(&event, ts()).iter().map(|m| m.to_string()).collect();
        assert_eq!(
            described,
            vec![
                "set Load(L1)",
                "merge Driver(D1)",
                "merge Driver(D1)-[ASSIGNED_TO]->Load(L1)",
                "merge Vehicle(V1)",
                "merge Vehicle(V1)-[TRANSPORTS]->Load(L1)",
            ]
        );
    }

    #[test]
    fn route_completion_is_match_only() {
        let event = DomainEvent::RouteCompleted(RouteCompleted { route_id: "R1".into() });
        let plan = plan(&event, ts());
        assert!(matches!(&plan[..], [GraphMutation::SetProps { label: NodeLabel::Route, .. }]));
    }

    #[test]
    fn planning_is_deterministic_for_a_given_envelope_time() {
        let event = DomainEvent::LoadDelivered(LoadStatusChange {
            load_id: "L9".into(),
            reason: None,
        });
        assert_eq!(plan(&event, ts()), plan(&event, ts()));
    }
}
