//! Both optimization paths over the in-memory graph, store, bus and directions.

use std::sync::Arc;

use loadmatch_common::{Envelope, EventType, GeoPoint};
use loadmatch_events::{EventPublisher, MemoryBus};
use loadmatch_graph::{GraphSynchronizer, MemoryGraph, NodeLabel, RelType};
use loadmatch_routing::testing::{MemoryLoadRepository, StaticDirections, UnreachablePublisher};
use loadmatch_routing::{
    straight_line, DirectionsService, LoadRecord, OptimizationConstraints,
    OptimizationOrchestrator, RouteGeometry, RouteGeometryProvider, RouteStep,
};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct World {
    graph: Arc<MemoryGraph>,
    sync: GraphSynchronizer,
    loads: Arc<MemoryLoadRepository>,
    bus: MemoryBus,
}

impl World {
    fn new() -> Self {
        let graph = Arc::new(MemoryGraph::new());
        Self {
            sync: GraphSynchronizer::new(graph.clone()),
            graph,
            loads: Arc::new(MemoryLoadRepository::new()),
            bus: MemoryBus::default(),
        }
    }

    fn orchestrator(&self, directions: Option<Arc<dyn DirectionsService>>) -> OptimizationOrchestrator {
        self.orchestrator_with(directions, Arc::new(self.bus.clone()))
    }

    fn orchestrator_with(
        &self,
        directions: Option<Arc<dyn DirectionsService>>,
        publisher: Arc<dyn EventPublisher>,
    ) -> OptimizationOrchestrator {
        OptimizationOrchestrator::new(
            self.graph.clone(),
            self.loads.clone(),
            publisher,
            RouteGeometryProvider::new(directions),
        )
    }

    async fn send(&self, event_type: EventType, data: Value) {
        let env = Envelope::new(event_type, "orchestrator-test", &data).unwrap();
        let report = self.sync.handle_event(&env).await.unwrap();
        assert!(report.is_clean(), "{report:?}");
    }

    /// AVAILABLE driver `D{n}` `miles` north of the origin, driving `V{n}` owned by `C{n}`.
    async fn fleet_member(&self, n: u32, miles: f64, capacity_weight: f64) {
        let (driver, vehicle, carrier) = (format!("D{n}"), format!("V{n}"), format!("C{n}"));
        self.send(
            EventType::VehicleAssigned,
            json!({"vehicle_id": vehicle, "carrier_id": carrier, "driver_id": driver}),
        )
        .await;
        self.send(
            EventType::VehicleStatusChanged,
            json!({"vehicle_id": vehicle, "status": "AVAILABLE",
                   "capacity_weight": capacity_weight, "capacity_volume": 4000.0}),
        )
        .await;
        self.send(
            EventType::DriverStatusChanged,
            json!({"driver_id": driver, "status": "AVAILABLE",
                   "location": {"latitude": miles / 69.17, "longitude": 0.0}}),
        )
        .await;
    }

    async fn graph_load(&self, load_id: &str, weight: f64) {
        self.send(
            EventType::LoadCreated,
            json!({
                "load_id": load_id,
                "pickup_location": {"latitude": 0.0, "longitude": 0.0},
                "delivery_location": {"latitude": 0.0, "longitude": 1.0},
                "weight": weight,
                "volume": 100.0
            }),
        )
        .await;
    }

    fn relational_load(&self, load_id: &str) {
        self.loads.insert_load(LoadRecord {
            id: load_id.to_string(),
            pickup: GeoPoint::new(0.0, 0.0),
            delivery: GeoPoint::new(0.0, 1.0),
            weight: Some(30000.0),
            status: Some("PENDING".into()),
        });
    }
}

fn google_route() -> RouteGeometry {
    RouteGeometry {
        distance_miles: 74.3,
        duration_minutes: 81,
        duration_in_traffic_minutes: 90,
        route_geometry: "LINESTRING(0 0, 0.5 0.1, 1 0)".into(),
        encoded_polyline: Some("??_ibE_seK".into()),
        steps: vec![RouteStep {
            instruction: "Head east".into(),
            distance: "74 mi".into(),
            duration: "1 hour 21 mins".into(),
            maneuver: "straight".into(),
        }],
        optimization_score: 58.89,
        traffic_considered: true,
    }
}

fn published_route_events(bus: &MemoryBus) -> Vec<Envelope> {
    bus.envelopes()
        .into_iter()
        .filter(|e| e.event_type == EventType::RouteOptimized)
        .collect()
}

// =========================================================================
// Advanced path
// =========================================================================

#[tokio::test]
async fn advanced_selects_best_scoring_candidate_without_persisting() {
    let world = World::new();
    world.graph_load("L1", 30000.0).await;
    world.fleet_member(1, 10.0, 20000.0).await; // too small
    world.fleet_member(2, 20.0, 35000.0).await;
    world.fleet_member(3, 40.0, 50000.0).await;

    let orchestrator = world.orchestrator(None);
    let result = orchestrator
        .optimize_advanced("L1", &OptimizationConstraints::default())
        .await
        .into_result()
        .unwrap();

    assert_eq!(result.selected_driver_id, "D2");
    assert_eq!(result.selected_vehicle_id, "V2");
    assert_eq!(result.selected_carrier_id, "C2");
    assert_eq!(result.alternatives_considered, 2);
    assert_eq!(result.optimization_method, "advanced_graph_based");
    assert_eq!(result.constraints_applied.max_driver_distance, 50.0);
    assert_eq!(result.route_details.distance_miles, 69.17);
    assert!(!result.route_details.traffic_considered);
    assert!(result.optimization_factors.driver_proximity_score > 59.0);

    assert!(world.loads.routes().is_empty());
    assert!(published_route_events(&world.bus).is_empty());
}

#[tokio::test]
async fn advanced_uses_directions_when_available() {
    let world = World::new();
    world.graph_load("L1", 1000.0).await;
    world.fleet_member(1, 5.0, 40000.0).await;
    let directions = StaticDirections::route(google_route());

    let result = world
        .orchestrator(Some(directions.clone()))
        .run_advanced("L1", &OptimizationConstraints::default())
        .await
        .unwrap();

    assert_eq!(result.route_details, google_route());
    assert_eq!(
        directions.calls(),
        vec![(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0))]
    );
}

#[tokio::test]
async fn advanced_missing_load_reports_fallback_available() {
    let world = World::new();
    let response = world
        .orchestrator(None)
        .optimize_advanced("L404", &OptimizationConstraints::default())
        .await;

    assert!(!response.is_success());
    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["fallback_available"], true);
    assert!(body["error"].as_str().unwrap().contains("L404"));
}

#[tokio::test]
async fn advanced_without_candidates_fails() {
    let world = World::new();
    world.graph_load("L1", 30000.0).await;
    world.fleet_member(1, 80.0, 50000.0).await; // out of range

    let failure = world
        .orchestrator(None)
        .optimize_advanced("L1", &OptimizationConstraints::default())
        .await
        .into_result()
        .unwrap_err();
    assert!(failure.error.contains("No suitable drivers"));
    assert!(failure.fallback_available);
}

#[tokio::test]
async fn advanced_needs_coordinates() {
    let world = World::new();
    world
        .send(EventType::LoadCreated, json!({"load_id": "L1", "weight": 100.0}))
        .await;

    let failure = world
        .orchestrator(None)
        .optimize_advanced("L1", &OptimizationConstraints::default())
        .await
        .into_result()
        .unwrap_err();
    assert!(failure.error.contains("coordinates"), "{}", failure.error);
}

#[tokio::test]
async fn persisted_selection_is_projected_back_into_the_graph() {
    let world = World::new();
    world.graph_load("L1", 30000.0).await;
    world.fleet_member(2, 20.0, 35000.0).await;

    let orchestrator = world.orchestrator(None);
    let selection = orchestrator
        .run_advanced("L1", &OptimizationConstraints::default())
        .await
        .unwrap();
    let route_id = orchestrator.persist_selection("L1", &selection).await.unwrap();

    let routes = world.loads.routes();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].0, route_id);
    assert_eq!(routes[0].1.driver_id.as_deref(), Some("D2"));
    assert_eq!(routes[0].1.optimization_score, selection.optimization_score);

    let events = published_route_events(&world.bus);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload["algorithm_used"], "advanced_graph_based");
    assert_eq!(events[0].payload["load_ids"], json!(["L1"]));
    assert_eq!(events[0].correlation_id.as_deref(), Some("L1"));

    // The consumer side turns the emitted event into a Route node.
    world.sync.handle_event(&events[0]).await.unwrap();
    let route = world.graph.node(NodeLabel::Route, &route_id).unwrap();
    assert_eq!(route["status"].as_str(), Some("ACTIVE"));
    assert!(world.graph.has_edge(RelType::OPTIMIZES, &route_id, "L1"));
    assert!(world.graph.has_edge(RelType::EXECUTED_BY, &route_id, "D2"));
    assert!(world.graph.has_edge(RelType::USES_VEHICLE, &route_id, "V2"));
}

// =========================================================================
// Basic path
// =========================================================================

#[tokio::test]
async fn basic_persists_and_emits() {
    let world = World::new();
    world.relational_load("L1");

    let result = world
        .orchestrator(Some(StaticDirections::route(google_route())))
        .optimize("L1", "V7", Some("D7"))
        .await
        .into_result()
        .unwrap();

    assert_eq!(result.route_id, "route-1");
    assert_eq!(result.distance_miles, 74.3);
    assert_eq!(result.duration_minutes, 81);
    assert_eq!(result.optimization_score, 58.89);

    let (_, saved) = &world.loads.routes()[0];
    assert_eq!(saved.vehicle_id, "V7");
    assert_eq!(saved.geometry, "LINESTRING(0 0, 0.5 0.1, 1 0)");

    let events = published_route_events(&world.bus);
    assert_eq!(events.len(), 1);
    let data = &events[0].payload;
    assert_eq!(data["route_id"], "route-1");
    assert_eq!(data["vehicle_id"], "V7");
    assert_eq!(data["driver_id"], "D7");
    assert_eq!(data["optimized_distance"], 74.3);
    assert_eq!(data["original_distance"], 69.17);
    assert_eq!(data["algorithm_used"], "google_maps_api");
    assert_eq!(data["traffic_considered"], true);
    assert_eq!(data["steps_count"], 1);
}

#[tokio::test]
async fn basic_falls_back_to_straight_line_when_directions_fail() {
    let world = World::new();
    world.relational_load("L1");
    let directions = StaticDirections::no_route();

    let result = world
        .orchestrator(Some(directions.clone()))
        .run_basic("L1", "V1", None)
        .await
        .unwrap();

    let expected = straight_line(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0));
    assert_eq!(directions.calls().len(), 1);
    assert_eq!(result.distance_miles, expected.distance_miles);
    assert_eq!(result.duration_minutes, 138);
    assert_eq!(result.optimization_score, 50.0);

    let events = published_route_events(&world.bus);
    assert_eq!(events[0].payload["algorithm_used"], "great_circle");
    assert_eq!(events[0].payload["driver_id"], Value::Null);
}

#[tokio::test]
async fn basic_missing_load_has_no_fallback() {
    let world = World::new();
    let response = world.orchestrator(None).optimize("L404", "V1", None).await;

    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(
        body,
        json!({"success": false, "error": "Load L404 not found", "fallback_available": false})
    );
    assert!(world.loads.routes().is_empty());
}

#[tokio::test]
async fn publish_failure_does_not_fail_the_optimization() {
    let world = World::new();
    world.relational_load("L1");

    let response = world
        .orchestrator_with(None, Arc::new(UnreachablePublisher))
        .optimize("L1", "V1", None)
        .await;

    assert!(response.is_success());
    assert_eq!(world.loads.routes().len(), 1);
}

#[tokio::test]
async fn success_serializes_flat_with_success_flag() {
    let world = World::new();
    world.relational_load("L1");
    let response = world.orchestrator(None).optimize("L1", "V1", None).await;

    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["route_id"], "route-1");
    assert_eq!(body["optimization_score"], 50.0);
    assert!(body["route_geometry"].as_str().unwrap().starts_with("LINESTRING("));
}
