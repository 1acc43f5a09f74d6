//! Live-database checks for the Cypher side of the projection.
//! Needs Docker. Run with `--ignored`.

use loadmatch_common::{Envelope, EventType, GeoPoint};
use loadmatch_graph::testutil::{neo4j_graph, TestGraph};
use loadmatch_graph::{migrate, CandidateQuery, GraphStore, GraphSynchronizer};
use neo4rs::query;
use serde_json::{json, Value};

async fn send(sync: &GraphSynchronizer, event_type: EventType, data: Value) {
    let env = Envelope::new(event_type, "neo4j-test", &data).unwrap();
    let report = sync.handle_event(&env).await.unwrap();
    assert!(report.is_clean(), "{report:?}");
}

async fn count(client: &loadmatch_graph::GraphClient, cypher: &str) -> i64 {
    let mut rows = client.inner().execute(query(cypher)).await.unwrap();
    let row = rows.next().await.unwrap().unwrap();
    row.get::<i64>("n").unwrap()
}

#[tokio::test]
#[ignore]
async fn replayed_events_converge_in_neo4j() {
    let TestGraph { container: _container, client, graph } = neo4j_graph().await;
    // Already migrated once; a second run must be a no-op.
    migrate(&client).await.unwrap();

    let sync = GraphSynchronizer::new(graph.clone());

    for _ in 0..2 {
        send(&sync, EventType::LoadCreated, json!({
            "load_id": "L1",
            "pickup_location": {"latitude": 0.0, "longitude": 0.0},
            "delivery_location": {"latitude": 0.0, "longitude": 1.0},
            "weight": 30000.0
        }))
        .await;
        send(&sync, EventType::LoadAssigned, json!({"load_id": "L1", "driver_id": "D9", "vehicle_id": "V9"})).await;
    }

    assert_eq!(count(&client, "MATCH (l:Load {id: 'L1'}) RETURN count(l) AS n").await, 1);
    assert_eq!(count(&client, "MATCH (:Driver)-[r:ASSIGNED_TO]->(:Load {id: 'L1'}) RETURN count(r) AS n").await, 1);
    assert_eq!(count(&client, "MATCH (:Vehicle)-[r:TRANSPORTS]->(:Load {id: 'L1'}) RETURN count(r) AS n").await, 1);

    send(&sync, EventType::LoadCancelled, json!({"load_id": "L1"})).await;
    assert_eq!(count(&client, "MATCH ()-[r:ASSIGNED_TO|TRANSPORTS]->(:Load {id: 'L1'}) RETURN count(r) AS n").await, 0);
    assert_eq!(count(&client, "MATCH (n) WHERE n:Driver OR n:Vehicle RETURN count(n) AS n").await, 2);

    let load = graph.load("L1").await.unwrap().unwrap();
    assert_eq!(load.status.as_deref(), Some("CANCELLED"));
    assert_eq!(load.requirements().unwrap().weight, 30000.0);
}

#[tokio::test]
#[ignore]
async fn candidate_query_applies_distance_capacity_and_defaults() {
    let TestGraph { container: _container, graph, .. } = neo4j_graph().await;
    let sync = GraphSynchronizer::new(graph.clone());

    // Drivers 10, 20 and 60 miles north of the pickup.
    for (n, miles, capacity) in [(1, 10.0, 20000.0), (2, 20.0, 35000.0), (3, 60.0, 50000.0)] {
        send(&sync, EventType::VehicleAssigned, json!({
            "vehicle_id": format!("V{n}"), "carrier_id": format!("C{n}"), "driver_id": format!("D{n}")
        }))
        .await;
        send(&sync, EventType::VehicleStatusChanged, json!({
            "vehicle_id": format!("V{n}"), "status": "AVAILABLE",
            "capacity_weight": capacity, "capacity_volume": 4000.0
        }))
        .await;
        send(&sync, EventType::DriverStatusChanged, json!({
            "driver_id": format!("D{n}"), "status": "AVAILABLE",
            "location": {"latitude": miles / 69.17, "longitude": 0.0}
        }))
        .await;
    }

    let q = |weight: f64, max: f64| CandidateQuery {
        pickup: GeoPoint::new(0.0, 0.0),
        weight_required: weight,
        volume_required: 100.0,
        max_distance_miles: max,
    };

    let found = graph.find_candidates(&q(30000.0, 50.0)).await.unwrap();
    let drivers: Vec<&str> = found.iter().map(|c| c.driver_id.as_str()).collect();
    assert_eq!(drivers, vec!["D2"]);
    assert_eq!(found[0].driver_rating, 4.0);
    assert_eq!(found[0].carrier_performance, 85.0);

    let found = graph.find_candidates(&q(30000.0, 75.0)).await.unwrap();
    let drivers: Vec<&str> = found.iter().map(|c| c.driver_id.as_str()).collect();
    assert_eq!(drivers, vec!["D2", "D3"]);
}
