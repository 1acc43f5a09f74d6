//! Integration tests for EventLog.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use std::time::Duration;

use loadmatch_common::{BusConfig, Envelope, EventType};
use loadmatch_events::{partition_for, EventLog, EventPublisher, EventSource};
use serde_json::json;
use sqlx::PgPool;

async fn test_log() -> Option<EventLog> {
    test_log_and_pool().await.map(|(log, _)| log)
}

async fn test_log_and_pool() -> Option<(EventLog, PgPool)> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    let log = EventLog::new(pool.clone(), 4);
    log.ensure_schema().await.ok()?;

    sqlx::query("TRUNCATE bus_events, bus_offsets, bus_partitions")
        .execute(&pool)
        .await
        .ok()?;

    Some((log, pool))
}

fn bus_config(group: &str) -> BusConfig {
    BusConfig {
        group_id: group.to_string(),
        partitions: 4,
        poll_interval_ms: 10,
        ..BusConfig::default()
    }
}

fn envelope(event_type: EventType, data: serde_json::Value) -> Envelope {
    Envelope::new(event_type, "log-test", &data).unwrap()
}

#[tokio::test]
async fn ensure_schema_is_idempotent() {
    let Some(log) = test_log().await else {
        return;
    };
    log.ensure_schema().await.unwrap();
    log.ensure_schema().await.unwrap();
}

#[tokio::test]
async fn publish_routes_to_event_type_topic() {
    let Some(log) = test_log().await else {
        return;
    };

    let record = log
        .publish(&envelope(EventType::VehicleLocationUpdated, json!({"vehicle_id": "V1"})))
        .await
        .unwrap();

    assert_eq!(record.topic, "tms.vehicles.tracking");
    assert_eq!(record.partition_key, "V1");
    assert_eq!(log.read_topic("tms.vehicles.tracking", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn consumer_reads_in_order_and_resumes_from_commit() {
    let Some(log) = test_log().await else {
        return;
    };
    for status in ["PICKED_UP", "IN_TRANSIT", "DELIVERED"] {
        log.publish(&envelope(EventType::LoadInTransit, json!({"load_id": "L7", "reason": status})))
            .await
            .unwrap();
    }
    let topics = vec!["tms.loads".to_string()];

    let mut first = log.consumer(&bus_config("resume"));
    first.subscribe(&topics).await.unwrap();
    let one = first.next().await.unwrap();
    let two = first.next().await.unwrap();
    assert!(one.seq < two.seq);
    first.commit().await.unwrap();
    drop(first);

    let mut second = log.consumer(&bus_config("resume"));
    second.subscribe(&topics).await.unwrap();
    let three = second.next().await.unwrap();
    assert!(three.seq > two.seq);
    assert_eq!(three.envelope().unwrap().payload["reason"], "DELIVERED");
}

#[tokio::test]
async fn groups_track_positions_independently() {
    let Some(log) = test_log().await else {
        return;
    };
    log.publish(&envelope(EventType::RouteCompleted, json!({"route_id": "R1"})))
        .await
        .unwrap();
    let topics = vec!["tms.routes".to_string()];

    let mut a = log.consumer(&bus_config("group-a"));
    a.subscribe(&topics).await.unwrap();
    a.next().await.unwrap();
    a.commit().await.unwrap();

    let mut b = log.consumer(&bus_config("group-b"));
    b.subscribe(&topics).await.unwrap();
    let record = b.next().await.unwrap();
    assert_eq!(record.partition_key, "R1");
}

/// Writes a row the way a publisher's transaction would, at a chosen offset.
async fn insert_at(pool: &PgPool, seq: i64, load_id: &str) {
    let env = envelope(EventType::LoadCreated, json!({"load_id": load_id}));
    sqlx::query(
        r#"
        INSERT INTO bus_events (topic, partition, seq, partition_key, event_type, envelope)
        VALUES ('tms.loads', $1, $2, $3, 'load.created', $4)
        "#,
    )
    .bind(partition_for("L-gap", 4))
    .bind(seq)
    .bind("L-gap")
    .bind(serde_json::to_value(&env).unwrap())
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn later_offset_committing_first_does_not_skip_the_earlier_one() {
    let Some((log, pool)) = test_log_and_pool().await else {
        return;
    };
    let topics = vec!["tms.loads".to_string()];

    // Offset 1 becomes visible while offset 0 is still in flight.
    insert_at(&pool, 1, "second").await;

    let mut consumer = log.consumer(&bus_config("gap"));
    consumer.subscribe(&topics).await.unwrap();
    let early = tokio::time::timeout(Duration::from_millis(200), consumer.next()).await;
    assert!(early.is_err(), "offset 1 must wait for offset 0");
    consumer.commit().await.unwrap();

    insert_at(&pool, 0, "first").await;

    let first = consumer.next().await.unwrap();
    let second = consumer.next().await.unwrap();
    assert_eq!((first.seq, second.seq), (0, 1));
    assert_eq!(first.envelope().unwrap().payload["load_id"], "first");
    assert_eq!(second.envelope().unwrap().payload["load_id"], "second");
}

#[tokio::test]
async fn concurrent_publishers_get_contiguous_offsets() {
    let Some(log) = test_log().await else {
        return;
    };

    let publishes = (0..8).map(|i| {
        let log = log.clone();
        tokio::spawn(async move {
            log.publish(&envelope(EventType::LoadInTransit, json!({"load_id": "L-busy", "n": i})))
                .await
                .unwrap()
                .seq
        })
    });
    let mut seqs = Vec::new();
    for handle in publishes {
        seqs.push(handle.await.unwrap());
    }
    seqs.sort_unstable();
    assert_eq!(seqs, (0..8).collect::<Vec<i64>>());

    let mut consumer = log.consumer(&bus_config("busy"));
    consumer.subscribe(&["tms.loads".to_string()]).await.unwrap();
    for expected in 0..8 {
        assert_eq!(consumer.next().await.unwrap().seq, expected);
    }
}
