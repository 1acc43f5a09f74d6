//! In-memory bus for tests. Same partitioning and commit semantics as
//! `EventLog`, no database required.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use loadmatch_common::{BusConfig, Envelope, LoadmatchError};
use tokio::sync::Notify;

use crate::partition::partition_for;
use crate::traits::{EventPublisher, EventSource};
use crate::types::BusRecord;

#[derive(Default)]
struct Inner {
    records: Vec<BusRecord>,
    /// (group, topic, partition) -> next seq
    committed: HashMap<(String, String, i32), i64>,
}

/// Shared in-memory log. Clones share the same records.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<Mutex<Inner>>,
    published: Arc<Notify>,
    partitions: i32,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(BusConfig::default().partitions)
    }
}

impl MemoryBus {
    pub fn new(partitions: i32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            published: Arc::new(Notify::new()),
            partitions: partitions.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a raw JSON envelope, bypassing type checks. Lets tests publish
    /// records this build cannot decode.
    pub fn publish_raw(&self, topic: &str, envelope: serde_json::Value) -> BusRecord {
        let key = envelope
            .get("event_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.append(topic, key, envelope)
    }

    fn append(&self, topic: &str, key: String, envelope: serde_json::Value) -> BusRecord {
        let partition = partition_for(&key, self.partitions);
        let mut inner = self.lock();
        let seq = inner
            .records
            .iter()
            .filter(|r| r.topic == topic && r.partition == partition)
            .count() as i64;
        let record = BusRecord {
            seq,
            topic: topic.to_string(),
            partition,
            partition_key: key,
            envelope,
            published_at: Utc::now(),
        };
        inner.records.push(record.clone());
        drop(inner);
        self.published.notify_waiters();
        record
    }

    /// Every record published so far, in publish order.
    pub fn records(&self) -> Vec<BusRecord> {
        self.lock().records.clone()
    }

    /// Decoded envelopes of every record, skipping undecodable ones.
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.records()
            .iter()
            .filter_map(|r| r.envelope().ok())
            .collect()
    }

    pub fn committed(&self, group_id: &str, topic: &str, partition: i32) -> Option<i64> {
        self.lock()
            .committed
            .get(&(group_id.to_string(), topic.to_string(), partition))
            .copied()
    }

    pub fn consumer(&self, config: &BusConfig) -> MemoryConsumer {
        MemoryConsumer {
            bus: self.clone(),
            group_id: config.group_id.clone(),
            partitions: config.partitions_to_read(),
            positions: HashMap::new(),
            delivered: HashMap::new(),
        }
    }
}

#[async_trait]
impl EventPublisher for MemoryBus {
    async fn publish(&self, envelope: &Envelope) -> Result<BusRecord, LoadmatchError> {
        let body = serde_json::to_value(envelope)?;
        Ok(self.append(envelope.event_type.topic(), envelope.partition_key(), body))
    }
}

/// Consumer over a `MemoryBus`.
pub struct MemoryConsumer {
    bus: MemoryBus,
    group_id: String,
    partitions: Vec<i32>,
    positions: HashMap<(String, i32), i64>,
    delivered: HashMap<(String, i32), i64>,
}

impl MemoryConsumer {
    fn poll(&mut self) -> Option<BusRecord> {
        let inner = self.bus.lock();
        let record = inner
            .records
            .iter()
            .find(|r| {
                self.positions
                    .get(&(r.topic.clone(), r.partition))
                    .is_some_and(|next| r.seq >= *next)
            })
            .cloned()?;
        drop(inner);

        let key = (record.topic.clone(), record.partition);
        self.positions.insert(key.clone(), record.seq + 1);
        self.delivered.insert(key, record.seq + 1);
        Some(record)
    }
}

#[async_trait]
impl EventSource for MemoryConsumer {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), LoadmatchError> {
        let inner = self.bus.lock();
        self.positions.clear();
        self.delivered.clear();
        for topic in topics {
            for partition in &self.partitions {
                let next = inner
                    .committed
                    .get(&(self.group_id.clone(), topic.clone(), *partition))
                    .copied()
                    .unwrap_or(0);
                self.positions.insert((topic.clone(), *partition), next);
            }
        }
        Ok(())
    }

    async fn next(&mut self) -> Result<BusRecord, LoadmatchError> {
        loop {
            let published = self.bus.published.clone();
            let notified = published.notified();
            if let Some(record) = self.poll() {
                return Ok(record);
            }
            notified.await;
        }
    }

    async fn commit(&mut self) -> Result<(), LoadmatchError> {
        let mut inner = self.bus.lock();
        for ((topic, partition), next) in self.delivered.drain() {
            let entry = inner
                .committed
                .entry((self.group_id.clone(), topic, partition))
                .or_insert(0);
            *entry = (*entry).max(next);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadmatch_common::EventType;
    use serde_json::json;

    fn config() -> BusConfig {
        BusConfig {
            group_id: "test-group".into(),
            ..BusConfig::default()
        }
    }

    async fn publish(bus: &MemoryBus, event_type: EventType, data: serde_json::Value) {
        let env = Envelope::new(event_type, "test", &data).unwrap();
        bus.publish(&env).await.unwrap();
    }

    #[tokio::test]
    async fn events_for_one_entity_share_a_partition_and_keep_order() {
        let bus = MemoryBus::default();
        publish(&bus, EventType::LoadCreated, json!({"load_id": "L1"})).await;
        publish(&bus, EventType::LoadAssigned, json!({"load_id": "L1"})).await;
        publish(&bus, EventType::LoadDelivered, json!({"load_id": "L1"})).await;

        let mut consumer = bus.consumer(&config());
        consumer.subscribe(&["tms.loads".to_string()]).await.unwrap();

        let mut types = Vec::new();
        let mut partitions = Vec::new();
        for _ in 0..3 {
            let record = consumer.next().await.unwrap();
            partitions.push(record.partition);
            types.push(record.envelope().unwrap().event_type);
        }
        assert_eq!(
            types,
            vec![EventType::LoadCreated, EventType::LoadAssigned, EventType::LoadDelivered]
        );
        assert!(partitions.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn offsets_count_up_per_partition() {
        let bus = MemoryBus::new(4);
        publish(&bus, EventType::LoadCreated, json!({"load_id": "L1"})).await;
        publish(&bus, EventType::DriverAssigned, json!({"driver_id": "D1"})).await;
        publish(&bus, EventType::LoadAssigned, json!({"load_id": "L1"})).await;

        let seqs: Vec<(String, i64)> = bus
            .records()
            .into_iter()
            .map(|r| (r.partition_key, r.seq))
            .collect();
        assert_eq!(
            seqs,
            vec![("L1".to_string(), 0), ("D1".to_string(), 0), ("L1".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn unsubscribed_topics_are_not_delivered() {
        let bus = MemoryBus::default();
        publish(&bus, EventType::SystemAlert, json!({"severity": "high"})).await;
        publish(&bus, EventType::RouteCompleted, json!({"route_id": "R1"})).await;

        let mut consumer = bus.consumer(&config());
        consumer.subscribe(&["tms.routes".to_string()]).await.unwrap();
        let record = consumer.next().await.unwrap();
        assert_eq!(record.topic, "tms.routes");
    }

    #[tokio::test]
    async fn uncommitted_records_are_redelivered_after_restart() {
        let bus = MemoryBus::default();
        publish(&bus, EventType::LoadCreated, json!({"load_id": "L1"})).await;
        publish(&bus, EventType::LoadAssigned, json!({"load_id": "L1"})).await;
        let topics = vec!["tms.loads".to_string()];

        let mut first = bus.consumer(&config());
        first.subscribe(&topics).await.unwrap();
        let a = first.next().await.unwrap();
        first.commit().await.unwrap();
        let b = first.next().await.unwrap();
        drop(first);

        let mut second = bus.consumer(&config());
        second.subscribe(&topics).await.unwrap();
        let again = second.next().await.unwrap();
        assert_eq!((a.seq, b.seq), (0, 1));
        assert_eq!(again.seq, b.seq);
        assert_eq!(again.envelope().unwrap().event_type, EventType::LoadAssigned);
    }

    #[tokio::test]
    async fn next_waits_for_publish() {
        let bus = MemoryBus::default();
        let mut consumer = bus.consumer(&config());
        consumer.subscribe(&["tms.drivers".to_string()]).await.unwrap();

        let producer = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            publish(&producer, EventType::DriverAssigned, json!({"driver_id": "D1"})).await;
        });

        let record = tokio::time::timeout(std::time::Duration::from_secs(2), consumer.next())
            .await
            .expect("record should arrive")
            .unwrap();
        assert_eq!(record.partition_key, "D1");
    }
}
