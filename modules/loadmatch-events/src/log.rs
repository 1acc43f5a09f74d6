//! EventLog: the bus backed by Postgres.
//!
//! `bus_events` is append-only. Every row belongs to one (topic, partition)
//! and `seq` is its offset there: 0, 1, 2, ... with no holes. Offsets come
//! from `bus_partitions`, whose counter row stays locked until the
//! publishing transaction commits, so a partition's rows become visible in
//! offset order. `bus_offsets` holds each consumer group's next unread
//! `seq` per partition.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loadmatch_common::{BusConfig, Envelope, LoadmatchError};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::partition::partition_for;
use crate::traits::{EventPublisher, EventSource};
use crate::types::BusRecord;

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct EventLog {
    pool: PgPool,
    partitions: i32,
}

impl EventLog {
    pub fn new(pool: PgPool, partitions: i32) -> Self {
        Self {
            pool,
            partitions: partitions.max(1),
        }
    }

    pub async fn connect(database_url: &str, partitions: i32) -> Result<Self, LoadmatchError> {
        let pool = PgPool::connect(database_url).await.map_err(transport)?;
        Ok(Self::new(pool, partitions))
    }

    /// Create the bus tables. Safe to run on every start.
    pub async fn ensure_schema(&self) -> Result<(), LoadmatchError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS bus_partitions (
                topic      TEXT     NOT NULL,
                partition  INTEGER  NOT NULL,
                last_seq   BIGINT   NOT NULL,
                PRIMARY KEY (topic, partition)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bus_events (
                topic         TEXT         NOT NULL,
                partition     INTEGER      NOT NULL,
                seq           BIGINT       NOT NULL,
                partition_key TEXT         NOT NULL,
                event_type    TEXT         NOT NULL,
                envelope      JSONB        NOT NULL,
                published_at  TIMESTAMPTZ  NOT NULL DEFAULT now(),
                PRIMARY KEY (topic, partition, seq)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bus_offsets (
                group_id    TEXT     NOT NULL,
                topic       TEXT     NOT NULL,
                partition   INTEGER  NOT NULL,
                next_seq    BIGINT   NOT NULL,
                committed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (group_id, topic, partition)
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(transport)?;
        }

        info!("Event bus schema ready");
        Ok(())
    }

    /// A consumer for `config.group_id` reading `config`'s assigned partitions.
    pub fn consumer(&self, config: &BusConfig) -> LogConsumer {
        LogConsumer {
            pool: self.pool.clone(),
            group_id: config.group_id.clone(),
            partitions: config.partitions_to_read(),
            batch_size: config.batch_size.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            positions: HashMap::new(),
            delivered: HashMap::new(),
            buffer: VecDeque::new(),
        }
    }

    /// Records published to `topic`, partition by partition in offset order.
    /// For inspection and tests.
    pub async fn read_topic(&self, topic: &str, limit: i64) -> Result<Vec<BusRecord>, LoadmatchError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT seq, topic, partition, partition_key, envelope, published_at
            FROM bus_events
            WHERE topic = $1
            ORDER BY partition ASC, seq ASC
            LIMIT $2
            "#,
        )
        .bind(topic)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(transport)?;

        Ok(rows.into_iter().map(BusRecord::from).collect())
    }
}

#[async_trait]
impl EventPublisher for EventLog {
    async fn publish(&self, envelope: &Envelope) -> Result<BusRecord, LoadmatchError> {
        let topic = envelope.event_type.topic();
        let key = envelope.partition_key();
        let partition = partition_for(&key, self.partitions);
        let body = serde_json::to_value(envelope)?;

        let mut tx = self.pool.begin().await.map_err(transport)?;

        // Holds the counter row lock until commit. A concurrent publisher to
        // the same partition waits here and takes the following offset.
        let (seq,) = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO bus_partitions (topic, partition, last_seq)
            VALUES ($1, $2, 0)
            ON CONFLICT (topic, partition)
            DO UPDATE SET last_seq = bus_partitions.last_seq + 1
            RETURNING last_seq
            "#,
        )
        .bind(topic)
        .bind(partition)
        .fetch_one(&mut *tx)
        .await
        .map_err(transport)?;

        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            INSERT INTO bus_events (topic, partition, seq, partition_key, event_type, envelope)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING seq, topic, partition, partition_key, envelope, published_at
            "#,
        )
        .bind(topic)
        .bind(partition)
        .bind(seq)
        .bind(&key)
        .bind(envelope.event_type.as_str())
        .bind(&body)
        .fetch_one(&mut *tx)
        .await
        .map_err(transport)?;

        tx.commit().await.map_err(transport)?;

        debug!(
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            topic,
            partition,
            seq = row.seq,
            "Published event"
        );

        Ok(row.into())
    }
}

// ---------------------------------------------------------------------------
// LogConsumer
// ---------------------------------------------------------------------------

/// Consumer-group member over `EventLog`.
pub struct LogConsumer {
    pool: PgPool,
    group_id: String,
    partitions: Vec<i32>,
    batch_size: i64,
    poll_interval: Duration,
    /// Next seq to fetch, per (topic, partition).
    positions: HashMap<(String, i32), i64>,
    /// Next seq after the last record handed out by `next`, per (topic, partition).
    delivered: HashMap<(String, i32), i64>,
    buffer: VecDeque<BusRecord>,
}

impl LogConsumer {
    async fn fetch(&mut self) -> Result<(), LoadmatchError> {
        let mut topics = Vec::with_capacity(self.positions.len());
        let mut partitions = Vec::with_capacity(self.positions.len());
        let mut next_seqs = Vec::with_capacity(self.positions.len());
        for ((topic, partition), next) in &self.positions {
            topics.push(topic.clone());
            partitions.push(*partition);
            next_seqs.push(*next);
        }

        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT e.seq, e.topic, e.partition, e.partition_key, e.envelope, e.published_at
            FROM UNNEST($1::text[], $2::int[], $3::bigint[]) AS p(topic, partition, next_seq)
            CROSS JOIN LATERAL (
                SELECT seq, topic, partition, partition_key, envelope, published_at
                FROM bus_events
                WHERE topic = p.topic AND partition = p.partition AND seq >= p.next_seq
                ORDER BY seq ASC
                LIMIT $4
            ) e
            ORDER BY e.topic, e.partition, e.seq
            "#,
        )
        .bind(&topics)
        .bind(&partitions)
        .bind(&next_seqs)
        .bind(self.batch_size)
        .fetch_all(&self.pool)
        .await
        .map_err(transport)?;

        for row in rows {
            let record = BusRecord::from(row);
            let key = (record.topic.clone(), record.partition);
            let expected = self.positions.get(&key).copied().unwrap_or(0);

            // A missing offset is a write that has not committed yet. Stop
            // this partition there; the next fetch picks it up.
            if record.seq != expected {
                debug!(
                    topic = %record.topic,
                    partition = record.partition,
                    expected,
                    seq = record.seq,
                    "Gap in partition, waiting for it to fill"
                );
                continue;
            }

            self.positions.insert(key, record.seq + 1);
            self.buffer.push_back(record);
        }
        Ok(())
    }
}

#[async_trait]
impl EventSource for LogConsumer {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), LoadmatchError> {
        let committed = sqlx::query_as::<_, (String, i32, i64)>(
            "SELECT topic, partition, next_seq FROM bus_offsets WHERE group_id = $1",
        )
        .bind(&self.group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(transport)?;

        let committed: HashMap<(String, i32), i64> = committed
            .into_iter()
            .map(|(topic, partition, next)| ((topic, partition), next))
            .collect();

        self.positions.clear();
        self.delivered.clear();
        self.buffer.clear();
        for topic in topics {
            for partition in &self.partitions {
                let key = (topic.clone(), *partition);
                let next = committed.get(&key).copied().unwrap_or(0);
                self.positions.insert(key, next);
            }
        }

        info!(
            group_id = %self.group_id,
            topics = topics.len(),
            partitions = self.partitions.len(),
            resumed = committed.len(),
            "Subscribed to event bus"
        );
        Ok(())
    }

    async fn next(&mut self) -> Result<BusRecord, LoadmatchError> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                self.delivered
                    .insert((record.topic.clone(), record.partition), record.seq + 1);
                return Ok(record);
            }
            if self.positions.is_empty() {
                return Err(LoadmatchError::Transport(
                    "consumer is not subscribed to any topic".to_string(),
                ));
            }

            self.fetch().await?;
            if self.buffer.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }

    async fn commit(&mut self) -> Result<(), LoadmatchError> {
        if self.delivered.is_empty() {
            return Ok(());
        }

        for ((topic, partition), next_seq) in &self.delivered {
            sqlx::query(
                r#"
                INSERT INTO bus_offsets (group_id, topic, partition, next_seq)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (group_id, topic, partition)
                DO UPDATE SET next_seq = GREATEST(bus_offsets.next_seq, EXCLUDED.next_seq),
                              committed_at = now()
                "#,
            )
            .bind(&self.group_id)
            .bind(topic)
            .bind(partition)
            .bind(next_seq)
            .execute(&self.pool)
            .await
            .map_err(transport)?;
        }

        debug!(group_id = %self.group_id, partitions = self.delivered.len(), "Committed offsets");
        self.delivered.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct RecordRow {
    seq: i64,
    topic: String,
    partition: i32,
    partition_key: String,
    envelope: serde_json::Value,
    published_at: DateTime<Utc>,
}

impl From<RecordRow> for BusRecord {
    fn from(row: RecordRow) -> Self {
        BusRecord {
            seq: row.seq,
            topic: row.topic,
            partition: row.partition,
            partition_key: row.partition_key,
            envelope: row.envelope,
            published_at: row.published_at,
        }
    }
}

fn transport(err: sqlx::Error) -> LoadmatchError {
    LoadmatchError::Transport(err.to_string())
}
