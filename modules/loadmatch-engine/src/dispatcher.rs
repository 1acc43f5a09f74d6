//! The consumption loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use loadmatch_common::{DomainEvent, Envelope, EventType, LoadmatchError};
use loadmatch_events::{BusRecord, EventSource};
use loadmatch_graph::{GraphSynchronizer, SyncReport};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::stats::{DispatchStats, FailureLog, FailureRecord, FailureStage};
use crate::traits::EventHandler;

/// Pause after a failed poll before asking the bus again.
const TRANSPORT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatcherState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// What happened to one envelope.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub event_id: Option<String>,
    pub event_type: Option<EventType>,
    pub decode_error: Option<String>,
    pub handlers_run: usize,
    /// (handler name, error) for every handler that failed.
    pub handler_failures: Vec<(String, String)>,
    pub sync: Option<SyncReport>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.decode_error.is_none()
            && self.handler_failures.is_empty()
            && self.sync.as_ref().map_or(true, SyncReport::is_clean)
    }
}

pub struct EventDispatcher {
    handlers: RwLock<HashMap<EventType, Vec<Arc<dyn EventHandler>>>>,
    synchronizer: Arc<GraphSynchronizer>,
    commit_interval: Duration,
    state: Mutex<DispatcherState>,
    /// Set while a `run` loop owns the dispatcher.
    looping: AtomicBool,
    stop_signal: Notify,
    stats: Mutex<DispatchStats>,
    failures: Mutex<FailureLog>,
}

impl EventDispatcher {
    pub fn new(synchronizer: Arc<GraphSynchronizer>, commit_interval: Duration) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            synchronizer,
            commit_interval,
            state: Mutex::new(DispatcherState::Stopped),
            looping: AtomicBool::new(false),
            stop_signal: Notify::new(),
            stats: Mutex::new(DispatchStats::default()),
            failures: Mutex::new(FailureLog::default()),
        }
    }

    /// Add a handler for `event_type`. Handlers run in registration order.
    pub fn register_handler(&self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        debug!(event_type = %event_type, handler = handler.name(), "Registered handler");
        write(&self.handlers)
            .entry(event_type)
            .or_default()
            .push(handler);
    }

    /// Remove a previously registered handler. Returns false if it was not
    /// registered for `event_type`.
    pub fn unregister_handler(&self, event_type: EventType, handler: &Arc<dyn EventHandler>) -> bool {
        let mut handlers = write(&self.handlers);
        let Some(registered) = handlers.get_mut(&event_type) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|h| !Arc::ptr_eq(h, handler));
        let removed = registered.len() < before;
        if registered.is_empty() {
            handlers.remove(&event_type);
        }
        if removed {
            debug!(event_type = %event_type, handler = handler.name(), "Unregistered handler");
        }
        removed
    }

    pub fn handler_count(&self, event_type: EventType) -> usize {
        read(&self.handlers).get(&event_type).map_or(0, Vec::len)
    }

    // =================================================================
    // Per-message dispatch
    // =================================================================

    /// Decode a raw bus record and dispatch it. Undecodable records are
    /// logged, counted and skipped.
    pub async fn dispatch_record(&self, record: &BusRecord) -> DispatchReport {
        match record.envelope() {
            Ok(envelope) => self.dispatch(&envelope).await,
            Err(e) => {
                let event_id = record
                    .envelope
                    .get("event_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                let event_type = record
                    .envelope
                    .get("event_type")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                warn!(
                    topic = %record.topic,
                    partition = record.partition,
                    seq = record.seq,
                    event_type = event_type.as_deref().unwrap_or("?"),
                    error = %e,
                    "Skipping undecodable envelope"
                );
                self.record_decode_failure(event_id.clone(), event_type, &e);
                DispatchReport {
                    event_id,
                    decode_error: Some(e.to_string()),
                    ..DispatchReport::default()
                }
            }
        }
    }

    /// Run registered handlers, then project the event into the graph.
    pub async fn dispatch(&self, envelope: &Envelope) -> DispatchReport {
        let mut report = DispatchReport {
            event_id: Some(envelope.id.clone()),
            event_type: Some(envelope.event_type),
            ..DispatchReport::default()
        };

        let event = match envelope.decode() {
            Ok(event) => event,
            Err(e) => {
                warn!(event_id = %envelope.id, event_type = %envelope.event_type, error = %e, "Skipping undecodable payload");
                self.record_decode_failure(
                    Some(envelope.id.clone()),
                    Some(envelope.event_type.to_string()),
                    &e,
                );
                report.decode_error = Some(e.to_string());
                return report;
            }
        };

        self.run_handlers(envelope, &event, &mut report).await;

        let sync = self.synchronizer.apply(envelope, &event).await;
        for failure in &sync.failures {
            self.push_failure(FailureRecord {
                at: Utc::now(),
                event_id: Some(envelope.id.clone()),
                event_type: Some(envelope.event_type.to_string()),
                stage: FailureStage::Mutation(failure.mutation.clone()),
                error: failure.error.clone(),
            });
        }

        {
            let mut stats = lock(&self.stats);
            stats.events_processed += 1;
            *stats
                .events_by_type
                .entry(envelope.event_type.to_string())
                .or_default() += 1;
            stats.handler_failures += report.handler_failures.len() as u64;
            stats.mutation_failures += sync.failures.len() as u64;
            stats.last_activity = Some(Utc::now());
        }

        report.sync = Some(sync);
        report
    }

    async fn run_handlers(&self, envelope: &Envelope, event: &DomainEvent, report: &mut DispatchReport) {
        let handlers = read(&self.handlers)
            .get(&envelope.event_type)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            debug!(event_type = %envelope.event_type, event_id = %envelope.id, "No handlers registered");
            return;
        }

        for handler in handlers {
            report.handlers_run += 1;
            if let Err(e) = handler.handle(envelope, event).await {
                error!(
                    handler = handler.name(),
                    event_id = %envelope.id,
                    event_type = %envelope.event_type,
                    error = %e,
                    "Handler failed"
                );
                self.push_failure(FailureRecord {
                    at: Utc::now(),
                    event_id: Some(envelope.id.clone()),
                    event_type: Some(envelope.event_type.to_string()),
                    stage: FailureStage::Handler(handler.name().to_string()),
                    error: format!("{e:#}"),
                });
                report
                    .handler_failures
                    .push((handler.name().to_string(), format!("{e:#}")));
            }
        }
    }

    fn record_decode_failure(&self, event_id: Option<String>, event_type: Option<String>, err: &LoadmatchError) {
        lock(&self.stats).decode_failures += 1;
        self.push_failure(FailureRecord {
            at: Utc::now(),
            event_id,
            event_type,
            stage: FailureStage::Decode,
            error: err.to_string(),
        });
    }

    fn push_failure(&self, record: FailureRecord) {
        lock(&self.failures).push(record);
    }

    // =================================================================
    // Lifecycle
    // =================================================================

    pub fn state(&self) -> DispatcherState {
        *lock(&self.state)
    }

    /// Move STOPPED -> STARTING. Returns false (and changes nothing) in any
    /// other state, so calling it twice is harmless. `run` picks up a
    /// dispatcher left in STARTING and takes it to RUNNING.
    pub fn start(&self) -> bool {
        let mut state = lock(&self.state);
        if *state != DispatcherState::Stopped {
            debug!(state = ?*state, "Dispatcher already started");
            return false;
        }
        *state = DispatcherState::Starting;
        true
    }

    /// Ask the loop to exit once the message in flight is done.
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        match *state {
            DispatcherState::Starting | DispatcherState::Running => {
                *state = DispatcherState::Stopping;
                info!("Dispatcher stopping");
                self.stop_signal.notify_one();
            }
            DispatcherState::Stopping | DispatcherState::Stopped => {}
        }
    }

    fn set_state(&self, next: DispatcherState) {
        *lock(&self.state) = next;
    }

    /// Consume `topics` from `source` until `stop` is called.
    ///
    /// Returns an error only when the subscription itself fails. Offsets are
    /// committed every `commit_interval` and once more on the way out.
    pub async fn run(&self, source: &mut dyn EventSource, topics: &[String]) -> Result<(), LoadmatchError> {
        if self.looping.swap(true, Ordering::AcqRel) {
            warn!("Dispatcher loop already running; ignoring second run");
            return Ok(());
        }
        let _claim = LoopClaim(&self.looping);

        {
            let mut state = lock(&self.state);
            match *state {
                DispatcherState::Stopped => *state = DispatcherState::Starting,
                DispatcherState::Starting | DispatcherState::Running => {}
                DispatcherState::Stopping => {
                    *state = DispatcherState::Stopped;
                    info!("Dispatcher stopped before its loop began");
                    return Ok(());
                }
            }
        }

        if let Err(e) = source.subscribe(topics).await {
            error!(error = %e, "Event bus subscription failed");
            self.set_state(DispatcherState::Stopped);
            return Err(e);
        }

        {
            let mut state = lock(&self.state);
            if *state == DispatcherState::Starting {
                *state = DispatcherState::Running;
            }
        }
        info!(topics = ?topics, "Dispatcher running");

        let mut last_commit = Instant::now();
        loop {
            tokio::select! {
                biased;
                _ = self.stop_signal.notified() => {
                    // A permit left by an earlier stop() is not a request for this loop.
                    if self.state() == DispatcherState::Stopping {
                        break;
                    }
                }
                next = source.next() => match next {
                    Ok(record) => {
                        self.dispatch_record(&record).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "Event bus poll failed");
                        lock(&self.stats).transport_errors += 1;
                        tokio::time::sleep(TRANSPORT_BACKOFF).await;
                    }
                },
            }

            if last_commit.elapsed() >= self.commit_interval {
                self.commit(source).await;
                last_commit = Instant::now();
            }
        }

        self.commit(source).await;
        self.set_state(DispatcherState::Stopped);
        info!(events_processed = self.stats().events_processed, "Dispatcher stopped");
        Ok(())
    }

    async fn commit(&self, source: &mut dyn EventSource) {
        if let Err(e) = source.commit().await {
            warn!(error = %e, "Offset commit failed; uncommitted records will be redelivered");
            lock(&self.stats).transport_errors += 1;
        }
    }

    // =================================================================
    // Reporting
    // =================================================================

    pub fn stats(&self) -> DispatchStats {
        lock(&self.stats).clone()
    }

    /// Most recent failures, oldest first.
    pub fn failures(&self) -> Vec<FailureRecord> {
        lock(&self.failures).snapshot()
    }

    /// Hand the failure list to a sink and clear it.
    pub fn take_failures(&self) -> Vec<FailureRecord> {
        lock(&self.failures).drain()
    }
}

/// Releases the single-loop claim however `run` exits.
struct LoopClaim<'a>(&'a AtomicBool);

impl Drop for LoopClaim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(l: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(l: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
