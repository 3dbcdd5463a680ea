//! Collection and delivery loops for one pipeline.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Notify, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::buffer::{BufferError, DeadLetterLog, NackOutcome, RetryBuffer};
use crate::collector::{CollectionError, Collector};
use crate::pipeline::settings::PipelineSettings;
use crate::pipeline::state::PipelineState;
use crate::pipeline::stats::{PipelineStats, StatsSnapshot};
use crate::publisher::{PublishError, Publisher, PutAck};
use crate::record::MetricRecord;
use crate::scheduler::Scheduler;

/// Final accounting of a pipeline that reached `Stopped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub name: String,
    pub state: PipelineState,
    pub stats: StatsSnapshot,
    /// The drain timeout elapsed with records still queued.
    pub drain_timed_out: bool,
    /// Child loops that ended abnormally.
    pub errors: Vec<String>,
}

impl PipelineReport {
    /// Nothing was lost at shutdown and both loops ended normally.
    pub fn is_clean(&self) -> bool {
        self.stats.dropped_at_shutdown == 0 && !self.drain_timed_out && self.errors.is_empty()
    }
}

/// A pipeline task that did not produce a report.
#[derive(Debug, Clone, Error)]
#[error("pipeline '{name}' failed: {error}")]
pub struct PipelineFailure {
    pub name: String,
    pub error: String,
    /// Counters as they stood when the task died.
    pub stats: StatsSnapshot,
}

/// State shared by the collection loop, the delivery loop and the handle.
struct Shared {
    name: String,
    buffer: Mutex<RetryBuffer>,
    ready: Notify,
    stats: PipelineStats,
}

impl Shared {
    fn buffer(&self) -> MutexGuard<'_, RetryBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One collector wired to one publisher, not yet started.
///
/// # Example
///
/// ```ignore
/// let pipeline = Pipeline::new(collector, publisher, settings);
/// let handle = pipeline.start(shutdown.clone());
/// // ...
/// shutdown.cancel();
/// let report = handle.join().await?;
/// ```
pub struct Pipeline<C> {
    collector: C,
    publisher: Publisher,
    settings: PipelineSettings,
    dead_letters: Option<DeadLetterLog>,
    seed: Option<u64>,
}

impl<C: Collector> Pipeline<C> {
    pub fn new(collector: C, publisher: Publisher, settings: PipelineSettings) -> Self {
        Self {
            collector,
            publisher,
            settings,
            dead_letters: None,
            seed: None,
        }
    }

    /// Use this dead-letter log instead of an in-memory one.
    pub fn with_dead_letter_log(mut self, log: DeadLetterLog) -> Self {
        self.dead_letters = Some(log);
        self
    }

    /// Seed the scheduler's RNG (jitter and random intervals).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn name(&self) -> &str {
        self.collector.name()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Spawn the pipeline onto the current runtime.
    ///
    /// The pipeline runs until `shutdown` is cancelled, then drains for at
    /// most its drain timeout.
    pub fn start(self, shutdown: CancellationToken) -> PipelineHandle {
        let name = self.collector.name().to_string();
        let mut buffer = RetryBuffer::new(
            name.clone(),
            self.settings.buffer_capacity,
            self.settings.retry_policy(),
        );
        if let Some(log) = self.dead_letters {
            buffer = buffer.with_dead_letter_log(log);
        }
        let shared = Arc::new(Shared {
            name: name.clone(),
            buffer: Mutex::new(buffer),
            ready: Notify::new(),
            stats: PipelineStats::default(),
        });

        let mut scheduler = Scheduler::new(self.settings.schedule(), shutdown.clone());
        if let Some(seed) = self.seed {
            scheduler = scheduler.with_seed(seed);
        }

        let (state_tx, state_rx) = watch::channel(PipelineState::Idle);
        transition(&state_tx, &name, PipelineState::Running);
        tracing::info!(
            pipeline = %name,
            record_type = %self.collector.record_type(),
            schedule = %scheduler.schedule(),
            stream_id = %self.publisher.stream_id(),
            capacity = self.settings.buffer_capacity,
            fan_out = self.settings.fan_out,
            "Pipeline started"
        );

        let task = tokio::spawn(run(
            self.collector,
            scheduler,
            self.publisher,
            self.settings,
            shared.clone(),
            shutdown,
            state_tx,
        ));

        PipelineHandle {
            name,
            state: state_rx,
            shared,
            task,
        }
    }
}

impl<C> std::fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("publisher", &self.publisher)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Running pipeline.
pub struct PipelineHandle {
    name: String,
    state: watch::Receiver<PipelineState>,
    shared: Arc<Shared>,
    task: JoinHandle<PipelineReport>,
}

impl PipelineHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Receiver for lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Records currently queued, in flight included.
    pub fn queue_depth(&self) -> usize {
        self.shared.buffer().len()
    }

    /// Dead letters recorded so far.
    pub fn dead_letter_count(&self) -> u64 {
        self.shared.buffer().dead_letters().total()
    }

    /// Wait for the pipeline to stop.
    ///
    /// # Errors
    /// Returns [`PipelineFailure`] if the pipeline task panicked or was
    /// aborted.
    pub async fn join(self) -> Result<PipelineReport, PipelineFailure> {
        let Self {
            name, shared, task, ..
        } = self;
        task.await.map_err(|e| PipelineFailure {
            name,
            error: e.to_string(),
            stats: shared.stats.snapshot(),
        })
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn transition(state: &watch::Sender<PipelineState>, name: &str, next: PipelineState) {
    let prev = *state.borrow();
    debug_assert!(prev.can_transition_to(next), "{prev} -> {next}");
    state.send_replace(next);
    tracing::debug!(pipeline = %name, from = %prev, to = %next, "Pipeline state changed");
}

async fn run<C: Collector>(
    collector: C,
    scheduler: Scheduler,
    publisher: Publisher,
    settings: PipelineSettings,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    state: watch::Sender<PipelineState>,
) -> PipelineReport {
    let draining = CancellationToken::new();
    let mut collection = tokio::spawn(collect_loop(
        collector,
        scheduler,
        shared.clone(),
        settings.collect_timeout,
    ));
    let mut delivery = tokio::spawn(delivery_loop(
        publisher,
        shared.clone(),
        settings.fan_out,
        draining.clone(),
    ));

    // The collection loop only ends before shutdown if it panicked; delivery
    // carries on with what is buffered.
    let early = tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        joined = &mut collection => Some(joined),
    };
    if early.is_some() {
        tracing::error!(pipeline = %shared.name, "Collection loop ended before shutdown");
        shutdown.cancelled().await;
    }

    transition(&state, &shared.name, PipelineState::Draining);
    tracing::info!(
        pipeline = %shared.name,
        queue_depth = shared.buffer().len(),
        drain_timeout = ?settings.drain_timeout,
        "Draining pipeline"
    );

    let mut errors = Vec::new();
    let joined = match early {
        Some(joined) => joined,
        None => collection.await,
    };
    if let Err(e) = joined {
        tracing::error!(pipeline = %shared.name, error = %e, "Collection loop failed");
        errors.push(format!("collection loop failed: {}", e));
    }

    // Drain time starts once no more records can arrive.
    draining.cancel();
    shared.ready.notify_one();
    let drain_timed_out = match tokio::time::timeout(settings.drain_timeout, &mut delivery).await {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            tracing::error!(pipeline = %shared.name, error = %e, "Delivery loop failed");
            errors.push(format!("delivery loop failed: {}", e));
            false
        }
        Err(_) => {
            delivery.abort();
            tracing::warn!(
                pipeline = %shared.name,
                drain_timeout = ?settings.drain_timeout,
                "Drain timed out"
            );
            true
        }
    };

    let leftover = shared.buffer().drain_all();
    if !leftover.is_empty() {
        shared.stats.record_dropped_at_shutdown(leftover.len() as u64);
        tracing::warn!(
            pipeline = %shared.name,
            dropped = leftover.len(),
            "Discarded undelivered records at shutdown"
        );
    }

    transition(&state, &shared.name, PipelineState::Stopped);
    let stats = shared.stats.snapshot();
    tracing::info!(
        pipeline = %shared.name,
        collected = stats.collected,
        collection_failures = stats.collection_failures,
        delivered = stats.delivered,
        retries = stats.retries,
        dead_lettered = stats.dead_lettered,
        dropped_overflow = stats.dropped_overflow,
        delivered_after_eviction = stats.delivered_after_eviction,
        dropped_at_shutdown = stats.dropped_at_shutdown,
        "Pipeline stopped"
    );

    PipelineReport {
        name: shared.name.clone(),
        state: PipelineState::Stopped,
        stats,
        drain_timed_out,
        errors,
    }
}

async fn collect_loop<C: Collector>(
    mut collector: C,
    mut scheduler: Scheduler,
    shared: Arc<Shared>,
    collect_timeout: Duration,
) {
    while scheduler.tick().await {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(collect_timeout, collector.collect()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CollectionError::Timeout(collect_timeout)),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(record) => {
                let event_id = record.event_id.clone();
                let (evicted, queue_depth, in_flight) = {
                    let mut buffer = shared.buffer();
                    let evicted = buffer.enqueue(record, Instant::now());
                    (evicted, buffer.len(), buffer.in_flight())
                };
                shared.stats.record_collected();
                if evicted.is_some() {
                    shared.stats.record_dropped_overflow();
                }
                shared.ready.notify_one();

                let stats = shared.stats.snapshot();
                tracing::info!(
                    pipeline = %shared.name,
                    status = "ok",
                    event_id = %event_id,
                    latency_ms,
                    queue_depth,
                    in_flight,
                    delivered = stats.delivered,
                    dropped = stats.dropped_overflow,
                    dead_lettered = stats.dead_lettered,
                    "Collection cycle"
                );
            }
            Err(e) => {
                shared.stats.record_collection_failure();
                let queue_depth = shared.buffer().len();
                let stats = shared.stats.snapshot();
                tracing::warn!(
                    pipeline = %shared.name,
                    status = %e.kind(),
                    error = %e,
                    latency_ms,
                    queue_depth,
                    dropped = stats.dropped_overflow,
                    dead_lettered = stats.dead_lettered,
                    "Collection cycle failed"
                );
            }
        }
    }
    tracing::debug!(pipeline = %shared.name, "Collection loop stopped");
}

type Attempt = (String, Result<PutAck, PublishError>);

async fn delivery_loop(
    publisher: Publisher,
    shared: Arc<Shared>,
    fan_out: usize,
    draining: CancellationToken,
) {
    let fan_out = fan_out.max(1);
    let mut attempts: JoinSet<Attempt> = JoinSet::new();
    let mut drain_seen = false;

    loop {
        let (batch, next_ready, empty) = {
            let mut buffer = shared.buffer();
            let batch = buffer.dequeue_batch(fan_out.saturating_sub(attempts.len()), Instant::now());
            (batch, buffer.next_ready_at(), buffer.is_empty())
        };
        for record in batch {
            spawn_attempt(&mut attempts, publisher.clone(), record);
        }

        if draining.is_cancelled() && empty && attempts.is_empty() {
            break;
        }

        // A ready record only matters if there is a free slot for it.
        let wake_at = next_ready.filter(|_| attempts.len() < fan_out);
        tokio::select! {
            Some(joined) = attempts.join_next(), if !attempts.is_empty() => match joined {
                Ok((event_id, result)) => settle(&shared, &event_id, result),
                Err(e) => tracing::error!(
                    pipeline = %shared.name,
                    error = %e,
                    "Delivery attempt task failed"
                ),
            },
            _ = shared.ready.notified() => {}
            _ = sleep_until(wake_at) => {}
            _ = draining.cancelled(), if !drain_seen => drain_seen = true,
        }
    }
    tracing::debug!(pipeline = %shared.name, "Delivery loop stopped");
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run one delivery attempt.
///
/// The sink call gets its own task so that a panicking sink turns into a
/// retryable failure instead of leaving the record in flight forever.
fn spawn_attempt(attempts: &mut JoinSet<Attempt>, publisher: Publisher, record: MetricRecord) {
    attempts.spawn(async move {
        let event_id = record.event_id.clone();
        let mut call = AbortOnDrop(tokio::spawn(async move { publisher.publish(&record).await }));
        let result = match (&mut call.0).await {
            Ok(result) => result,
            Err(e) => Err(PublishError::Unavailable(format!("delivery attempt failed: {}", e))),
        };
        (event_id, result)
    });
}

/// Report one attempt's outcome to the buffer.
fn settle(shared: &Shared, event_id: &str, result: Result<PutAck, PublishError>) {
    let mut buffer = shared.buffer();
    let mut accepted = None;
    let outcome = match result {
        Ok(ack) => {
            let acked = buffer.ack(event_id).map(|entry| {
                shared.stats.record_delivered();
                tracing::debug!(
                    pipeline = %shared.name,
                    event_id = %event_id,
                    shard_id = %ack.shard_id,
                    sequence_number = %ack.sequence_number,
                    attempts = entry.attempts + 1,
                    "Record delivered"
                );
            });
            if acked.is_err() {
                accepted = Some(ack);
            }
            acked
        }
        Err(err) if err.is_retryable() => buffer
            .nack(event_id, &err.to_string(), Instant::now())
            .map(|outcome| match outcome {
                NackOutcome::Retry { attempts, .. } => {
                    shared.stats.record_retry();
                    tracing::warn!(
                        pipeline = %shared.name,
                        event_id = %event_id,
                        kind = %err.kind(),
                        error = %err,
                        attempts,
                        "Delivery attempt failed"
                    );
                }
                NackOutcome::DeadLettered { .. } => shared.stats.record_dead_lettered(),
            }),
        Err(err) => buffer
            .reject(event_id, &err.to_string())
            .map(|_| shared.stats.record_dead_lettered()),
    };

    match (outcome, accepted) {
        (Ok(()), _) => {}
        // Evicted by overflow while its attempt was running.
        (Err(BufferError::UnknownRecord(_)), Some(ack)) => {
            shared.stats.record_delivered_after_eviction();
            tracing::debug!(
                pipeline = %shared.name,
                event_id = %event_id,
                shard_id = %ack.shard_id,
                sequence_number = %ack.sequence_number,
                "Evicted record was delivered"
            );
        }
        (Err(BufferError::UnknownRecord(_)), None) => {
            tracing::debug!(
                pipeline = %shared.name,
                event_id = %event_id,
                "Outcome for evicted record ignored"
            );
        }
        (Err(e), _) => {
            tracing::warn!(
                pipeline = %shared.name,
                error = %e,
                "Discarded delivery outcome"
            );
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
