//! Bounded, ordered retry queue.

use std::collections::VecDeque;

use chrono::Utc;
use thiserror::Error;
use tokio::time::Instant;

use crate::buffer::backoff::RetryPolicy;
use crate::buffer::dead_letter::{DeadLetter, DeadLetterLog};
use crate::record::MetricRecord;

/// Default queue capacity.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Protocol violations when reporting a delivery outcome.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    /// No queued record has this event id (already acked, evicted or never enqueued).
    #[error("unknown record: {0}")]
    UnknownRecord(String),

    /// The record is queued but no delivery attempt is outstanding for it.
    #[error("record not in flight: {0}")]
    NotInFlight(String),
}

/// A queued record and its delivery bookkeeping.
#[derive(Debug, Clone)]
pub struct BufferedRecord {
    pub record: MetricRecord,
    /// Failed delivery attempts so far.
    pub attempts: u32,
    pub enqueued_at: Instant,
    /// Earliest instant the next attempt may start.
    pub next_retry_at: Instant,
    in_flight: bool,
}

impl BufferedRecord {
    fn new(record: MetricRecord, now: Instant) -> Self {
        Self {
            record,
            attempts: 0,
            enqueued_at: now,
            next_retry_at: now,
            in_flight: false,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

/// Result of a failed, retryable attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// Record stays queued until `next_retry_at`.
    Retry { attempts: u32, next_retry_at: Instant },
    /// Attempt budget exhausted; record moved to the dead-letter log.
    DeadLettered { attempts: u32 },
}

/// Bounded FIFO of un-acknowledged records for one pipeline.
///
/// Operations are synchronous and never block. A record moves through:
/// queued → in flight (via [`dequeue_batch`](Self::dequeue_batch)) → removed
/// by [`ack`](Self::ack) / [`reject`](Self::reject), or back to queued by
/// [`nack`](Self::nack) until the retry budget runs out. Outcome calls are
/// only accepted for in-flight records, so each attempt has exactly one
/// outcome.
#[derive(Debug)]
pub struct RetryBuffer {
    pipeline: String,
    capacity: usize,
    policy: RetryPolicy,
    entries: VecDeque<BufferedRecord>,
    dead_letters: DeadLetterLog,
    dropped: u64,
}

impl RetryBuffer {
    pub fn new(pipeline: impl Into<String>, capacity: usize, policy: RetryPolicy) -> Self {
        let pipeline = pipeline.into();
        Self {
            dead_letters: DeadLetterLog::new(pipeline.clone()),
            pipeline,
            capacity: capacity.max(1),
            policy,
            entries: VecDeque::new(),
            dropped: 0,
        }
    }

    /// Replace the dead-letter log (e.g. with a file backed one).
    pub fn with_dead_letter_log(mut self, log: DeadLetterLog) -> Self {
        self.dead_letters = log;
        self
    }

    /// Queue a record.
    ///
    /// At capacity the oldest record not currently in flight is evicted (the
    /// oldest overall if every record is in flight) and returned.
    pub fn enqueue(&mut self, record: MetricRecord, now: Instant) -> Option<BufferedRecord> {
        let evicted = if self.entries.len() >= self.capacity {
            let idx = self
                .entries
                .iter()
                .position(|e| !e.in_flight)
                .unwrap_or(0);
            let evicted = self.entries.remove(idx);
            if let Some(ref e) = evicted {
                self.dropped += 1;
                tracing::warn!(
                    pipeline = %self.pipeline,
                    event_id = %e.record.event_id,
                    in_flight = e.in_flight,
                    capacity = self.capacity,
                    dropped_total = self.dropped,
                    "Buffer full, dropped oldest record"
                );
            }
            evicted
        } else {
            None
        };

        self.entries.push_back(BufferedRecord::new(record, now));
        evicted
    }

    /// Hand out up to `max_n` records for delivery, in enqueue order.
    ///
    /// Returned records are marked in flight and stay queued until an outcome
    /// is reported. Scanning stops at the first record still waiting for its
    /// backoff, so later records never overtake an earlier one.
    pub fn dequeue_batch(&mut self, max_n: usize, now: Instant) -> Vec<MetricRecord> {
        let mut batch = Vec::new();
        for entry in self.entries.iter_mut() {
            if batch.len() >= max_n {
                break;
            }
            if entry.in_flight {
                continue;
            }
            if entry.next_retry_at > now {
                break;
            }
            entry.in_flight = true;
            batch.push(entry.record.clone());
        }
        batch
    }

    /// When the next record becomes eligible for delivery, if any is waiting.
    pub fn next_ready_at(&self) -> Option<Instant> {
        self.entries
            .iter()
            .find(|e| !e.in_flight)
            .map(|e| e.next_retry_at)
    }

    /// Confirm delivery and remove the record.
    pub fn ack(&mut self, event_id: &str) -> Result<BufferedRecord, BufferError> {
        let idx = self.in_flight_index(event_id)?;
        self.entries
            .remove(idx)
            .ok_or_else(|| BufferError::UnknownRecord(event_id.to_string()))
    }

    /// Report a retryable failure.
    pub fn nack(
        &mut self,
        event_id: &str,
        reason: &str,
        now: Instant,
    ) -> Result<NackOutcome, BufferError> {
        let idx = self.in_flight_index(event_id)?;
        let policy = self.policy;
        let entry = &mut self.entries[idx];
        entry.attempts += 1;
        entry.in_flight = false;

        if policy.is_exhausted(entry.attempts) {
            let attempts = entry.attempts;
            self.dead_letter(idx, reason);
            return Ok(NackOutcome::DeadLettered { attempts });
        }

        entry.next_retry_at = now + policy.backoff(entry.attempts);
        tracing::debug!(
            pipeline = %self.pipeline,
            event_id = %event_id,
            attempts = entry.attempts,
            retry_in_ms = policy.backoff(entry.attempts).as_millis(),
            "Delivery failed, scheduled retry"
        );
        Ok(NackOutcome::Retry {
            attempts: entry.attempts,
            next_retry_at: entry.next_retry_at,
        })
    }

    /// Report a non-retryable failure; the record is dead-lettered at once.
    pub fn reject(&mut self, event_id: &str, reason: &str) -> Result<u32, BufferError> {
        let idx = self.in_flight_index(event_id)?;
        self.entries[idx].attempts += 1;
        let attempts = self.entries[idx].attempts;
        self.dead_letter(idx, reason);
        Ok(attempts)
    }

    /// Remove every queued record, in flight or not.
    pub fn drain_all(&mut self) -> Vec<BufferedRecord> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn in_flight(&self) -> usize {
        self.entries.iter().filter(|e| e.in_flight).count()
    }

    /// Records evicted by overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn dead_letters(&self) -> &DeadLetterLog {
        &self.dead_letters
    }

    /// Look at a queued record.
    pub fn get(&self, event_id: &str) -> Option<&BufferedRecord> {
        self.entries.iter().find(|e| e.record.event_id == event_id)
    }

    fn in_flight_index(&self, event_id: &str) -> Result<usize, BufferError> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.record.event_id == event_id)
            .ok_or_else(|| BufferError::UnknownRecord(event_id.to_string()))?;
        if !self.entries[idx].in_flight {
            return Err(BufferError::NotInFlight(event_id.to_string()));
        }
        Ok(idx)
    }

    fn dead_letter(&mut self, idx: usize, reason: &str) {
        if let Some(entry) = self.entries.remove(idx) {
            self.dead_letters.push(DeadLetter {
                pipeline: self.pipeline.clone(),
                record: entry.record,
                attempts: entry.attempts,
                reason: reason.to_string(),
                dead_lettered_at: Utc::now(),
            });
        }
    }
}
