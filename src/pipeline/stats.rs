//! Per-pipeline counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared by a pipeline's collection and delivery loops.
#[derive(Debug, Default)]
pub struct PipelineStats {
    collected: AtomicU64,
    collection_failures: AtomicU64,
    delivered: AtomicU64,
    retries: AtomicU64,
    dead_lettered: AtomicU64,
    dropped_overflow: AtomicU64,
    delivered_after_eviction: AtomicU64,
    dropped_at_shutdown: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub collected: u64,
    pub collection_failures: u64,
    pub delivered: u64,
    pub retries: u64,
    pub dead_lettered: u64,
    pub dropped_overflow: u64,
    /// Evicted while in flight, then accepted by the sink anyway. Also
    /// counted in `dropped_overflow`, never in `delivered`.
    pub delivered_after_eviction: u64,
    pub dropped_at_shutdown: u64,
}

impl PipelineStats {
    pub fn record_collected(&self) {
        self.collected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_collection_failure(&self) {
        self.collection_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_overflow(&self) {
        self.dropped_overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered_after_eviction(&self) {
        self.delivered_after_eviction.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_at_shutdown(&self, n: u64) {
        self.dropped_at_shutdown.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            collected: self.collected.load(Ordering::Relaxed),
            collection_failures: self.collection_failures.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            delivered_after_eviction: self.delivered_after_eviction.load(Ordering::Relaxed),
            dropped_at_shutdown: self.dropped_at_shutdown.load(Ordering::Relaxed),
        }
    }
}
