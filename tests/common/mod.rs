//! Shared test doubles for pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::json;
use streamfeed::collector::{CollectionError, Collector};
use streamfeed::publisher::{PublishError, PutAck, Sink};
use streamfeed::{MetricRecord, RecordType};
use tokio::time::Instant;

// =============================================================================
// Collectors
// =============================================================================

/// Produces `e0001`, `e0002`, ... one per cycle.
pub struct SequenceCollector {
    name: String,
    n: u64,
}

impl SequenceCollector {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            n: 0,
        }
    }
}

pub fn event_id(n: u64) -> String {
    format!("e{:04}", n)
}

#[async_trait::async_trait]
impl Collector for SequenceCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn record_type(&self) -> RecordType {
        RecordType::Custom
    }

    async fn collect(&mut self) -> Result<MetricRecord, CollectionError> {
        self.n += 1;
        Ok(
            MetricRecord::new("sequence", RecordType::Custom, self.n as i64)
                .with_event_id(event_id(self.n))
                .with_field("seq", json!(self.n)),
        )
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Sink with scripted failures and latency.
pub struct ScriptedSink {
    failures_per_record: u32,
    fail_every: Option<u32>,
    failure: PublishError,
    latency: Duration,
    calls: AtomicU32,
    state: Mutex<SinkState>,
}

#[derive(Default)]
struct SinkState {
    attempts: HashMap<String, u32>,
    accepted: Vec<String>,
    call_times: Vec<(String, Instant)>,
}

impl ScriptedSink {
    /// Accepts everything.
    pub fn accepting() -> Self {
        Self {
            failures_per_record: 0,
            fail_every: None,
            failure: PublishError::Unavailable("scripted".into()),
            latency: Duration::ZERO,
            calls: AtomicU32::new(0),
            state: Mutex::new(SinkState::default()),
        }
    }

    /// Fails the first `n` attempts of every record with `failure`.
    pub fn failing_first(n: u32, failure: PublishError) -> Self {
        Self {
            failures_per_record: n,
            failure,
            ..Self::accepting()
        }
    }

    /// Fails every attempt with `failure`.
    pub fn always_failing(failure: PublishError) -> Self {
        Self::failing_first(u32::MAX, failure)
    }

    /// Fails every `n`th call with `Unavailable`.
    pub fn failing_every(n: u32) -> Self {
        Self {
            fail_every: Some(n),
            ..Self::accepting()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Event ids acknowledged, in acknowledgement order.
    pub fn accepted(&self) -> Vec<String> {
        self.state.lock().unwrap().accepted.clone()
    }

    /// Instants of every call for one record.
    pub fn call_times(&self, event_id: &str) -> Vec<Instant> {
        self.state
            .lock()
            .unwrap()
            .call_times
            .iter()
            .filter(|(id, _)| id == event_id)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Sink for ScriptedSink {
    async fn put(
        &self,
        _stream_id: &str,
        _partition_key: &str,
        payload: Vec<u8>,
    ) -> Result<PutAck, PublishError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let record: MetricRecord = serde_json::from_slice(&payload)
            .map_err(|e| PublishError::InvalidRecord(e.to_string()))?;
        self.state
            .lock()
            .unwrap()
            .call_times
            .push((record.event_id.clone(), Instant::now()));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.state.lock().unwrap();
        let attempts = state.attempts.entry(record.event_id.clone()).or_insert(0);
        *attempts += 1;
        if *attempts <= self.failures_per_record {
            return Err(self.failure.clone());
        }
        if self.fail_every.is_some_and(|n| call % n == 0) {
            return Err(PublishError::Unavailable(format!("call {} failed", call)));
        }

        state.accepted.push(record.event_id);
        Ok(PutAck {
            shard_id: "shard-0".into(),
            sequence_number: state.accepted.len().to_string(),
        })
    }
}
