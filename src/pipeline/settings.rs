//! Per-pipeline tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP, DEFAULT_BUFFER_CAPACITY, DEFAULT_MAX_ATTEMPTS,
    RetryPolicy,
};
use crate::collector::DEFAULT_COLLECT_TIMEOUT;
use crate::scheduler::{MIN_INTERVAL, Schedule};

/// Default collection interval (10 seconds).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Default drain timeout at shutdown (10 seconds).
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default concurrent delivery attempts.
pub const DEFAULT_FAN_OUT: usize = 1;

/// Bounds of a uniformly random collection interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomInterval {
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

/// Schedule, delivery policy and routing for one pipeline.
///
/// Deserialized from the settings fields of a pipeline entry; every field
/// has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Fixed collection period. Mutually exclusive with `random_interval`.
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,

    /// Uniform offset applied to `interval`.
    #[serde(with = "humantime_serde")]
    pub jitter: Option<Duration>,

    pub random_interval: Option<RandomInterval>,

    #[serde(with = "humantime_serde")]
    pub collect_timeout: Duration,

    pub buffer_capacity: usize,

    /// Delivery attempts before a record is dead-lettered.
    pub max_attempts: u32,

    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,

    #[serde(with = "humantime_serde")]
    pub backoff_cap: Duration,

    /// Concurrent delivery attempts. 1 keeps delivery in collection order.
    pub fan_out: usize,

    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,

    /// Overrides the global stream id.
    pub stream_id: Option<String>,

    /// Overrides the global sink endpoint.
    pub sink_endpoint: Option<String>,

    pub enabled: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            interval: None,
            jitter: None,
            random_interval: None,
            collect_timeout: DEFAULT_COLLECT_TIMEOUT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
            fan_out: DEFAULT_FAN_OUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            stream_id: None,
            sink_endpoint: None,
            enabled: true,
        }
    }
}

impl PipelineSettings {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self.random_interval = None;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Some(jitter);
        self
    }

    pub fn with_random_interval(mut self, min: Duration, max: Duration) -> Self {
        self.random_interval = Some(RandomInterval { min, max });
        self.interval = None;
        self
    }

    pub fn with_collect_timeout(mut self, timeout: Duration) -> Self {
        self.collect_timeout = timeout;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, base: Duration, cap: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.backoff_base = base;
        self.backoff_cap = cap;
        self
    }

    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Collection schedule described by these settings.
    pub fn schedule(&self) -> Schedule {
        if let Some(RandomInterval { min, max }) = self.random_interval {
            return Schedule::random(min, max);
        }
        let period = self.interval.unwrap_or(DEFAULT_INTERVAL);
        match self.jitter {
            Some(jitter) => Schedule::jittered(period, jitter),
            None => Schedule::fixed(period),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.backoff_base, self.backoff_cap)
    }

    /// Check the settings for contradictions.
    ///
    /// Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.interval.is_some() && self.random_interval.is_some() {
            return Err("'interval' and 'random_interval' are mutually exclusive".into());
        }
        if self.jitter.is_some() && self.random_interval.is_some() {
            return Err("'jitter' only applies to 'interval'".into());
        }
        if let Some(interval) = self.interval {
            if interval < MIN_INTERVAL {
                return Err(format!(
                    "interval {:?} is below the minimum of {:?}",
                    interval, MIN_INTERVAL
                ));
            }
        }
        if let Some(RandomInterval { min, max }) = self.random_interval {
            if min > max {
                return Err(format!("random_interval min {:?} exceeds max {:?}", min, max));
            }
        }
        if self.collect_timeout.is_zero() {
            return Err("collect_timeout must be positive".into());
        }
        if self.buffer_capacity == 0 {
            return Err("buffer_capacity must be at least 1".into());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        if self.fan_out == 0 {
            return Err("fan_out must be at least 1".into());
        }
        if self.backoff_base > self.backoff_cap {
            return Err(format!(
                "backoff_base {:?} exceeds backoff_cap {:?}",
                self.backoff_base, self.backoff_cap
            ));
        }
        Ok(())
    }
}
