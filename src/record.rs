//! Record types shared by collectors, the buffer and the publisher.
//!
//! - [`MetricRecord`]: One collected observation, serialized as a JSON object
//! - [`RecordType`]: Domain of the record (`vm_stats`, `webapp_health`, ...)
//! - [`MonotonicClock`]: Per-collector millisecond clock that never goes backwards

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Structured payload carried by a record.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Envelope keys a payload field may not use on the wire.
pub const RESERVED_FIELDS: [&str; 4] = ["id", "event_id", "timestamp", "type"];

/// Payload key for `key`, prefixed with `payload_` if it clashes with the envelope.
fn payload_key(key: String) -> String {
    if RESERVED_FIELDS.contains(&key.as_str()) {
        format!("payload_{key}")
    } else {
        key
    }
}

/// Metric record domain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RecordType {
    /// Host CPU, memory, disk and network snapshot.
    VmStats,
    /// Web application health probe.
    WebappHealth,
    /// Application event (user action).
    AppEvent,
    /// Anything produced by a custom collector.
    Custom,
}

/// A single collected observation.
///
/// On the wire the payload fields sit next to the envelope fields:
///
/// ```
/// use streamfeed::{MetricRecord, RecordType};
/// use serde_json::json;
///
/// let record = MetricRecord::new("vm-01", RecordType::VmStats, 1_700_000_000_000)
///     .with_field("cpu_usage", json!(12.5));
/// let json = serde_json::to_value(&record).unwrap();
/// assert_eq!(json["type"], "vm_stats");
/// assert_eq!(json["cpu_usage"], 12.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Partition / grouping key.
    pub id: String,
    /// Unique per record.
    pub event_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Record domain.
    #[serde(rename = "type")]
    pub kind: RecordType,
    /// Domain specific fields. The builders rename keys listed in
    /// [`RESERVED_FIELDS`].
    #[serde(flatten)]
    pub payload: Payload,
}

impl MetricRecord {
    /// Create a record with a fresh UUID v4 `event_id` and an empty payload.
    pub fn new(id: impl Into<String>, kind: RecordType, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            kind,
            payload: Payload::new(),
        }
    }

    /// Override the event id.
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = event_id.into();
        self
    }

    /// Replace the payload.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload
            .into_iter()
            .map(|(key, value)| (payload_key(key), value))
            .collect();
        self
    }

    /// Insert a single payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(payload_key(key.into()), value);
        self
    }

    /// Serialize to UTF-8 JSON bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Millisecond wall clock that is non-decreasing for its owner.
///
/// Each collector owns one, so records it produces never carry a timestamp
/// older than the previous record even if the system clock steps back.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time in milliseconds, clamped to the last value handed out.
    pub fn now_ms(&self) -> i64 {
        self.observe(Utc::now().timestamp_millis())
    }

    fn observe(&self, wall_ms: i64) -> i64 {
        let prev = self.last.fetch_max(wall_ms, Ordering::AcqRel);
        prev.max(wall_ms)
    }
}
