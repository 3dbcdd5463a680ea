//! Single-attempt record publisher.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::publisher::{PublishError, PutAck, Sink};
use crate::record::MetricRecord;

/// Default per-call sink timeout (5 seconds).
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default payload size limit (1 MiB).
pub const DEFAULT_MAX_RECORD_BYTES: usize = 1024 * 1024;

/// Delivers one record per call to a shared [`Sink`].
///
/// Holds no records; the caller reports the outcome back to its buffer.
#[derive(Clone)]
pub struct Publisher {
    sink: Arc<dyn Sink>,
    stream_id: String,
    timeout: Duration,
    max_record_bytes: usize,
}

impl Publisher {
    pub fn new(sink: Arc<dyn Sink>, stream_id: impl Into<String>) -> Self {
        Self {
            sink,
            stream_id: stream_id.into(),
            timeout: DEFAULT_PUBLISH_TIMEOUT,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the payload size limit.
    pub fn with_max_record_bytes(mut self, max: usize) -> Self {
        self.max_record_bytes = max;
        self
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Make one delivery attempt.
    ///
    /// The record is keyed by its `id`. Oversized or unserializable records
    /// fail with [`PublishError::InvalidRecord`] without touching the sink; a
    /// call exceeding the timeout fails with [`PublishError::Unavailable`].
    pub async fn publish(&self, record: &MetricRecord) -> Result<PutAck, PublishError> {
        let payload = record
            .to_json_bytes()
            .map_err(|e| PublishError::InvalidRecord(format!("serialization failed: {}", e)))?;
        if payload.len() > self.max_record_bytes {
            return Err(PublishError::InvalidRecord(format!(
                "payload is {} bytes, limit is {}",
                payload.len(),
                self.max_record_bytes
            )));
        }

        match timeout(
            self.timeout,
            self.sink.put(&self.stream_id, &record.id, payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PublishError::Unavailable(format!(
                "sink call timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("stream_id", &self.stream_id)
            .field("timeout", &self.timeout)
            .field("max_record_bytes", &self.max_record_bytes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(String, String, Vec<u8>)>>,
    }

    #[async_trait::async_trait]
    impl Sink for RecordingSink {
        async fn put(
            &self,
            stream_id: &str,
            partition_key: &str,
            payload: Vec<u8>,
        ) -> Result<PutAck, PublishError> {
            self.calls.lock().unwrap().push((
                stream_id.to_string(),
                partition_key.to_string(),
                payload,
            ));
            Ok(PutAck {
                shard_id: "shard-0".into(),
                sequence_number: "1".into(),
            })
        }
    }

    struct SlowSink;

    #[async_trait::async_trait]
    impl Sink for SlowSink {
        async fn put(&self, _: &str, _: &str, _: Vec<u8>) -> Result<PutAck, PublishError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(PutAck::default())
        }
    }

    #[tokio::test]
    async fn test_publish_uses_record_id_as_partition_key() {
        let sink = Arc::new(RecordingSink::default());
        let publisher = Publisher::new(sink.clone(), "analytics");
        let record = MetricRecord::new("vm-server-01", RecordType::VmStats, 1)
            .with_field("cpu_usage", json!(3.5));

        let ack = publisher.publish(&record).await.unwrap();
        assert_eq!(ack.shard_id, "shard-0");

        let calls = sink.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "analytics");
        assert_eq!(calls[0].1, "vm-server-01");
        let sent: MetricRecord = serde_json::from_slice(&calls[0].2).unwrap();
        assert_eq!(sent, record);
    }

    #[tokio::test]
    async fn test_publish_rejects_oversized_record() {
        let sink = Arc::new(RecordingSink::default());
        let publisher = Publisher::new(sink.clone(), "analytics").with_max_record_bytes(64);
        let record = MetricRecord::new("k", RecordType::Custom, 1)
            .with_field("blob", json!("x".repeat(128)));

        let err = publisher.publish(&record).await.unwrap_err();
        assert!(matches!(err, PublishError::InvalidRecord(_)));
        assert!(!err.is_retryable());
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_timeout_is_unavailable() {
        let publisher =
            Publisher::new(Arc::new(SlowSink), "analytics").with_timeout(Duration::from_secs(2));
        let record = MetricRecord::new("k", RecordType::Custom, 1);

        let err = publisher.publish(&record).await.unwrap_err();
        assert!(matches!(err, PublishError::Unavailable(_)));
        assert!(err.is_retryable());
    }
}
