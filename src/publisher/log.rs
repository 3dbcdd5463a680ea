//! Dry-run sink that only logs.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::publisher::{PublishError, PutAck, Sink};

/// Shard id reported for every record.
pub const LOG_SHARD_ID: &str = "shard-local";

/// Sink that writes each record to the log and acknowledges it.
#[derive(Debug, Default)]
pub struct LogSink {
    sequence: AtomicU64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Sink for LogSink {
    async fn put(
        &self,
        stream_id: &str,
        partition_key: &str,
        payload: Vec<u8>,
    ) -> Result<PutAck, PublishError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            stream_id,
            partition_key,
            sequence,
            bytes = payload.len(),
            payload = %String::from_utf8_lossy(&payload),
            "Record published (dry run)"
        );
        Ok(PutAck {
            shard_id: LOG_SHARD_ID.to_string(),
            sequence_number: format!("{:020}", sequence),
        })
    }
}
