//! Sink abstraction over the external stream-ingestion API.

use serde::{Deserialize, Serialize};

use crate::publisher::PublishError;

/// Acknowledgement returned by the sink for an accepted record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutAck {
    pub shard_id: String,
    pub sequence_number: String,
}

/// External stream-ingestion API.
///
/// Implementations must be safe to share between all pipelines: credentials
/// are fixed at construction and no per-call mutable state needs external
/// locking.
#[async_trait::async_trait]
pub trait Sink: Send + Sync + 'static {
    /// Store one payload in `stream_id` under `partition_key`.
    async fn put(
        &self,
        stream_id: &str,
        partition_key: &str,
        payload: Vec<u8>,
    ) -> Result<PutAck, PublishError>;
}
