//! Publisher Layer
//!
//! Delivery of records to the external stream-ingestion API.
//!
//! - [`Sink`]: The external API, one `put` per record
//! - [`HttpSink`]: Sink over an HTTP ingestion endpoint
//! - [`LogSink`]: Dry-run sink that only logs
//! - [`Publisher`]: Serializes, size-checks and time-bounds one attempt
//! - [`PublishError`]: Attempt failure, split into retryable and fatal kinds

mod client;
mod error;
mod http;
mod log;
mod sink;

pub use client::{DEFAULT_MAX_RECORD_BYTES, DEFAULT_PUBLISH_TIMEOUT, Publisher};
pub use error::{PublishError, PublishErrorKind, SinkSetupError};
pub use http::{HttpSink, PARTITION_KEY_HEADER, STREAM_ID_HEADER};
pub use log::{LOG_SHARD_ID, LogSink};
pub use sink::{PutAck, Sink};
