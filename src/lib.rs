//! streamfeed - Periodic Metrics Collection and Publish Pipeline
//!
//! This crate runs independent pipelines that periodically collect metric
//! records and deliver them, at least once, to a partitioned stream-ingestion
//! API. It can be used as a library or run as the `streamfeed` binary.
//!
//! # Architecture
//!
//! - **Collectors**: Host statistics, web application health probes, synthetic app events
//! - **Scheduler**: Fixed, jittered or random collection intervals
//! - **Buffer**: Bounded ordered retry queue with backoff and dead letters
//! - **Publisher**: One delivery attempt per call against a [`Sink`]
//! - **Pipeline**: Collection and delivery loops, lifecycle and graceful drain
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use streamfeed::collector::vm::{VmStatsCollector, VmStatsConfig};
//! use streamfeed::{LogSink, Pipeline, PipelineSettings, Publisher, Supervisor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut supervisor = Supervisor::new();
//!     supervisor.spawn(Pipeline::new(
//!         VmStatsCollector::new(VmStatsConfig::new("host")),
//!         Publisher::new(Arc::new(LogSink::new()), "analytics"),
//!         PipelineSettings::default(),
//!     ));
//!
//!     let report = supervisor
//!         .run_until(async { tokio::signal::ctrl_c().await.unwrap_or_default() })
//!         .await;
//!     std::process::exit(report.exit_code().into());
//! }
//! ```

pub mod buffer;
pub mod collector;
pub mod config;
pub mod pipeline;
pub mod publisher;
pub mod record;
pub mod scheduler;

pub use buffer::{DeadLetter, DeadLetterLog, RetryBuffer, RetryPolicy};
pub use collector::{CollectionError, Collector};
pub use config::{AppConfig, ConfigError};
pub use pipeline::{
    Pipeline, PipelineHandle, PipelineReport, PipelineSettings, PipelineState, Supervisor,
    SupervisorReport,
};
pub use publisher::{HttpSink, LogSink, PublishError, Publisher, PutAck, Sink};
pub use record::{MetricRecord, MonotonicClock, RecordType};
pub use scheduler::{Schedule, Scheduler};
