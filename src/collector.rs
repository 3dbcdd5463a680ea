//! Collector Layer
//!
//! Pluggable collectors that each produce one [`MetricRecord`](crate::MetricRecord)
//! per scheduled cycle. A collector is owned by exactly one pipeline, which
//! serializes its cycles and bounds each call with a timeout.
//!
//! # Architecture
//!
//! - [`Collector`]: Core trait for implementing data collectors
//! - [`CollectionError`]: Typed failure of a single cycle
//! - [`vm::VmStatsCollector`]: Host CPU/memory/disk/network snapshot
//! - [`http::HttpHealthCollector`]: Web application health probe
//! - [`app_event::AppEventCollector`]: Synthetic user events
//!
//! # Example
//!
//! ```rust,no_run
//! use streamfeed::collector::http::{HttpHealthCollector, HttpHealthConfig};
//! use streamfeed::collector::Collector;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HttpHealthConfig::new("webapp", "http://localhost:8000")
//!     .with_timeout(Duration::from_secs(5));
//! let mut collector = HttpHealthCollector::new(config)?;
//! let record = collector.collect().await?;
//! println!("{}", serde_json::to_string(&record)?);
//! # Ok(())
//! # }
//! ```

pub mod app_event;
pub mod http;
mod traits;
pub mod vm;

pub use traits::{CollectionError, CollectionErrorKind, Collector, DEFAULT_COLLECT_TIMEOUT};
