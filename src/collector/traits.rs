//! Core collector traits and types.

use std::time::Duration;

use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use crate::record::{MetricRecord, RecordType};

/// Default bound on a single collection call (5 seconds).
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur during collection.
///
/// Every collector failure reduces to one of these four kinds; the pipeline
/// logs it, skips the cycle and keeps its schedule.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// Collection did not finish within its timeout.
    #[error("collection timed out after {0:?}")]
    Timeout(Duration),

    /// The data source could not be reached (connection refused, DNS, ...).
    #[error("source unreachable: {0}")]
    Unreachable(String),

    /// The source was reached but could not provide data.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The source answered with data that could not be interpreted.
    #[error("malformed data: {0}")]
    Malformed(String),
}

/// Kind of a [`CollectionError`], used for counters and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum CollectionErrorKind {
    Timeout,
    Unreachable,
    Unavailable,
    Malformed,
}

impl CollectionError {
    pub fn kind(&self) -> CollectionErrorKind {
        match self {
            Self::Timeout(_) => CollectionErrorKind::Timeout,
            Self::Unreachable(_) => CollectionErrorKind::Unreachable,
            Self::Unavailable(_) => CollectionErrorKind::Unavailable,
            Self::Malformed(_) => CollectionErrorKind::Malformed,
        }
    }
}

/// Core collector trait for implementing data collectors.
///
/// A collector produces one [`MetricRecord`] per call. The owning pipeline
/// serializes calls (a collector never runs two cycles at once), so
/// implementations take `&mut self` and keep any running aggregates as plain
/// fields. Those aggregates are only ever exposed through the returned
/// record's payload.
///
/// # Timeouts
///
/// The pipeline bounds each call with its configured collect timeout and
/// reports [`CollectionError::Timeout`] when it elapses. I/O bound collectors
/// should still apply their own request timeout so they fail with a precise
/// error instead of being cancelled.
#[async_trait::async_trait]
pub trait Collector: Send + 'static {
    /// Unique name of this collector instance.
    fn name(&self) -> &str;

    /// Domain of the records produced.
    fn record_type(&self) -> RecordType;

    /// Perform one collection cycle.
    async fn collect(&mut self) -> Result<MetricRecord, CollectionError>;
}

#[async_trait::async_trait]
impl<C: Collector + ?Sized> Collector for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn record_type(&self) -> RecordType {
        (**self).record_type()
    }

    async fn collect(&mut self) -> Result<MetricRecord, CollectionError> {
        (**self).collect().await
    }
}
