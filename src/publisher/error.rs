//! Publisher error types.

use strum_macros::{AsRefStr, Display};
use thiserror::Error;

/// Failure of a single delivery attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    /// The sink asked us to slow down.
    #[error("throttled: {0}")]
    Throttled(String),

    /// Credentials were missing or refused.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The sink could not be reached or failed internally (includes timeouts).
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// The record can never be accepted (too large, rejected payload).
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Kind of a [`PublishError`], used for counters and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PublishErrorKind {
    Throttled,
    Unauthorized,
    Unavailable,
    InvalidRecord,
}

impl PublishError {
    pub fn kind(&self) -> PublishErrorKind {
        match self {
            Self::Throttled(_) => PublishErrorKind::Throttled,
            Self::Unauthorized(_) => PublishErrorKind::Unauthorized,
            Self::Unavailable(_) => PublishErrorKind::Unavailable,
            Self::InvalidRecord(_) => PublishErrorKind::InvalidRecord,
        }
    }

    /// Whether another attempt may succeed.
    ///
    /// `Throttled` and `Unavailable` are transient. Retrying `Unauthorized` or
    /// `InvalidRecord` would only burn quota.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Unavailable(_))
    }
}

/// Errors raised while constructing a sink client at startup.
#[derive(Debug, Error)]
pub enum SinkSetupError {
    /// Endpoint is not a valid URL.
    #[error("invalid sink endpoint '{endpoint}': {source}")]
    Endpoint {
        endpoint: String,
        source: url::ParseError,
    },

    /// Credentials cannot be used as a header value.
    #[error("invalid sink credentials: {0}")]
    Credentials(String),

    /// HTTP client construction failed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
