//! Configuration module for streamfeed.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Stream and sink settings (endpoint, credentials, timeout, size limit)
//! - Pipeline definitions grouped by collector type, each with its own
//!   schedule and delivery policy
//! - An optional directory of extra pipeline definition files

mod app;
mod pipelines;
mod validation;

pub use app::{AppConfig, DEFAULT_STREAM_ID, SinkConfig, SinkKind};
pub use pipelines::{PipelineEntry, PipelinesConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};
