//! Application configuration structures.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::pipeline::PipelineSettings;
use crate::publisher::{DEFAULT_MAX_RECORD_BYTES, DEFAULT_PUBLISH_TIMEOUT};

use super::pipelines::PipelinesConfig;
use super::validation::{ConfigError, expand_env_vars, validate_http_url};

// =============================================================================
// Constants
// =============================================================================

/// Default target stream.
pub const DEFAULT_STREAM_ID: &str = "real-time-analytics-stream";

fn default_stream_id() -> String {
    DEFAULT_STREAM_ID.to_string()
}

fn default_sink_timeout() -> Duration {
    DEFAULT_PUBLISH_TIMEOUT
}

fn default_max_record_bytes() -> usize {
    DEFAULT_MAX_RECORD_BYTES
}

// =============================================================================
// Sink Configuration
// =============================================================================

/// Where records are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SinkKind {
    /// HTTP stream-ingestion endpoint.
    #[default]
    Http,
    /// Log records instead of sending them.
    Log,
}

/// Sink configuration shared by all pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,

    /// Ingestion endpoint; pipelines may override it.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token, supports `${VAR}` expansion. Empty means anonymous.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Per-call timeout (default: 5s).
    #[serde(default = "default_sink_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Largest accepted payload (default: 1 MiB).
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            endpoint: None,
            auth_token: None,
            timeout: DEFAULT_PUBLISH_TIMEOUT,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default target stream for every pipeline.
    #[serde(default = "default_stream_id")]
    pub stream_id: String,

    #[serde(default)]
    pub sink: SinkConfig,

    /// JSON-lines file receiving dead letters.
    #[serde(default)]
    pub dead_letter_path: Option<PathBuf>,

    #[serde(default)]
    pub pipelines: PipelinesConfig,

    /// Directory with additional pipeline definition files.
    #[serde(default)]
    pub pipeline_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            stream_id: default_stream_id(),
            sink: SinkConfig::default(),
            dead_letter_path: None,
            pipelines: PipelinesConfig::default(),
            pipeline_path: None,
        }
    }
}

impl AppConfig {
    /// Parse configuration from YAML text and expand environment references.
    ///
    /// Does not validate; call [`validate`](Self::validate) once overrides
    /// have been applied.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.expand_env();
        Ok(config)
    }

    /// Load and validate configuration from a YAML file.
    ///
    /// If `pipeline_path` is set, its YAML files are merged into `pipelines`.
    ///
    /// # Errors
    /// Returns `ConfigError` if a file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::load_unvalidated(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load without validating, so command line overrides can be applied
    /// first.
    pub fn load_unvalidated(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_yaml(&content)?;

        if let Some(dir) = &config.pipeline_path {
            let extra = PipelinesConfig::load_from_dir(dir)?;
            config.pipelines = std::mem::take(&mut config.pipelines).merge(extra);
        }
        Ok(config)
    }

    fn expand_env(&mut self) {
        if let Some(endpoint) = &mut self.sink.endpoint {
            *endpoint = expand_env_vars(endpoint);
        }
        if let Some(token) = &mut self.sink.auth_token {
            *token = expand_env_vars(token);
        }
    }

    /// Stream a pipeline publishes to.
    pub fn stream_id_for<'a>(&'a self, settings: &'a PipelineSettings) -> &'a str {
        settings.stream_id.as_deref().unwrap_or(&self.stream_id)
    }

    /// Sink endpoint a pipeline publishes to.
    pub fn endpoint_for<'a>(&'a self, settings: &'a PipelineSettings) -> Option<&'a str> {
        settings
            .sink_endpoint
            .as_deref()
            .or(self.sink.endpoint.as_deref())
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream_id.trim().is_empty() {
            return Err(ConfigError::invalid("stream_id cannot be empty"));
        }
        if self.sink.timeout.is_zero() {
            return Err(ConfigError::invalid("sink timeout must be positive"));
        }
        if self.sink.max_record_bytes == 0 {
            return Err(ConfigError::invalid("sink max_record_bytes must be positive"));
        }
        if let Some(endpoint) = &self.sink.endpoint {
            validate_http_url("sink endpoint", endpoint)?;
        }

        self.pipelines.validate()?;

        if self.sink.kind == SinkKind::Http {
            let missing = self
                .pipelines
                .settings()
                .filter(|s| s.enabled)
                .any(|s| self.endpoint_for(s).is_none());
            if missing {
                return Err(ConfigError::invalid(
                    "http sink requires 'sink.endpoint' or a per-pipeline 'sink_endpoint'",
                ));
            }
        }

        Ok(())
    }
}
