//! Web application health probe collector.
//!
//! Issues an HTTP GET against the target and reports status, latency and body
//! size together with rolling response-time statistics.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::timeout;

use crate::collector::{CollectionError, Collector};
use crate::config::expand_env_vars;
use crate::record::{MetricRecord, MonotonicClock, RecordType};

/// Default request timeout (5 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of response times kept for trend statistics.
pub const RESPONSE_WINDOW_SIZE: usize = 100;

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Configuration for the web application health probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpHealthConfig {
    /// Unique name for this probe instance.
    pub name: String,
    /// Target URL (HTTP or HTTPS).
    pub url: String,
    /// Partition key for produced records (default: the probe name).
    #[serde(default)]
    pub partition_key: Option<String>,
    /// Request timeout (default: 5s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Request headers with environment variable substitution support.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl HttpHealthConfig {
    /// Create a new probe configuration.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            partition_key: None,
            timeout: DEFAULT_TIMEOUT,
            headers: BTreeMap::new(),
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the partition key.
    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    /// Add a single request header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Partition key, falling back to the probe name.
    pub fn partition_key(&self) -> &str {
        self.partition_key.as_deref().unwrap_or(&self.name)
    }
}

/// Rolling response-time history and request/error totals.
///
/// Owned by a single collector instance.
#[derive(Debug, Default, Clone)]
pub struct ResponseWindow {
    samples: VecDeque<f64>,
    total_requests: u64,
    total_errors: u64,
}

impl ResponseWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a probe that produced a response with the given latency.
    pub fn record_response(&mut self, response_time_ms: f64, is_error: bool) {
        self.total_requests += 1;
        if is_error {
            self.total_errors += 1;
        }
        if response_time_ms > 0.0 {
            if self.samples.len() == RESPONSE_WINDOW_SIZE {
                self.samples.pop_front();
            }
            self.samples.push_back(response_time_ms);
        }
    }

    /// Count a probe that failed before a response arrived.
    pub fn record_failure(&mut self) {
        self.total_requests += 1;
        self.total_errors += 1;
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn min(&self) -> f64 {
        self.samples.iter().copied().reduce(f64::min).unwrap_or(0.0)
    }

    pub fn max(&self) -> f64 {
        self.samples.iter().copied().reduce(f64::max).unwrap_or(0.0)
    }

    pub fn error_rate_percent(&self) -> f64 {
        round2(self.total_errors as f64 / self.total_requests.max(1) as f64 * 100.0)
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Web application health probe collector.
pub struct HttpHealthCollector {
    config: HttpHealthConfig,
    client: Client,
    window: ResponseWindow,
    clock: MonotonicClock,
}

impl HttpHealthCollector {
    /// Create a new probe.
    ///
    /// # Errors
    /// Returns `CollectionError::Unavailable` if the HTTP client cannot be built.
    pub fn new(config: HttpHealthConfig) -> Result<Self, CollectionError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                CollectionError::Unavailable(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            config,
            client,
            window: ResponseWindow::new(),
            clock: MonotonicClock::new(),
        })
    }

    pub fn config(&self) -> &HttpHealthConfig {
        &self.config
    }

    pub fn window(&self) -> &ResponseWindow {
        &self.window
    }

    fn classify_send_error(&self, err: reqwest::Error) -> CollectionError {
        if err.is_timeout() {
            CollectionError::Timeout(self.config.timeout)
        } else {
            CollectionError::Unreachable(err.to_string())
        }
    }
}

impl std::fmt::Debug for HttpHealthCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpHealthCollector")
            .field("config", &self.config)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Collector for HttpHealthCollector {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn record_type(&self) -> RecordType {
        RecordType::WebappHealth
    }

    async fn collect(&mut self) -> Result<MetricRecord, CollectionError> {
        let probe_timeout = self.config.timeout;

        let mut request = self.client.get(&self.config.url);
        for (key, value) in &self.config.headers {
            request = request.header(key.as_str(), expand_env_vars(value));
        }

        let start = Instant::now();
        let response = match timeout(probe_timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.window.record_failure();
                tracing::warn!(
                    name = %self.config.name,
                    url = %self.config.url,
                    error = %e,
                    "HTTP probe failed"
                );
                return Err(self.classify_send_error(e));
            }
            Err(_) => {
                self.window.record_failure();
                tracing::warn!(
                    name = %self.config.name,
                    url = %self.config.url,
                    timeout_ms = probe_timeout.as_millis(),
                    "HTTP probe timed out"
                );
                return Err(CollectionError::Timeout(probe_timeout));
            }
        };

        let status = response.status();
        let remaining = probe_timeout.saturating_sub(start.elapsed());
        let body = match timeout(remaining, response.bytes()).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                self.window.record_failure();
                return Err(CollectionError::Malformed(format!(
                    "failed to read response body: {}",
                    e
                )));
            }
            Err(_) => {
                self.window.record_failure();
                return Err(CollectionError::Timeout(probe_timeout));
            }
        };
        let response_time_ms = round2(start.elapsed().as_secs_f64() * 1000.0);

        let degraded = status.is_server_error();
        self.window.record_response(response_time_ms, degraded);

        tracing::debug!(
            name = %self.config.name,
            url = %self.config.url,
            latency_ms = response_time_ms,
            status = status.as_u16(),
            "HTTP probe completed"
        );

        let record = MetricRecord::new(
            self.config.partition_key(),
            RecordType::WebappHealth,
            self.clock.now_ms(),
        )
        .with_field("source", json!(self.config.url))
        .with_field(
            "health",
            json!({
                "status": if degraded { "degraded" } else { "online" },
                "status_code": status.as_u16(),
                "response_time_ms": response_time_ms,
                "content_length": body.len(),
            }),
        )
        .with_field(
            "performance",
            json!({
                "current_response_time_ms": response_time_ms,
                "avg_response_time_ms": round2(self.window.average()),
                "min_response_time_ms": round2(self.window.min()),
                "max_response_time_ms": round2(self.window.max()),
                "total_requests": self.window.total_requests(),
                "total_errors": self.window.total_errors(),
                "error_rate_percent": self.window.error_rate_percent(),
            }),
        );

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectionErrorKind;

    #[test]
    fn test_http_health_config_defaults() {
        let config = HttpHealthConfig::new("webapp", "http://localhost:8000");

        assert_eq!(config.name, "webapp");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.partition_key(), "webapp");
        assert!(config.headers.is_empty());
    }

    #[test]
    fn test_http_health_config_builder() {
        let config = HttpHealthConfig::new("webapp", "http://localhost:8000")
            .with_timeout(Duration::from_secs(2))
            .with_partition_key("webapp-metrics")
            .with_header("Authorization", "Bearer ${TOKEN:-none}");

        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.partition_key(), "webapp-metrics");
        assert_eq!(config.headers.len(), 1);
    }

    #[test]
    fn test_http_health_config_from_yaml() {
        let yaml = "name: site\nurl: http://example.com\ntimeout: 750ms\n";
        let config: HttpHealthConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.timeout, Duration::from_millis(750));
        assert_eq!(config.partition_key, None);
    }

    #[test]
    fn test_response_window_statistics() {
        let mut window = ResponseWindow::new();
        window.record_response(10.0, false);
        window.record_response(30.0, false);
        window.record_failure();

        assert_eq!(window.total_requests(), 3);
        assert_eq!(window.total_errors(), 1);
        assert_eq!(window.average(), 20.0);
        assert_eq!(window.min(), 10.0);
        assert_eq!(window.max(), 30.0);
        assert_eq!(window.error_rate_percent(), 33.33);
    }

    #[test]
    fn test_response_window_is_bounded() {
        let mut window = ResponseWindow::new();
        for i in 0..(RESPONSE_WINDOW_SIZE + 10) {
            window.record_response((i + 1) as f64, false);
        }
        assert_eq!(window.min(), 11.0);
        assert_eq!(window.total_requests(), (RESPONSE_WINDOW_SIZE + 10) as u64);
    }

    #[test]
    fn test_response_window_empty() {
        let window = ResponseWindow::new();
        assert_eq!(window.average(), 0.0);
        assert_eq!(window.max(), 0.0);
        assert_eq!(window.error_rate_percent(), 0.0);
    }

    #[tokio::test]
    async fn test_http_collector_connection_refused() {
        // Grab a free port, then close it so the connect is refused.
        let addr = {
            let listener = match std::net::TcpListener::bind("127.0.0.1:0") {
                Ok(l) => l,
                Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => return,
                Err(e) => panic!("Failed to bind test listener: {e}"),
            };
            listener.local_addr().unwrap()
        };

        let config = HttpHealthConfig::new("refused", format!("http://{}", addr))
            .with_timeout(Duration::from_millis(500));
        let mut collector = HttpHealthCollector::new(config).unwrap();

        let err = collector.collect().await.unwrap_err();
        assert!(matches!(
            err.kind(),
            CollectionErrorKind::Unreachable | CollectionErrorKind::Timeout
        ));
        assert_eq!(collector.window().total_errors(), 1);
    }
}
