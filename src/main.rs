//! streamfeed Binary Entry Point
//!
//! Loads the configuration, starts one pipeline per enabled entry and drains
//! them on Ctrl+C / SIGTERM. Core functionality is provided by the
//! `streamfeed` library crate.

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use streamfeed::{
    buffer::DeadLetterLog,
    collector::{
        Collector,
        app_event::AppEventCollector,
        http::HttpHealthCollector,
        vm::VmStatsCollector,
    },
    config::{AppConfig, ConfigError, SinkConfig, SinkKind, parse_duration},
    pipeline::{Pipeline, PipelineSettings, Supervisor, SupervisorReport},
    publisher::{HttpSink, LogSink, Publisher, Sink},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code for fatal startup errors.
const EXIT_STARTUP_FAILURE: u8 = 1;

/// streamfeed - Periodic Metrics Collection and Publish Pipeline
#[derive(Parser, Debug)]
#[command(name = "streamfeed", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "STREAMFEED_CONFIG"
    )]
    config: String,

    /// Target stream (overrides config file)
    #[arg(long, env = "STREAMFEED_STREAM_ID")]
    stream_id: Option<String>,

    /// Sink endpoint (overrides config file)
    #[arg(long, env = "STREAMFEED_SINK_ENDPOINT")]
    sink_endpoint: Option<String>,

    /// Drain timeout for every pipeline, e.g. "10s" (overrides config file)
    #[arg(long, value_parser = parse_duration, env = "STREAMFEED_DRAIN_TIMEOUT")]
    drain_timeout: Option<Duration>,

    /// Log records instead of sending them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,streamfeed=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("streamfeed - Periodic Metrics Collection and Publish Pipeline");

    let cli = Cli::parse();
    match run(cli).await {
        Ok(report) => {
            let code = report.exit_code();
            tracing::info!(exit_code = code, "Shutdown complete");
            ExitCode::from(code)
        }
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            ExitCode::from(EXIT_STARTUP_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> Result<SupervisorReport, Box<dyn std::error::Error>> {
    tracing::info!(path = %cli.config, "Loading configuration");
    let mut config = AppConfig::load_unvalidated(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(stream_id) = cli.stream_id {
        config.stream_id = stream_id;
    }
    if let Some(endpoint) = cli.sink_endpoint {
        config.sink.endpoint = Some(endpoint);
    }
    if let Some(timeout) = cli.drain_timeout {
        config.pipelines.set_drain_timeout(timeout);
    }
    if cli.dry_run {
        config.sink.kind = SinkKind::Log;
    }
    config.validate()?;

    tracing::info!(
        stream_id = %config.stream_id,
        sink = %config.sink.kind,
        endpoint = config.sink.endpoint.as_deref().unwrap_or("-"),
        pipelines = config.pipelines.len(),
        enabled = config.pipelines.enabled_count(),
        "Configuration loaded"
    );

    // Every sink and dead-letter file is set up before the first pipeline runs.
    let pipelines = build_pipelines(&config)?;

    let mut supervisor = Supervisor::new();
    for pipeline in pipelines {
        supervisor.spawn(pipeline);
    }

    if supervisor.is_empty() {
        tracing::warn!("No enabled pipelines; waiting for shutdown");
    }
    tracing::info!("Press Ctrl+C to shutdown");

    Ok(supervisor.run_until(shutdown_signal()).await)
}

/// Build one pipeline per enabled entry without starting any of them.
fn build_pipelines(
    config: &AppConfig,
) -> Result<Vec<Pipeline<Box<dyn Collector>>>, Box<dyn std::error::Error>> {
    let mut collectors: Vec<(Box<dyn Collector>, &PipelineSettings)> = Vec::new();
    for entry in &config.pipelines.vm {
        let collector = VmStatsCollector::new(entry.collector.clone());
        collectors.push((Box::new(collector), &entry.settings));
    }
    for entry in &config.pipelines.http {
        let collector = HttpHealthCollector::new(entry.collector.clone())?;
        collectors.push((Box::new(collector), &entry.settings));
    }
    for entry in &config.pipelines.app_event {
        let collector = AppEventCollector::new(entry.collector.clone());
        collectors.push((Box::new(collector), &entry.settings));
    }

    let mut sinks = SinkCache::new(&config.sink);
    let mut pipelines = Vec::new();
    for (collector, settings) in collectors {
        if !settings.enabled {
            tracing::debug!(pipeline = %collector.name(), "Skipping disabled pipeline");
            continue;
        }

        let sink = sinks.get(config.endpoint_for(settings))?;
        let publisher = Publisher::new(sink, config.stream_id_for(settings))
            .with_timeout(config.sink.timeout)
            .with_max_record_bytes(config.sink.max_record_bytes);

        let mut pipeline = Pipeline::new(collector, publisher, settings.clone());
        if let Some(path) = &config.dead_letter_path {
            let log = DeadLetterLog::new(pipeline.name()).with_file(path)?;
            pipeline = pipeline.with_dead_letter_log(log);
        }
        pipelines.push(pipeline);
    }
    Ok(pipelines)
}

/// Sinks shared by pipelines with the same endpoint.
struct SinkCache<'a> {
    config: &'a SinkConfig,
    http: HashMap<String, Arc<dyn Sink>>,
    log: Option<Arc<dyn Sink>>,
}

impl<'a> SinkCache<'a> {
    fn new(config: &'a SinkConfig) -> Self {
        Self {
            config,
            http: HashMap::new(),
            log: None,
        }
    }

    fn get(&mut self, endpoint: Option<&str>) -> Result<Arc<dyn Sink>, Box<dyn std::error::Error>> {
        if self.config.kind == SinkKind::Log {
            let sink = self
                .log
                .get_or_insert_with(|| Arc::new(LogSink::new()) as Arc<dyn Sink>);
            return Ok(sink.clone());
        }

        let endpoint = endpoint.ok_or_else(|| {
            ConfigError::ValidationError("pipeline has no sink endpoint".to_string())
        })?;
        if let Some(sink) = self.http.get(endpoint) {
            return Ok(sink.clone());
        }

        let sink: Arc<dyn Sink> = Arc::new(HttpSink::new(
            endpoint,
            self.config.auth_token.as_deref(),
            self.config.timeout,
        )?);
        tracing::info!(endpoint, "Sink client created");
        self.http.insert(endpoint.to_string(), sink.clone());
        Ok(sink)
    }
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_HOSTS: &str = r#"
pipelines:
  vm:
    - name: host-a
    - name: host-b
    - name: host-c
      enabled: false
"#;

    fn config(header: &str) -> AppConfig {
        let config = AppConfig::from_yaml(&format!("{header}{TWO_HOSTS}")).unwrap();
        config.validate().unwrap();
        config
    }

    #[test]
    fn test_build_pipelines_skips_disabled() {
        let pipelines = build_pipelines(&config("sink: { kind: log }\n")).unwrap();
        let names: Vec<_> = pipelines.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["host-a", "host-b"]);
    }

    #[test]
    fn test_build_pipelines_fails_on_unusable_dead_letter_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("dead.jsonl");
        let header = format!("sink: {{ kind: log }}\ndead_letter_path: {}\n", path.display());

        assert!(build_pipelines(&config(&header)).is_err());
    }

    #[test]
    fn test_build_pipelines_fails_on_bad_credentials() {
        let mut config = config("sink: { endpoint: \"http://127.0.0.1:4566/streams\" }\n");
        config.sink.auth_token = Some("line\nbreak".to_string());

        let err = build_pipelines(&config).err().unwrap();
        assert!(err.to_string().contains("credentials"));
    }
}
