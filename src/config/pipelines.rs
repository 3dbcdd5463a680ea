//! Pipeline definitions.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::app_event::AppEventConfig;
use crate::collector::http::HttpHealthConfig;
use crate::collector::vm::VmStatsConfig;
use crate::pipeline::PipelineSettings;

use super::validation::{ConfigError, validate_http_url};

/// One pipeline: collector fields and pipeline settings side by side.
///
/// ```yaml
/// - name: web-health
///   url: https://example.com/health
///   interval: 10s
///   max_attempts: 3
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEntry<C> {
    #[serde(flatten)]
    pub collector: C,

    #[serde(flatten)]
    pub settings: PipelineSettings,
}

impl<C> PipelineEntry<C> {
    pub fn new(collector: C, settings: PipelineSettings) -> Self {
        Self {
            collector,
            settings,
        }
    }
}

/// Pipelines grouped by collector type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelinesConfig {
    /// Host statistics pipelines.
    #[serde(default)]
    pub vm: Vec<PipelineEntry<VmStatsConfig>>,

    /// Web application health pipelines.
    #[serde(default)]
    pub http: Vec<PipelineEntry<HttpHealthConfig>>,

    /// Synthetic application event pipelines.
    #[serde(default)]
    pub app_event: Vec<PipelineEntry<AppEventConfig>>,
}

impl PipelinesConfig {
    /// Append another set of pipelines.
    #[must_use]
    pub fn merge(mut self, other: PipelinesConfig) -> Self {
        self.vm.extend(other.vm);
        self.http.extend(other.http);
        self.app_event.extend(other.app_event);
        self
    }

    /// Settings of every pipeline, disabled ones included.
    pub fn settings(&self) -> impl Iterator<Item = &PipelineSettings> {
        self.vm
            .iter()
            .map(|e| &e.settings)
            .chain(self.http.iter().map(|e| &e.settings))
            .chain(self.app_event.iter().map(|e| &e.settings))
    }

    fn settings_mut(&mut self) -> impl Iterator<Item = &mut PipelineSettings> {
        self.vm
            .iter_mut()
            .map(|e| &mut e.settings)
            .chain(self.http.iter_mut().map(|e| &mut e.settings))
            .chain(self.app_event.iter_mut().map(|e| &mut e.settings))
    }

    pub fn len(&self) -> usize {
        self.vm.len() + self.http.len() + self.app_event.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn enabled_count(&self) -> usize {
        self.settings().filter(|s| s.enabled).count()
    }

    /// Override the drain timeout of every pipeline.
    pub fn set_drain_timeout(&mut self, timeout: Duration) {
        for settings in self.settings_mut() {
            settings.drain_timeout = timeout;
        }
    }

    /// Validate every pipeline.
    ///
    /// Names must be non-empty and unique across all types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for entry in &self.vm {
            check_entry(&mut seen, "vm", &entry.collector.name, &entry.settings)?;
        }

        for entry in &self.http {
            let name = &entry.collector.name;
            check_entry(&mut seen, "http", name, &entry.settings)?;
            validate_http_url(&format!("http pipeline '{}'", name), &entry.collector.url)?;
            if entry.collector.timeout.is_zero() {
                return Err(ConfigError::invalid(format!(
                    "http pipeline '{}': timeout must be positive",
                    name
                )));
            }
            // The collector's own timeout has to fire first so the failure is counted.
            if entry.settings.collect_timeout < entry.collector.timeout {
                return Err(ConfigError::invalid(format!(
                    "http pipeline '{}': collect_timeout ({}) is shorter than timeout ({})",
                    name,
                    humantime::format_duration(entry.settings.collect_timeout),
                    humantime::format_duration(entry.collector.timeout)
                )));
            }
        }

        for entry in &self.app_event {
            let name = &entry.collector.name;
            check_entry(&mut seen, "app_event", name, &entry.settings)?;
            if entry.collector.users.is_empty() || entry.collector.actions.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "app_event pipeline '{}': users and actions cannot be empty",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Load pipeline definitions from every YAML file in a directory.
    ///
    /// Each file has the shape of the `pipelines` section.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ConfigError::invalid(format!(
                "pipeline_path '{}' is not a directory",
                dir.display()
            )));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if path.is_file() && is_yaml {
                paths.push(path);
            }
        }
        // Deterministic merge order.
        paths.sort();

        let mut merged = Self::default();
        for path in paths {
            tracing::debug!(path = %path.display(), "Loading pipeline definitions");
            let content = std::fs::read_to_string(&path)?;
            let file: Self = serde_yaml::from_str(&content).map_err(|e| {
                ConfigError::invalid(format!("failed to parse '{}': {}", path.display(), e))
            })?;
            merged = merged.merge(file);
        }
        Ok(merged)
    }
}

fn check_entry<'a>(
    seen: &mut HashSet<&'a str>,
    kind: &str,
    name: &'a str,
    settings: &PipelineSettings,
) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::invalid(format!(
            "{} pipeline name cannot be empty",
            kind
        )));
    }
    if !seen.insert(name) {
        return Err(ConfigError::invalid(format!(
            "duplicate pipeline name: '{}'",
            name
        )));
    }
    if let Some(endpoint) = &settings.sink_endpoint {
        validate_http_url(&format!("{} pipeline '{}' sink_endpoint", kind, name), endpoint)?;
    }
    settings
        .validate()
        .map_err(|e| ConfigError::invalid(format!("{} pipeline '{}': {}", kind, name, e)))
}
