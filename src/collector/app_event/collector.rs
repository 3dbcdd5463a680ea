//! Synthetic application event collector.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::collector::{CollectionError, Collector};
use crate::record::{MetricRecord, MonotonicClock, RecordType};

/// Actions that reference a page.
const PAGE_ACTIONS: &[&str] = &["view_page", "click_button"];

fn default_partition_key() -> String {
    "app-events".to_string()
}

fn default_users() -> Vec<String> {
    ["alice", "bob", "charlie", "dave", "eve"].map(String::from).to_vec()
}

fn default_actions() -> Vec<String> {
    ["login", "view_page", "click_button", "logout", "purchase"]
        .map(String::from)
        .to_vec()
}

fn default_pages() -> Vec<String> {
    ["/home", "/dashboard", "/profile", "/settings", "/cart"]
        .map(String::from)
        .to_vec()
}

/// Configuration for the synthetic event generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppEventConfig {
    /// Unique name for this generator.
    pub name: String,
    /// Partition key for produced records (default: "app-events").
    #[serde(default = "default_partition_key")]
    pub partition_key: String,
    /// User names to pick from.
    #[serde(default = "default_users")]
    pub users: Vec<String>,
    /// Actions to pick from.
    #[serde(default = "default_actions")]
    pub actions: Vec<String>,
    /// Pages to pick from for page actions.
    #[serde(default = "default_pages")]
    pub pages: Vec<String>,
    /// Fixed RNG seed, for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl AppEventConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key: default_partition_key(),
            users: default_users(),
            actions: default_actions(),
            pages: default_pages(),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = key.into();
        self
    }
}

/// Synthetic application event collector.
///
/// Produces one random user action per cycle. Useful for demos and for
/// exercising a pipeline without external dependencies.
#[derive(Debug)]
pub struct AppEventCollector {
    config: AppEventConfig,
    rng: StdRng,
    clock: MonotonicClock,
}

impl AppEventCollector {
    pub fn new(config: AppEventConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng,
            clock: MonotonicClock::new(),
        }
    }
}

#[async_trait::async_trait]
impl Collector for AppEventCollector {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn record_type(&self) -> RecordType {
        RecordType::AppEvent
    }

    async fn collect(&mut self) -> Result<MetricRecord, CollectionError> {
        let (Some(user), Some(action)) = (
            self.config.users.choose(&mut self.rng).cloned(),
            self.config.actions.choose(&mut self.rng).cloned(),
        ) else {
            return Err(CollectionError::Unavailable(
                "users and actions must not be empty".to_string(),
            ));
        };

        let page = if PAGE_ACTIONS.contains(&action.as_str()) {
            self.config.pages.choose(&mut self.rng).cloned()
        } else {
            None
        };

        let event_id = format!("evt-{}", uuid::Uuid::new_v4().simple());
        let record = MetricRecord::new(
            &self.config.partition_key,
            RecordType::AppEvent,
            self.clock.now_ms(),
        )
        .with_event_id(event_id)
        .with_field("user", json!(user))
        .with_field("action", json!(action))
        .with_field("page", json!(page))
        .with_field("meta", json!({ "browser": "Chrome", "os": "Windows" }));

        Ok(record)
    }
}
