use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::trace;

use crate::alerts::{AlertRule, default_rules};
use crate::sources::SourceKind;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub collection: CollectionConfig,

    /// Cache TTL per source kind in seconds; absent or 0 disables caching
    #[serde(default = "default_cache_ttls")]
    pub cache_ttl_secs: HashMap<SourceKind, u64>,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Consumer API (optional - disabled when absent)
    pub api: Option<ApiSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collection: CollectionConfig::default(),
            cache_ttl_secs: default_cache_ttls(),
            sources: SourcesConfig::default(),
            alerts: AlertsConfig::default(),
            api: None,
        }
    }
}

impl Config {
    pub fn cache_ttl(&self, kind: SourceKind) -> Option<Duration> {
        self.cache_ttl_secs
            .get(&kind)
            .copied()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.collection.tick_interval_secs == 0 {
            bail!("collection.tick_interval_secs must be at least 1");
        }
        if self.collection.per_source_timeout_ms == 0 {
            bail!("collection.per_source_timeout_ms must be at least 1");
        }
        if self.collection.max_concurrency == 0 {
            bail!("collection.max_concurrency must be at least 1");
        }
        if self.collection.subscriber_buffer == 0 {
            bail!("collection.subscriber_buffer must be at least 1");
        }

        let mut names = HashSet::new();
        for service in &self.sources.services {
            if !names.insert(service.name.as_str()) {
                bail!("duplicate service name '{}'", service.name);
            }
            if let ServiceProbe::Http {
                body_pattern: Some(pattern),
                ..
            } = &service.probe
            {
                regex::Regex::new(pattern)
                    .with_context(|| format!("invalid body_pattern for service '{}'", service.name))?;
            }
        }

        let mut rule_ids = HashSet::new();
        for rule in &self.alerts.rules {
            if !rule_ids.insert(rule.id.as_str()) {
                bail!("duplicate alert rule id '{}'", rule.id);
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    #[serde(default = "default_source_timeout")]
    pub per_source_timeout_ms: u64,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Committed states buffered per subscriber before the oldest are dropped
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Run the first cycle immediately instead of one tick after start
    #[serde(default = "default_true")]
    pub collect_on_start: bool,
}

impl CollectionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn per_source_timeout(&self) -> Duration {
        Duration::from_millis(self.per_source_timeout_ms)
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            per_source_timeout_ms: default_source_timeout(),
            max_concurrency: default_max_concurrency(),
            subscriber_buffer: default_subscriber_buffer(),
            collect_on_start: true,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_true")]
    pub system: bool,

    #[serde(default)]
    pub disk: DiskConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default = "default_true")]
    pub containers: bool,

    /// Binary used for every container runtime call
    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,

    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            system: true,
            disk: DiskConfig::default(),
            network: NetworkConfig::default(),
            containers: true,
            docker_binary: default_docker_binary(),
            services: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DiskConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_mount_point")]
    pub mount_point: String,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mount_point: default_mount_point(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkProbe {
    /// Host interface counters
    #[default]
    Host,

    /// Sum of container network counters reported by the runtime
    Containers,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub probe: NetworkProbe,

    #[serde(default = "default_max_capacity_mbps")]
    pub max_capacity_mbps: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probe: NetworkProbe::default(),
            max_capacity_mbps: default_max_capacity_mbps(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub probe: ServiceProbe,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServiceProbe {
    /// HTTP health endpoint
    Http {
        url: String,
        #[serde(default)]
        method: HttpMethod,
        expected_status: Option<Vec<u16>>,
        body_pattern: Option<String>,
    },

    /// Container state and healthcheck as reported by the runtime
    Container { container: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Head,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_rules")]
    pub rules: Vec<AlertRule>,

    /// Resolved alerts kept for display
    #[serde(default = "default_resolved_history")]
    pub max_resolved_history: usize,

    #[serde(default)]
    pub notify: Vec<NotificationTarget>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            max_resolved_history: default_resolved_history(),
            notify: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTarget {
    Discord(Discord),
    Webhook(Webhook),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

fn default_true() -> bool {
    true
}

fn default_tick_interval() -> u64 {
    5
}

fn default_source_timeout() -> u64 {
    3000
}

fn default_max_concurrency() -> usize {
    4
}

fn default_subscriber_buffer() -> usize {
    16
}

fn default_resolved_history() -> usize {
    50
}

fn default_cache_ttls() -> HashMap<SourceKind, u64> {
    HashMap::from([(SourceKind::Disk, 60)])
}

fn default_docker_binary() -> String {
    String::from("docker")
}

fn default_mount_point() -> String {
    String::from("/")
}

fn default_max_capacity_mbps() -> f64 {
    1000.0
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config file {path}"))?;
    let config: Config =
        serde_json::from_str(&file_content).context("Invalid configuration file provided!")?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
