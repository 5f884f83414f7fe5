//! Configuration for the collector binary.

use std::collections::HashMap;

use kubesight_common::{Format, KEY_PREFIX, LoggingConfig, ZenohConfig};
use kubesight_discovery::{DiscoveryConfig, Resource};
use kubesight_framework::{CollectorConfig, CollectorError, Result};
use kubesight_prometheus::{FilterConfig, MetricFilter};
use serde::{Deserialize, Serialize};

/// Complete collector configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KubesightConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Zenoh connection settings.
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Zenoh sink settings.
    #[serde(default)]
    pub sink: SinkConfig,

    /// Discovery rules and pass interval.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Self-telemetry HTTP endpoint.
    #[serde(default)]
    pub http: HttpConfig,

    /// Resources served by the built-in lister when running outside a
    /// cluster.
    #[serde(default)]
    pub static_resources: Vec<Resource>,

    /// Metric filters applied to every translated point.
    #[serde(default)]
    pub filters: FilterConfig,

    /// Tags added to every translated point. Sample labels and resource tags
    /// take precedence.
    #[serde(default)]
    pub tags: HashMap<String, String>,

    /// Added as a `cluster` tag to every exported point.
    #[serde(default)]
    pub cluster_name: Option<String>,
}

/// Zenoh sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Publish points over Zenoh (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Payload encoding (default: json).
    #[serde(default)]
    pub format: Format,

    /// Key expression prefix (default: "kubesight").
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_true() -> bool {
    true
}

fn default_key_prefix() -> String {
    KEY_PREFIX.to_string()
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: Format::default(),
            key_prefix: default_key_prefix(),
        }
    }
}

/// Self-telemetry HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Serve `/metrics`, `/health` and `/ready` (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to listen on (default: "0.0.0.0:9102").
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "0.0.0.0:9102".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_listen(),
        }
    }
}

impl CollectorConfig for KubesightConfig {
    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<()> {
        self.discovery.validate()?;

        MetricFilter::new(&self.filters)?;

        if self.http.enabled && self.http.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(CollectorError::validation(format!(
                "Invalid listen address: {}",
                self.http.listen
            )));
        }

        if self.sink.enabled {
            self.zenoh
                .validate()
                .map_err(|e| CollectorError::validation(e.to_string()))?;
            if self.sink.key_prefix.trim_matches('/').is_empty() {
                return Err(CollectorError::validation("sink.key_prefix must not be empty"));
            }
        }

        if let Some(resource) = self.static_resources.iter().find(|r| r.name.is_empty()) {
            return Err(CollectorError::validation(format!(
                "static resource in namespace '{}' has no name",
                resource.namespace
            )));
        }

        Ok(())
    }
}
