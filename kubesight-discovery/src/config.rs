//! Discovery rules.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, Result};
use crate::resource::ResourceType;

/// Discovery section of the collector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Rules, evaluated in order on every discovery pass.
    #[serde(default)]
    pub rules: Vec<PrometheusRule>,

    /// Seconds between discovery passes (default: 300).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_interval() -> u64 {
    300 // 5 minutes
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            interval_secs: default_interval(),
        }
    }
}

impl DiscoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Check every rule. Unknown resource types are not an error here; the
    /// discoverer skips them.
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(DiscoveryError::rule("*", "interval_secs must be positive"));
        }
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }
}

/// Selects resources and says how to scrape them.
///
/// Every optional field is a fallback used when the resource carries no
/// matching `prometheus.io/*` annotation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrometheusRule {
    pub name: String,

    /// `pod` or `service`.
    #[serde(default = "default_resource_type")]
    pub resource_type: String,

    /// Namespace to list in (empty = all namespaces).
    #[serde(default)]
    pub namespace: String,

    /// Label selector; every entry must match.
    #[serde(default)]
    pub labels: HashMap<String, String>,

    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub source: Option<String>,

    /// Copy the resource labels onto every point.
    #[serde(default)]
    pub include_labels: bool,

    /// Scrape interval in humantime syntax, e.g. `30s`.
    #[serde(default)]
    pub collection_interval: Option<String>,

    /// Scrape timeout in humantime syntax.
    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default)]
    pub omit_bucket_suffix: bool,
}

fn default_resource_type() -> String {
    "pod".to_string()
}

impl PrometheusRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: default_resource_type(),
            ..Default::default()
        }
    }

    /// Resource type the rule lists. A blank type means pods.
    pub fn kind(&self) -> std::result::Result<ResourceType, String> {
        let raw = self.resource_type.trim();
        if raw.is_empty() {
            return Ok(ResourceType::Pod);
        }
        raw.parse()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(DiscoveryError::rule("", "rule name must not be empty"));
        }
        if let Some(scheme) = &self.scheme {
            if !matches!(scheme.as_str(), "http" | "https") {
                return Err(DiscoveryError::rule(
                    &self.name,
                    format!("unsupported scheme '{}'", scheme),
                ));
            }
        }
        for (field, value) in [
            ("collection_interval", &self.collection_interval),
            ("timeout", &self.timeout),
        ] {
            if let Some(raw) = value {
                humantime::parse_duration(raw).map_err(|e| {
                    DiscoveryError::rule(&self.name, format!("invalid {} '{}': {}", field, raw, e))
                })?;
            }
        }
        Ok(())
    }
}
