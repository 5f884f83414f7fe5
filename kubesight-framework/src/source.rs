//! Source side of the pipeline: sources, providers and their factories.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kubesight_common::DataBatch;
use url::Url;

use crate::error::Result;

/// Collection interval used when a provider URI does not set one.
pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(10);

/// Scrape timeout used when a provider URI does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A place metrics are scraped from.
///
/// One call produces exactly one batch. Implementations may be invoked
/// repeatedly and must not carry state between calls that would bias later
/// results.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    fn name(&self) -> &str;

    async fn scrape_metrics(&self) -> Result<DataBatch>;
}

/// A configured group of sources scraped on a common schedule.
pub trait MetricsSourceProvider: Send + Sync {
    /// Unique name, used as the scheduling key.
    fn name(&self) -> &str;

    fn sources(&self) -> Vec<Arc<dyn MetricsSource>>;

    fn collection_interval(&self) -> Duration;

    fn timeout(&self) -> Duration;
}

/// Builds providers from a configuration URI.
pub trait ProviderFactory: Send + Sync {
    fn name(&self) -> &str;

    fn build(&self, uri: &Url) -> Result<Arc<dyn MetricsSourceProvider>>;
}

/// Accepts providers that appear and disappear at runtime.
pub trait ProviderHandler: Send + Sync {
    /// Start scheduling `provider`, replacing any provider with the same name.
    fn add_provider(&self, provider: Arc<dyn MetricsSourceProvider>);

    /// Stop scheduling the provider called `name`. Unknown names are ignored.
    fn delete_provider(&self, name: &str);
}

/// The two timing options every provider understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderTiming {
    pub collection_interval: Duration,
    pub timeout: Duration,
}

impl Default for ProviderTiming {
    fn default() -> Self {
        Self {
            collection_interval: DEFAULT_COLLECTION_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ProviderTiming {
    /// Read `collectionInterval` and `timeOut` from the URI query.
    ///
    /// Values use humantime syntax (`30s`, `1m`, `500ms`). A missing, zero or
    /// unparseable value falls back to the default; the latter two are logged.
    pub fn from_uri(uri: &Url) -> Self {
        Self {
            collection_interval: parse_duration(
                uri,
                "collectionInterval",
                DEFAULT_COLLECTION_INTERVAL,
            ),
            timeout: parse_duration(uri, "timeOut", DEFAULT_TIMEOUT),
        }
    }
}

/// First value of a query parameter, if present.
pub fn query_value(uri: &Url, key: &str) -> Option<String> {
    uri.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn parse_duration(uri: &Url, key: &str, default: Duration) -> Duration {
    let Some(raw) = query_value(uri, key) else {
        return default;
    };

    match humantime::parse_duration(&raw) {
        Ok(d) if !d.is_zero() => d,
        Ok(_) => {
            tracing::warn!(property = key, value = %raw, "Zero duration, using default");
            default
        }
        Err(e) => {
            tracing::error!(property = key, value = %raw, error = %e, "Error parsing duration, using default");
            default
        }
    }
}
