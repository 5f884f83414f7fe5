//! Prometheus scrape source, its provider and the factory building both from
//! a provider URI.
//!
//! A provider URI is the scrape URL plus options in the query string:
//!
//! ```text
//! http://10.2.0.7:9102/metrics?source=web-0&prefix=kube.&tag=namespace:default&collectionInterval=30s
//! ```
//!
//! The options are stripped before the target is scraped; any other query
//! parameter is passed through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use kubesight_common::{DataBatch, current_timestamp_secs};
use kubesight_framework::{
    CollectorError, MetricsSource, MetricsSourceProvider, ProviderFactory, ProviderTiming,
    query_value,
};
use url::Url;

use crate::error::{PrometheusError, Result};
use crate::parser;
use crate::point_builder::{MetricPredicate, PointBuilder};

/// Query parameters that configure the provider rather than the target.
pub const RESERVED_PARAMS: &[&str] = &[
    "source",
    "prefix",
    "tag",
    "omitBucketSuffix",
    "collectionInterval",
    "timeOut",
];

/// Fetches an exposition body.
#[async_trait]
pub trait ScrapeTransport: Send + Sync {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<String>;
}

/// [`ScrapeTransport`] over HTTP(S).
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ScrapeTransport for HttpTransport {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/plain;version=0.0.4")
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PrometheusError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

/// One scrape target.
pub struct PrometheusSource {
    name: String,
    url: Url,
    timeout: Duration,
    builder: PointBuilder,
    transport: Arc<dyn ScrapeTransport>,
}

impl PrometheusSource {
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn scrape(&self) -> Result<DataBatch> {
        let body = self.transport.fetch(&self.url, self.timeout).await?;
        let exposition = parser::parse(&body)?;
        let mut translation = self.builder.build(&exposition.families, current_timestamp_secs());
        translation.stats.malformed += exposition.malformed;

        tracing::debug!(
            source = %self.name,
            families = translation.stats.families,
            points = translation.stats.points,
            filtered = translation.stats.filtered,
            malformed = translation.stats.malformed,
            "Scraped target"
        );

        Ok(DataBatch::from_points(Utc::now(), translation.points))
    }
}

#[async_trait]
impl MetricsSource for PrometheusSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scrape_metrics(&self) -> kubesight_framework::Result<DataBatch> {
        self.scrape()
            .await
            .map_err(|e| CollectorError::scrape(&self.name, e.to_string()))
    }
}

/// Provider wrapping a single [`PrometheusSource`].
pub struct PrometheusProvider {
    name: String,
    source: Arc<PrometheusSource>,
    timing: ProviderTiming,
}

impl MetricsSourceProvider for PrometheusProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn sources(&self) -> Vec<Arc<dyn MetricsSource>> {
        vec![self.source.clone()]
    }

    fn collection_interval(&self) -> Duration {
        self.timing.collection_interval
    }

    fn timeout(&self) -> Duration {
        self.timing.timeout
    }
}

/// Builds [`PrometheusProvider`]s from provider URIs.
pub struct PrometheusProviderFactory {
    transport: Arc<dyn ScrapeTransport>,
    predicate: Option<Arc<MetricPredicate>>,
    default_tags: HashMap<String, String>,
}

impl PrometheusProviderFactory {
    pub fn new(transport: Arc<dyn ScrapeTransport>) -> Self {
        Self {
            transport,
            predicate: None,
            default_tags: HashMap::new(),
        }
    }

    /// Predicate applied to every translated point.
    pub fn with_predicate(mut self, predicate: Arc<MetricPredicate>) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Tags added to every point, below the URI tags and sample labels.
    pub fn with_default_tags(mut self, tags: HashMap<String, String>) -> Self {
        self.default_tags = tags;
        self
    }

    fn build_provider(&self, uri: &Url) -> Result<PrometheusProvider> {
        if !matches!(uri.scheme(), "http" | "https") {
            return Err(PrometheusError::invalid_uri(format!(
                "unsupported scheme '{}' in {}",
                uri.scheme(),
                uri
            )));
        }
        let host = uri
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| PrometheusError::invalid_uri(format!("missing host in {}", uri)))?;

        let source = query_value(uri, "source")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| host.to_string());
        let prefix = query_value(uri, "prefix").unwrap_or_default();
        let omit_bucket_suffix = query_value(uri, "omitBucketSuffix")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let mut tags = self.default_tags.clone();
        tags.extend(parse_tags(uri));

        let mut builder =
            PointBuilder::new(source, prefix, tags).with_omit_bucket_suffix(omit_bucket_suffix);
        if let Some(predicate) = &self.predicate {
            builder = builder.with_predicate(predicate.clone());
        }

        let timing = ProviderTiming::from_uri(uri);
        let url = scrape_url(uri);
        let name = format!("prometheus_provider: {} {}", builder.source(), url);

        let source = Arc::new(PrometheusSource {
            name: format!("prometheus_source: {} {}", builder.source(), url),
            url: url.clone(),
            timeout: timing.timeout,
            builder,
            transport: self.transport.clone(),
        });

        Ok(PrometheusProvider {
            name,
            source,
            timing,
        })
    }
}

impl ProviderFactory for PrometheusProviderFactory {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn build(&self, uri: &Url) -> kubesight_framework::Result<Arc<dyn MetricsSourceProvider>> {
        let provider = self.build_provider(uri)?;
        tracing::debug!(provider = %provider.name, "Built provider");
        Ok(Arc::new(provider))
    }
}

/// `tag=key:value` parameters. Values may contain further colons.
fn parse_tags(uri: &Url) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    for (k, v) in uri.query_pairs() {
        if k != "tag" {
            continue;
        }
        match v.split_once(':') {
            Some((key, value)) if !key.is_empty() && !value.is_empty() => {
                tags.insert(key.to_string(), value.to_string());
            }
            _ => tracing::warn!(tag = %v, "Ignoring malformed tag parameter"),
        }
    }
    tags
}

/// The URI with the provider options removed.
pub fn scrape_url(uri: &Url) -> Url {
    let kept: Vec<(String, String)> = uri
        .query_pairs()
        .filter(|(k, _)| !RESERVED_PARAMS.contains(&&**k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = uri.clone();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url
}
