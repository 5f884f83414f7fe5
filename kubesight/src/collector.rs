//! Wiring of discovery, scheduling and the export pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use kubesight_common::ExportedPoint;
use kubesight_discovery::{DiscoveryConfig, DiscoveryMetrics, Discoverer, Registry, StaticLister};
use kubesight_framework::{
    CollectorHealth, DataSink, MetricsSourceProvider, PIPELINE_QUEUE, Pipeline, ProcessorChain,
    ProviderHandler, Result, Scheduler, SinkManager, StaticTagsProcessor, scrape_provider,
};
use kubesight_prometheus::{MetricFilter, PrometheusProviderFactory, ScrapeTransport};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::config::KubesightConfig;

/// Everything the running collector shares between its tasks.
pub struct Collector {
    pub health: Arc<CollectorHealth>,
    pub discovery_metrics: Arc<DiscoveryMetrics>,
    pub scheduler: Arc<Scheduler>,
    pub registry: Arc<Registry>,
    pub discoverer: Arc<Discoverer>,
    pub lister: Arc<StaticLister>,
    pipeline: Option<Pipeline>,
}

impl Collector {
    /// Build the collector. Must run inside a tokio runtime.
    pub fn new(
        config: &KubesightConfig,
        transport: Arc<dyn ScrapeTransport>,
        sinks: Vec<Arc<dyn DataSink>>,
    ) -> Result<Self> {
        let health = Arc::new(CollectorHealth::new());
        let discovery_metrics = Arc::new(DiscoveryMetrics::new());

        let (tx, rx) = mpsc::channel(PIPELINE_QUEUE);
        let scheduler = Arc::new(Scheduler::new(tx, health.clone())?);

        let factory = Arc::new(provider_factory(config, transport)?);
        let registry = Arc::new(Registry::new(factory, scheduler.clone()));
        let lister = Arc::new(StaticLister::new(config.static_resources.clone()));
        let discoverer = Arc::new(Discoverer::new(
            registry.clone(),
            lister.clone(),
            discovery_metrics.clone(),
        ));

        let pipeline = Pipeline::new(
            rx,
            processors(config),
            SinkManager::new(sinks, health.clone()),
            health.clone(),
        );

        Ok(Self {
            health,
            discovery_metrics,
            scheduler,
            registry,
            discoverer,
            lister,
            pipeline: Some(pipeline),
        })
    }

    /// The pipeline, to be spawned once.
    pub fn take_pipeline(&mut self) -> Option<Pipeline> {
        self.pipeline.take()
    }
}

/// Prometheus factory with the configured filters and default tags.
pub fn provider_factory(
    config: &KubesightConfig,
    transport: Arc<dyn ScrapeTransport>,
) -> Result<PrometheusProviderFactory> {
    let mut factory =
        PrometheusProviderFactory::new(transport).with_default_tags(config.tags.clone());
    if !config.filters.is_empty() {
        factory = factory.with_predicate(MetricFilter::new(&config.filters)?.into_predicate());
    }
    Ok(factory)
}

fn processors(config: &KubesightConfig) -> ProcessorChain {
    let mut chain = ProcessorChain::new();
    if let Some(cluster) = config.cluster_name.as_ref().filter(|c| !c.is_empty()) {
        let tags = HashMap::from([("cluster".to_string(), cluster.clone())]);
        chain = chain.with(Arc::new(StaticTagsProcessor::new(tags)));
    }
    chain
}

/// Re-run every discovery rule each `interval` until shutdown. The first pass
/// runs immediately.
pub async fn run_discovery(
    discoverer: Arc<Discoverer>,
    config: DiscoveryConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let summary = discoverer.process(&config).await;
                tracing::info!(
                    rules = summary.rules,
                    skipped = summary.skipped_rules,
                    resources = summary.resources,
                    registered = summary.registered,
                    failures = summary.failures,
                    registrations = discoverer.registry().len(),
                    "Discovery pass complete"
                );
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Discovery loop stopped");
}

/// Collects providers instead of scheduling them.
#[derive(Default)]
struct ProviderList {
    providers: Mutex<Vec<Arc<dyn MetricsSourceProvider>>>,
}

impl ProviderHandler for ProviderList {
    fn add_provider(&self, provider: Arc<dyn MetricsSourceProvider>) {
        let mut providers = self.providers.lock();
        providers.retain(|p| p.name() != provider.name());
        providers.push(provider);
    }

    fn delete_provider(&self, name: &str) {
        self.providers.lock().retain(|p| p.name() != name);
    }
}

/// One discovery pass and one scrape of everything it found, without
/// scheduling or sinks. Static tags are applied as the pipeline would.
pub async fn collect_once(
    config: &KubesightConfig,
    transport: Arc<dyn ScrapeTransport>,
) -> Result<Vec<ExportedPoint>> {
    let health = CollectorHealth::new();
    let handler = Arc::new(ProviderList::default());
    let registry = Arc::new(Registry::new(
        Arc::new(provider_factory(config, transport)?),
        handler.clone(),
    ));
    let discoverer = Discoverer::new(
        registry,
        Arc::new(StaticLister::new(config.static_resources.clone())),
        Arc::new(DiscoveryMetrics::new()),
    );
    discoverer.process(&config.discovery).await;

    let providers = handler.providers.lock().clone();
    let chain = processors(config);

    let mut points = Vec::new();
    for provider in providers {
        let batch = scrape_provider(provider.as_ref(), &health).await;
        points.extend(chain.process(batch)?.exported_points());
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kubesight_discovery::{PrometheusRule, Resource, ResourceType};
    use std::time::Duration;
    use url::Url;

    struct FixedBody;

    #[async_trait]
    impl ScrapeTransport for FixedBody {
        async fn fetch(&self, _url: &Url, _timeout: Duration) -> kubesight_prometheus::Result<String> {
            Ok("# TYPE up gauge\nup 1\n# TYPE go_goroutines gauge\ngo_goroutines 12\n".to_string())
        }
    }

    fn config() -> KubesightConfig {
        let mut rule = PrometheusRule::new("web");
        rule.labels.insert("app".to_string(), "web".to_string());
        KubesightConfig {
            discovery: DiscoveryConfig {
                rules: vec![rule],
                ..Default::default()
            },
            static_resources: vec![
                Resource::new(ResourceType::Pod, "default", "web-0")
                    .with_ip("10.2.0.7")
                    .with_label("app", "web"),
                Resource::new(ResourceType::Pod, "default", "db-0")
                    .with_ip("10.2.0.8")
                    .with_label("app", "db"),
            ],
            cluster_name: Some("eu-1".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_collect_once() {
        let mut config = config();
        config.filters.metric_deny_list = vec!["go.*".to_string()];
        config.tags.insert("env".to_string(), "test".to_string());

        let points = collect_once(&config, Arc::new(FixedBody)).await.unwrap();

        assert_eq!(points.len(), 1);
        let point = &points[0];
        assert_eq!(point.metric, "up.gauge");
        assert_eq!(point.source, "web-0");
        assert_eq!(point.tags.get("cluster"), Some(&"eu-1".to_string()));
        assert_eq!(point.tags.get("env"), Some(&"test".to_string()));
        assert_eq!(point.tags.get("pod_name"), Some(&"web-0".to_string()));
    }

    #[tokio::test]
    async fn test_collector_wiring() {
        let mut collector = Collector::new(&config(), Arc::new(FixedBody), Vec::new()).unwrap();
        assert!(collector.take_pipeline().is_some());
        assert!(collector.take_pipeline().is_none());

        collector.discoverer.process(&config().discovery).await;
        assert_eq!(collector.registry.len(), 1);
        assert_eq!(collector.scheduler.len(), 1);
        assert_eq!(collector.discovery_metrics.rules_count(), 1);
    }

    #[tokio::test]
    async fn test_run_discovery_stops_on_shutdown() {
        let collector = Collector::new(&config(), Arc::new(FixedBody), Vec::new()).unwrap();
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(run_discovery(
            collector.discoverer.clone(),
            config().discovery,
            rx,
        ));

        tokio::time::timeout(Duration::from_secs(5), async {
            while collector.registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
