//! Discovery driving the real scheduler and Prometheus provider factory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kubesight_discovery::{
    DiscoveryConfig, DiscoveryMetrics, Discoverer, PrometheusRule, Registry, Resource,
    ResourceEvent, ResourceType, StaticLister,
};
use kubesight_framework::{CollectorHealth, DataBatch, Scheduler};
use kubesight_prometheus::{PrometheusProviderFactory, ScrapeTransport};
use tokio::sync::mpsc;
use url::Url;

struct FixedBody;

#[async_trait]
impl ScrapeTransport for FixedBody {
    async fn fetch(&self, _url: &Url, _timeout: Duration) -> kubesight_prometheus::Result<String> {
        Ok("# TYPE http_requests gauge\nhttp_requests 5\n".to_string())
    }
}

fn web_pod() -> Resource {
    Resource::new(ResourceType::Pod, "default", "web-0")
        .with_ip("10.2.0.7")
        .with_label("app", "web")
}

async fn next_batch(rx: &mut mpsc::Receiver<DataBatch>) -> DataBatch {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no batch within 5s")
        .expect("pipeline closed")
}

#[tokio::test]
async fn test_rule_pass_schedules_scrapes() {
    let (tx, mut rx) = mpsc::channel(16);
    let health = Arc::new(CollectorHealth::new());
    let scheduler = Arc::new(Scheduler::new(tx, health.clone()).unwrap());

    let factory = Arc::new(PrometheusProviderFactory::new(Arc::new(FixedBody)));
    let registry = Arc::new(Registry::new(factory, scheduler.clone()));
    let lister = Arc::new(StaticLister::new(vec![web_pod()]));
    let discoverer = Discoverer::new(registry.clone(), lister, Arc::new(DiscoveryMetrics::new()));

    let mut rule = PrometheusRule::new("web");
    rule.labels.insert("app".to_string(), "web".to_string());
    rule.port = Some(9102);
    rule.prefix = Some("kube.".to_string());
    rule.include_labels = true;
    rule.collection_interval = Some("50ms".to_string());
    let config = DiscoveryConfig {
        rules: vec![rule],
        ..Default::default()
    };

    let summary = discoverer.process(&config).await;
    assert_eq!(summary.registered, 1);
    assert_eq!(scheduler.len(), 1);

    let batch = next_batch(&mut rx).await;
    let point = &batch.metric_points[0];
    assert_eq!(point.metric, "kube.http.requests.gauge");
    assert_eq!(point.source, "web-0");
    let tags = point.tags();
    assert_eq!(tags.get("pod_name").map(String::as_str), Some("web-0"));
    assert_eq!(tags.get("namespace").map(String::as_str), Some("default"));
    assert_eq!(tags.get("app").map(String::as_str), Some("web"));

    // Same state again: no rescheduling.
    let names = scheduler.provider_names();
    discoverer.process(&config).await;
    assert_eq!(scheduler.provider_names(), names);

    discoverer.handle_event(&ResourceEvent::Deleted(web_pod()));
    assert!(scheduler.is_empty());
    assert!(registry.is_empty());
    assert_eq!(health.snapshot().providers_active, 0);
}

#[tokio::test]
async fn test_ip_change_moves_provider() {
    let (tx, _rx) = mpsc::channel(16);
    let scheduler = Arc::new(Scheduler::new(tx, Arc::new(CollectorHealth::new())).unwrap());
    let factory = Arc::new(PrometheusProviderFactory::new(Arc::new(FixedBody)));
    let registry = Arc::new(Registry::new(factory, scheduler.clone()));
    let discoverer = Discoverer::new(
        registry,
        Arc::new(StaticLister::default()),
        Arc::new(DiscoveryMetrics::new()),
    );

    let pod = web_pod().with_annotation("prometheus.io/scrape", "true");
    discoverer.handle_event(&ResourceEvent::Added(pod.clone()));
    assert_eq!(scheduler.len(), 1);
    assert!(scheduler.provider_names()[0].contains("10.2.0.7"));

    discoverer.handle_event(&ResourceEvent::Updated(pod.with_ip("10.2.0.8")));
    let names = scheduler.provider_names();
    assert_eq!(names.len(), 1);
    assert!(names[0].contains("10.2.0.8"));
}
