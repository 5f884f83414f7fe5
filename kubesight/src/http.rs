//! HTTP server for the collector's own telemetry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use kubesight_common::{CollectorStatus, HealthSnapshot};
use kubesight_discovery::{DiscoveryMetrics, DiscoverySnapshot, Registry as ProviderRegistry};
use kubesight_framework::{CollectorHealth, SourceLiveness, SourceStatus};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use serde::Serialize;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub health: Arc<CollectorHealth>,
    pub discovery: Arc<DiscoveryMetrics>,
    pub registry: Arc<ProviderRegistry>,
}

/// Body of `/health`.
#[derive(Debug, Serialize)]
struct HealthReport {
    #[serde(flatten)]
    collector: HealthSnapshot,
    registrations: usize,
    discovery: DiscoverySnapshot,
    sources: Vec<SourceLiveness>,
}

/// Create the HTTP router.
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the /metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match encode_metrics(&state) {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", OPENMETRICS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handler for the /health endpoint.
async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        collector: state.health.snapshot(),
        registrations: state.registry.len(),
        discovery: state.discovery.snapshot(),
        sources: state.health.all_source_liveness(),
    })
}

/// Handler for the /ready endpoint.
async fn ready_handler(State(state): State<AppState>) -> Response {
    // Ready once discovery has looked at the configuration at least once.
    if state.discovery.snapshot().passes > 0 {
        (StatusCode::OK, "ready\n").into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready - discovery has not run yet\n",
        )
            .into_response()
    }
}

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct SourceLabels {
    source: String,
}

fn gauge(registry: &mut Registry, name: &str, help: &str, value: i64) {
    let metric = Gauge::<i64, AtomicI64>::default();
    metric.set(value);
    registry.register(name, help, metric);
}

fn counter(registry: &mut Registry, name: &str, help: &str, value: u64) {
    let metric = Counter::<u64, AtomicU64>::default();
    metric.inc_by(value);
    registry.register(name, help, metric);
}

/// Snapshot the collector and discovery counters into a fresh registry and
/// encode it in the OpenMetrics text format.
fn encode_metrics(state: &AppState) -> Result<String, std::fmt::Error> {
    let health = state.health.snapshot();
    let discovery = state.discovery.snapshot();
    let mut registry = Registry::with_prefix("kubesight");

    let healthy = matches!(health.status, CollectorStatus::Healthy) as i64;
    gauge(&mut registry, "up", "1 if every source scrapes cleanly", healthy);
    gauge(&mut registry, "uptime_seconds", "Seconds since start", health.uptime_secs as i64);
    gauge(&mut registry, "providers_active", "Scheduled providers", health.providers_active as i64);
    counter(&mut registry, "scrapes", "Source scrapes attempted", health.scrapes_total);
    counter(&mut registry, "scrape_failures", "Source scrapes that failed", health.scrape_failures);
    counter(&mut registry, "points_collected", "Points produced by scrapes", health.points_collected);
    counter(&mut registry, "batches_exported", "Batches handed to sinks", health.batches_exported);
    counter(&mut registry, "batches_dropped", "Batches skipped by a busy sink", health.batches_dropped);
    counter(&mut registry, "export_failures", "Failed exports", health.export_failures);

    {
        let discovery_registry = registry.sub_registry_with_prefix("discovery");
        gauge(
            discovery_registry,
            "prometheus_rules_count",
            "Rules in the last discovery configuration",
            discovery.rules_count,
        );
        gauge(
            discovery_registry,
            "registrations",
            "Resources with a registered provider",
            state.registry.len() as i64,
        );
        counter(discovery_registry, "passes", "Discovery passes run", discovery.passes);
        counter(discovery_registry, "failures", "Failed discovery steps", discovery.failures);
    }

    let sources = state.health.all_source_liveness();
    if !sources.is_empty() {
        let up = Family::<SourceLabels, Gauge>::default();
        let consecutive_failures = Family::<SourceLabels, Gauge>::default();
        for source in &sources {
            let labels = SourceLabels {
                source: source.source.clone(),
            };
            up.get_or_create(&labels)
                .set(matches!(source.status, SourceStatus::Up) as i64);
            consecutive_failures
                .get_or_create(&labels)
                .set(source.consecutive_failures as i64);
        }
        registry.register(
            "source_up",
            "1 if the last scrape of the source succeeded",
            up,
        );
        registry.register(
            "source_consecutive_failures",
            "Failed scrapes since the last success",
            consecutive_failures,
        );
    }

    let mut body = String::new();
    encode(&mut body, &registry)?;
    Ok(body)
}

/// HTTP server configuration.
pub struct HttpServer {
    state: AppState,
    listen_addr: SocketAddr,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(state: AppState, listen_addr: SocketAddr) -> Self {
        Self { state, listen_addr }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.state);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(addr = %self.listen_addr, "HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use kubesight_framework::{MetricsSourceProvider, ProviderFactory, ProviderHandler};
    use std::time::Duration;
    use tower::ServiceExt;
    use url::Url;

    struct NoFactory;

    impl ProviderFactory for NoFactory {
        fn name(&self) -> &str {
            "none"
        }

        fn build(&self, _uri: &Url) -> kubesight_framework::Result<Arc<dyn MetricsSourceProvider>> {
            Err(kubesight_framework::CollectorError::provider("unused"))
        }
    }

    struct NoHandler;

    impl ProviderHandler for NoHandler {
        fn add_provider(&self, _provider: Arc<dyn MetricsSourceProvider>) {}

        fn delete_provider(&self, _name: &str) {}
    }

    fn make_state() -> AppState {
        AppState {
            health: Arc::new(CollectorHealth::new()),
            discovery: Arc::new(DiscoveryMetrics::new()),
            registry: Arc::new(ProviderRegistry::new(Arc::new(NoFactory), Arc::new(NoHandler))),
        }
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = make_state();
        state.health.record_scrape_success("prometheus_source: web-0", 4);
        state.health.record_scrape_failure("prometheus_source: db-0", "refused");
        state.discovery.set_rules_count(2);

        let response = create_router(state)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().starts_with("application/openmetrics-text"));

        let body = body_string(response).await;
        assert!(body.contains("# TYPE kubesight_scrapes counter\n"));
        assert!(body.contains("kubesight_scrapes_total 2\n"));
        assert!(body.contains("kubesight_scrape_failures_total 1\n"));
        assert!(body.contains("kubesight_discovery_prometheus_rules_count 2\n"));
        assert!(body.contains("kubesight_discovery_passes_total 1\n"));
        assert!(body.contains("kubesight_source_up{source=\"prometheus_source: web-0\"} 1\n"));
        assert!(body.contains("kubesight_source_up{source=\"prometheus_source: db-0\"} 0\n"));
        assert!(body.contains("kubesight_source_consecutive_failures{source=\"prometheus_source: db-0\"} 1\n"));
        assert!(body.contains("kubesight_up 0\n"));
        assert!(body.ends_with("# EOF\n"));
    }

    #[tokio::test]
    async fn test_metrics_without_sources() {
        let body = encode_metrics(&make_state()).unwrap();
        assert!(body.contains("kubesight_discovery_registrations 0\n"));
        assert!(!body.contains("kubesight_source_up"));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = make_state();
        state.health.record_scrape_success("web-0", 4);

        let response = create_router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("\"scrapes_total\":1"));
        assert!(body.contains("\"registrations\":0"));
        assert!(body.contains("\"source\":\"web-0\""));
        assert!(body.contains("\"rules_count\":0"));
    }

    #[tokio::test]
    async fn test_ready_endpoint() {
        let state = make_state();
        let router = create_router(state.clone());

        let response = router
            .clone()
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.discovery.set_rules_count(0);
        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let server = HttpServer::new(make_state(), "127.0.0.1:0".parse().unwrap());
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(server.run(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
