//! KubeSight collector.

use std::sync::Arc;

use kubesight::{AppState, Collector, HttpServer, KubesightConfig, collect_once, run_discovery};
use kubesight_common::{Format, encode};
use kubesight_framework::{CollectorArgs, CollectorConfig, CollectorRunner, DataSink, ZenohSink};
use kubesight_prometheus::HttpTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CollectorArgs::parse();

    let config = KubesightConfig::load(&args.config)?;
    let mut runner = CollectorRunner::new_with_args("kubesight", config, Some(&args))?;
    let config = runner.config().clone();

    let transport = Arc::new(HttpTransport::default());

    if args.once {
        let points = collect_once(&config, transport).await?;
        for point in &points {
            let line = encode(point, Format::Json)?;
            println!("{}", String::from_utf8_lossy(&line));
        }
        tracing::info!(points = points.len(), "Single pass complete");
        return Ok(());
    }

    let mut sinks: Vec<Arc<dyn DataSink>> = Vec::new();
    if config.sink.enabled {
        let session = kubesight_common::connect(&config.zenoh).await?;
        sinks.push(Arc::new(ZenohSink::new(
            Arc::new(session),
            config.sink.key_prefix.clone(),
            config.sink.format,
        )));
    } else {
        tracing::warn!("Zenoh sink disabled, scraped points are discarded");
    }

    let mut collector = Collector::new(&config, transport, sinks)?;
    tracing::info!(
        rules = config.discovery.rules.len(),
        static_resources = collector.lister.len(),
        interval_secs = config.discovery.interval_secs,
        "Collector configured"
    );

    if let Some(pipeline) = collector.take_pipeline() {
        let shutdown = runner.shutdown_signal();
        runner.spawn(pipeline.run(shutdown));
    }

    let shutdown = runner.shutdown_signal();
    runner.spawn(run_discovery(
        collector.discoverer.clone(),
        config.discovery.clone(),
        shutdown,
    ));

    if config.http.enabled {
        let listen_addr = config
            .http
            .listen
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;
        let server = HttpServer::new(
            AppState {
                health: collector.health.clone(),
                discovery: collector.discovery_metrics.clone(),
                registry: collector.registry.clone(),
            },
            listen_addr,
        );
        let shutdown = runner.shutdown_signal();
        runner.spawn_with_error("http".to_string(), server.run(shutdown));
    }

    runner.run().await?;

    collector.scheduler.stop();
    let stats = collector.health.snapshot();
    tracing::info!(
        scrapes = stats.scrapes_total,
        failures = stats.scrape_failures,
        points = stats.points_collected,
        batches_exported = stats.batches_exported,
        batches_dropped = stats.batches_dropped,
        "Final statistics"
    );

    Ok(())
}
