//! The loop between scrape output and the sinks.

use std::sync::Arc;

use kubesight_common::DataBatch;
use tokio::sync::{mpsc, watch};

use crate::health::CollectorHealth;
use crate::processor::ProcessorChain;
use crate::sink::SinkManager;

/// Channel capacity between the scheduler and the pipeline.
pub const PIPELINE_QUEUE: usize = 64;

/// Receives scraped batches, runs them through the processors and hands the
/// result to the sinks.
pub struct Pipeline {
    rx: mpsc::Receiver<DataBatch>,
    processors: ProcessorChain,
    sinks: SinkManager,
    health: Arc<CollectorHealth>,
}

impl Pipeline {
    pub fn new(
        rx: mpsc::Receiver<DataBatch>,
        processors: ProcessorChain,
        sinks: SinkManager,
        health: Arc<CollectorHealth>,
    ) -> Self {
        Self {
            rx,
            processors,
            sinks,
            health,
        }
    }

    /// Run until `shutdown` flips to true or every sender is gone, then stop
    /// the sinks.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            processors = self.processors.len(),
            sinks = self.sinks.sink_count(),
            "Pipeline started"
        );

        loop {
            tokio::select! {
                received = self.rx.recv() => {
                    let Some(batch) = received else {
                        tracing::debug!("All batch senders closed");
                        break;
                    };
                    self.handle(batch);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.sinks.stop().await;
        tracing::info!("Pipeline stopped");
    }

    fn handle(&self, batch: DataBatch) {
        let points = batch.metric_points.len();
        match self.processors.process(batch) {
            Ok(processed) => {
                let accepted = self.sinks.export_data(processed);
                tracing::trace!(points, accepted, "Batch dispatched");
            }
            Err(e) => {
                self.health.record_export_failure();
                tracing::warn!(error = %e, points, "Dropping batch after processor failure");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::processor::StaticTagsProcessor;
    use crate::sink::DataSink;
    use async_trait::async_trait;
    use chrono::Utc;
    use kubesight_common::MetricPoint;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Default)]
    struct Collecting {
        points: Mutex<Vec<MetricPoint>>,
    }

    #[async_trait]
    impl DataSink for Collecting {
        fn name(&self) -> &str {
            "collecting"
        }

        async fn export_data(&self, batch: &DataBatch) -> Result<()> {
            self.points.lock().extend(batch.metric_points.iter().cloned());
            Ok(())
        }

        async fn stop(&self) {}
    }

    #[tokio::test]
    async fn test_pipeline_processes_and_exports() {
        let sink = Arc::new(Collecting::default());
        let health = Arc::new(CollectorHealth::new());
        let tags: HashMap<String, String> =
            [("cluster".to_string(), "prod".to_string())].into_iter().collect();
        let processors = ProcessorChain::new().with(Arc::new(StaticTagsProcessor::new(tags)));

        let (tx, rx) = mpsc::channel(PIPELINE_QUEUE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pipeline = Pipeline::new(
            rx,
            processors,
            SinkManager::new(vec![sink.clone()], health.clone()),
            health,
        );
        let handle = tokio::spawn(pipeline.run(shutdown_rx));

        tx.send(DataBatch::from_points(
            Utc::now(),
            vec![MetricPoint::new("up.gauge", 1.0, 0, "web-0")],
        ))
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        let points = sink.points.lock();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].tags().get("cluster"), Some(&"prod".to_string()));
    }

    #[tokio::test]
    async fn test_pipeline_stops_when_senders_gone() {
        let health = Arc::new(CollectorHealth::new());
        let (tx, rx) = mpsc::channel(1);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let pipeline = Pipeline::new(
            rx,
            ProcessorChain::new(),
            SinkManager::new(vec![], health.clone()),
            health,
        );

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), pipeline.run(shutdown_rx))
            .await
            .unwrap();
    }
}
