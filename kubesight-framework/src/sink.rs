//! Sinks and the manager that fans batches out to them.

use std::sync::Arc;

use async_trait::async_trait;
use kubesight_common::DataBatch;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::health::CollectorHealth;

/// Destination for processed batches.
#[async_trait]
pub trait DataSink: Send + Sync {
    fn name(&self) -> &str;

    /// Hand one batch off. Must not retain the batch beyond the call.
    async fn export_data(&self, batch: &DataBatch) -> Result<()>;

    /// Release resources. Called once, after the last export.
    async fn stop(&self);
}

struct SinkWorker {
    name: String,
    tx: mpsc::Sender<Arc<DataBatch>>,
    handle: JoinHandle<()>,
}

/// Delivers every batch to every sink, each on its own task.
///
/// Every sink has a queue of depth one. A sink still busy with the previous
/// batch when the next arrives skips it instead of slowing the others down.
pub struct SinkManager {
    workers: Vec<SinkWorker>,
    sinks: Vec<Arc<dyn DataSink>>,
    health: Arc<CollectorHealth>,
}

impl SinkManager {
    /// Spawn one export task per sink on the current runtime.
    pub fn new(sinks: Vec<Arc<dyn DataSink>>, health: Arc<CollectorHealth>) -> Self {
        let workers = sinks
            .iter()
            .map(|sink| spawn_worker(sink.clone(), health.clone()))
            .collect();

        Self {
            workers,
            sinks,
            health,
        }
    }

    pub fn sink_count(&self) -> usize {
        self.workers.len()
    }

    /// Offer a batch to every sink without waiting for any export.
    ///
    /// Returns how many sinks accepted it.
    pub fn export_data(&self, batch: DataBatch) -> usize {
        let batch = Arc::new(batch);
        let mut accepted = 0;

        for worker in &self.workers {
            match worker.tx.try_send(batch.clone()) {
                Ok(()) => accepted += 1,
                Err(TrySendError::Full(_)) => {
                    self.health.record_batch_dropped();
                    tracing::warn!(sink = %worker.name, "Sink busy, dropping batch");
                }
                Err(TrySendError::Closed(_)) => {
                    self.health.record_batch_dropped();
                    tracing::error!(sink = %worker.name, "Sink worker gone, dropping batch");
                }
            }
        }

        accepted
    }

    /// Let queued batches drain, then stop every sink.
    pub async fn stop(self) {
        for worker in self.workers {
            drop(worker.tx);
            if let Err(e) = worker.handle.await {
                tracing::warn!(sink = %worker.name, error = %e, "Sink worker ended abnormally");
            }
        }

        for sink in &self.sinks {
            sink.stop().await;
            tracing::debug!(sink = %sink.name(), "Sink stopped");
        }
    }
}

fn spawn_worker(sink: Arc<dyn DataSink>, health: Arc<CollectorHealth>) -> SinkWorker {
    let (tx, mut rx) = mpsc::channel::<Arc<DataBatch>>(1);
    let name = sink.name().to_string();

    let handle = tokio::spawn(async move {
        while let Some(batch) = rx.recv().await {
            match sink.export_data(&batch).await {
                Ok(()) => health.record_batch_exported(),
                Err(e) => {
                    health.record_export_failure();
                    tracing::warn!(sink = %sink.name(), error = %e, "Export failed");
                }
            }
        }
    });

    SinkWorker { name, tx, handle }
}
