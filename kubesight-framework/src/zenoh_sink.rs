//! Sink that publishes every point of a batch to Zenoh.

use std::sync::Arc;

use async_trait::async_trait;
use kubesight_common::{DataBatch, ExportedPoint, Format, KeyExprBuilder, encode};

use crate::error::{CollectorError, Result};
use crate::sink::DataSink;

/// Publishes points as individual samples under
/// `<prefix>/metrics/<source>/<metric>`.
#[derive(Clone, Debug)]
pub struct ZenohSink {
    session: Arc<zenoh::Session>,
    keys: KeyExprBuilder,
    format: Format,
}

impl ZenohSink {
    pub fn new(session: Arc<zenoh::Session>, key_prefix: impl Into<String>, format: Format) -> Self {
        Self {
            session,
            keys: KeyExprBuilder::new(key_prefix),
            format,
        }
    }

    pub fn key_prefix(&self) -> &str {
        self.keys.prefix()
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Key a point is published under.
    pub fn key_for(&self, point: &ExportedPoint) -> String {
        self.keys.metric_key(&point.source, &point.metric)
    }

    async fn publish(&self, point: &ExportedPoint) -> Result<()> {
        let key = self.key_for(point);
        let payload =
            encode(point, self.format).map_err(|e| CollectorError::Serialization(e.to_string()))?;

        self.session
            .put(&key, payload)
            .await
            .map_err(|e| CollectorError::sink("zenoh", format!("put {}: {}", key, e)))
    }
}

#[async_trait]
impl DataSink for ZenohSink {
    fn name(&self) -> &str {
        "zenoh"
    }

    /// Publishes every point; a failed put does not stop the rest of the batch.
    async fn export_data(&self, batch: &DataBatch) -> Result<()> {
        let points = batch.exported_points();
        let mut stats = PublishStats::default();

        for point in &points {
            match self.publish(point).await {
                Ok(()) => stats.success += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::debug!(error = %e, "Failed to publish point");
                }
            }
        }

        tracing::debug!(
            published = stats.success,
            failed = stats.failed,
            "Batch published to Zenoh"
        );

        if stats.failed > 0 && stats.success == 0 {
            return Err(CollectorError::sink(
                "zenoh",
                format!("all {} puts failed", stats.failed),
            ));
        }
        Ok(())
    }

    async fn stop(&self) {
        tracing::info!("Zenoh sink stopped");
    }
}

/// Outcome of publishing one batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct PublishStats {
    pub success: usize,
    pub failed: usize,
}

impl PublishStats {
    pub fn total(&self) -> usize {
        self.success + self.failed
    }
}
