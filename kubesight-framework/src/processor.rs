//! Batch processors and the chain that runs them.

use std::collections::HashMap;
use std::sync::Arc;

use kubesight_common::DataBatch;

use crate::error::Result;

/// Transforms one batch into another.
///
/// Processors take the batch by value and return the result; they must accept
/// an empty batch without failing.
pub trait DataProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, batch: DataBatch) -> Result<DataBatch>;
}

/// Ordered list of processors applied to every batch.
#[derive(Clone, Default)]
pub struct ProcessorChain {
    processors: Vec<Arc<dyn DataProcessor>>,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a processor to the end of the chain.
    pub fn with(mut self, processor: Arc<dyn DataProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Run the batch through every processor in order.
    ///
    /// Stops at the first failure; the batch is lost in that case.
    pub fn process(&self, batch: DataBatch) -> Result<DataBatch> {
        let mut batch = batch;
        for processor in &self.processors {
            batch = processor.process(batch).map_err(|e| {
                tracing::warn!(processor = %processor.name(), error = %e, "Processor failed");
                e
            })?;
        }
        Ok(batch)
    }
}

impl std::fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.processors.iter().map(|p| p.name()).collect();
        f.debug_struct("ProcessorChain")
            .field("processors", &names)
            .finish()
    }
}

/// Adds a fixed set of tags to every point and metric set.
///
/// Existing tags win, so a scrape target can still override e.g. `cluster`.
#[derive(Debug, Clone, Default)]
pub struct StaticTagsProcessor {
    tags: HashMap<String, String>,
}

impl StaticTagsProcessor {
    pub fn new(tags: HashMap<String, String>) -> Self {
        let tags = tags
            .into_iter()
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .collect();
        Self { tags }
    }
}

impl DataProcessor for StaticTagsProcessor {
    fn name(&self) -> &str {
        "static_tags"
    }

    fn process(&self, mut batch: DataBatch) -> Result<DataBatch> {
        if self.tags.is_empty() {
            return Ok(batch);
        }

        for point in &mut batch.metric_points {
            let resolved = point.tags();
            for (k, v) in &self.tags {
                if !resolved.contains_key(k) {
                    point.tags.insert(k.clone(), v.clone());
                }
            }
        }

        for set in batch.metric_sets.values_mut() {
            for (k, v) in &self.tags {
                set.labels.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }

        Ok(batch)
    }
}
