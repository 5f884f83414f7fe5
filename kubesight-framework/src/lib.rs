//! KubeSight Collector Framework
//!
//! The pipeline contracts and the machinery that drives them.
//!
//! # Overview
//!
//! - [`MetricsSource`], [`MetricsSourceProvider`] and [`ProviderFactory`] on the scrape side
//! - [`ProviderHandler`] for providers that come and go at runtime, implemented by [`Scheduler`]
//! - [`DataProcessor`] and [`ProcessorChain`] between scrape and export
//! - [`DataSink`] and [`SinkManager`], with [`ZenohSink`] as the built-in sink
//! - [`Pipeline`] tying processors and sinks to the scheduler output
//! - [`CollectorConfig`], [`CollectorArgs`] and [`CollectorRunner`] for the binary
//!
//! # Example
//!
//! ```ignore
//! let (tx, rx) = tokio::sync::mpsc::channel(PIPELINE_QUEUE);
//! let health = Arc::new(CollectorHealth::new());
//! let scheduler = Arc::new(Scheduler::new(tx, health.clone())?);
//!
//! let sinks = SinkManager::new(vec![Arc::new(zenoh_sink)], health.clone());
//! let pipeline = Pipeline::new(rx, ProcessorChain::new(), sinks, health);
//! runner.spawn(pipeline.run(runner.shutdown_signal()));
//!
//! scheduler.add_provider(factory.build(&uri)?);
//! ```

mod args;
mod config;
mod error;
mod health;
mod pipeline;
mod processor;
mod runner;
mod scheduler;
mod sink;
mod source;
mod zenoh_sink;

pub use args::CollectorArgs;
pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use health::{CollectorHealth, SourceLiveness, SourceStatus};
pub use pipeline::{PIPELINE_QUEUE, Pipeline};
pub use processor::{DataProcessor, ProcessorChain, StaticTagsProcessor};
pub use runner::CollectorRunner;
pub use scheduler::{Scheduler, scrape_provider};
pub use sink::{DataSink, SinkManager};
pub use source::{
    DEFAULT_COLLECTION_INTERVAL, DEFAULT_TIMEOUT, MetricsSource, MetricsSourceProvider,
    ProviderFactory, ProviderHandler, ProviderTiming, query_value,
};
pub use zenoh_sink::{PublishStats, ZenohSink};

// Re-export commonly used types from kubesight-common
pub use kubesight_common::{
    DataBatch, Format, LoggingConfig, MetricPoint, TagSet, ZenohConfig,
};
