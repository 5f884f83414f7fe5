//! Periodic scraping of registered providers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use kubesight_common::DataBatch;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::error::{CollectorError, Result};
use crate::health::CollectorHealth;
use crate::source::{MetricsSource, MetricsSourceProvider, ProviderHandler};

struct Scheduled {
    handle: JoinHandle<()>,
    sources: Vec<String>,
}

/// Runs one scrape loop per provider and feeds the batches into the pipeline.
///
/// Providers are keyed by name. Adding a provider under a name that is
/// already scheduled replaces the old loop.
pub struct Scheduler {
    runtime: Handle,
    tx: mpsc::Sender<DataBatch>,
    health: Arc<CollectorHealth>,
    scheduled: Mutex<HashMap<String, Scheduled>>,
}

impl Scheduler {
    /// Create a scheduler bound to the current tokio runtime.
    pub fn new(tx: mpsc::Sender<DataBatch>, health: Arc<CollectorHealth>) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| CollectorError::Runtime(format!("no tokio runtime: {}", e)))?;

        Ok(Self {
            runtime,
            tx,
            health,
            scheduled: Mutex::new(HashMap::new()),
        })
    }

    /// Names of the scheduled providers, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scheduled.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.scheduled.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scheduled.lock().is_empty()
    }

    /// Abort every scrape loop.
    pub fn stop(&self) {
        let mut scheduled = self.scheduled.lock();
        for (name, entry) in scheduled.drain() {
            entry.handle.abort();
            tracing::debug!(provider = %name, "Provider stopped");
        }
        self.health.set_providers_active(0);
    }
}

impl ProviderHandler for Scheduler {
    fn add_provider(&self, provider: Arc<dyn MetricsSourceProvider>) {
        let name = provider.name().to_string();
        let sources = provider.sources().iter().map(|s| s.name().to_string()).collect();

        tracing::info!(
            provider = %name,
            interval = ?provider.collection_interval(),
            timeout = ?provider.timeout(),
            "Scheduling provider"
        );

        let handle = self.runtime.spawn(run_provider(
            provider,
            self.tx.clone(),
            self.health.clone(),
        ));

        let mut scheduled = self.scheduled.lock();
        if let Some(old) = scheduled.insert(name.clone(), Scheduled { handle, sources }) {
            old.handle.abort();
            tracing::debug!(provider = %name, "Replaced previous provider");
        }
        self.health.set_providers_active(scheduled.len() as u64);
    }

    fn delete_provider(&self, name: &str) {
        let mut scheduled = self.scheduled.lock();
        let Some(entry) = scheduled.remove(name) else {
            return;
        };

        entry.handle.abort();
        for source in &entry.sources {
            self.health.forget_source(source);
        }
        self.health.set_providers_active(scheduled.len() as u64);
        tracing::info!(provider = %name, "Provider removed");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for entry in self.scheduled.get_mut().values() {
            entry.handle.abort();
        }
    }
}

async fn run_provider(
    provider: Arc<dyn MetricsSourceProvider>,
    tx: mpsc::Sender<DataBatch>,
    health: Arc<CollectorHealth>,
) {
    let mut ticker = tokio::time::interval(provider.collection_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let batch = scrape_provider(provider.as_ref(), &health).await;
        if batch.is_empty() {
            tracing::trace!(provider = %provider.name(), "Nothing scraped");
            continue;
        }

        if tx.send(batch).await.is_err() {
            tracing::debug!(provider = %provider.name(), "Pipeline closed, stopping provider");
            break;
        }
    }
}

/// Scrape every source of a provider once, concurrently, and merge the results.
///
/// Each source is bounded by the provider timeout. Failed and timed out
/// sources are logged and recorded in `health`; they do not fail the batch.
pub async fn scrape_provider(
    provider: &dyn MetricsSourceProvider,
    health: &CollectorHealth,
) -> DataBatch {
    let timeout = provider.timeout();
    let mut set = JoinSet::new();

    for source in provider.sources() {
        set.spawn(scrape_source(source, timeout));
    }

    let mut merged = DataBatch::new(Utc::now());
    while let Some(joined) = set.join_next().await {
        let (name, result) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(provider = %provider.name(), error = %e, "Scrape task panicked");
                continue;
            }
        };

        match result {
            Ok(batch) => {
                let points = batch.metric_points.len() + batch.metric_sets.len();
                health.record_scrape_success(&name, points as u64);
                merged.merge(batch);
            }
            Err(e) => {
                health.record_scrape_failure(&name, &e.to_string());
                tracing::warn!(source = %name, error = %e, "Scrape failed");
            }
        }
    }

    merged
}

async fn scrape_source(
    source: Arc<dyn MetricsSource>,
    timeout: std::time::Duration,
) -> (String, Result<DataBatch>) {
    let name = source.name().to_string();
    let result = match tokio::time::timeout(timeout, source.scrape_metrics()).await {
        Ok(result) => result,
        Err(_) => Err(CollectorError::Timeout {
            source_name: name.clone(),
            after: timeout,
        }),
    };
    (name, result)
}
