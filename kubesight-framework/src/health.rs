//! Collector health tracking.
//!
//! [`CollectorHealth`] is shared by the scheduler, the pipeline and the sink
//! manager. Each records what it did; the self-telemetry endpoint reads a
//! [`HealthSnapshot`] back out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use kubesight_common::{CollectorStatus, HealthSnapshot};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Consecutive failures after which a source counts as down.
const FAILURE_THRESHOLD: u32 = 3;

/// Availability of one scraped source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    /// Last scrape succeeded.
    Up,
    /// Recent scrapes failed, but fewer than the threshold.
    Degraded,
    /// Scrapes keep failing.
    Down,
    /// Never scraped.
    #[default]
    Unknown,
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceStatus::Up => write!(f, "up"),
            SourceStatus::Degraded => write!(f, "degraded"),
            SourceStatus::Down => write!(f, "down"),
            SourceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Liveness of a source, as reported over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLiveness {
    pub source: String,
    pub status: SourceStatus,
    /// Last successful scrape (millis since epoch), 0 if never.
    pub last_seen: i64,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct SourceState {
    status: SourceStatus,
    last_seen: i64,
    consecutive_failures: u32,
    last_error: Option<String>,
}

/// Counters and per-source liveness for the whole collector.
#[derive(Debug)]
pub struct CollectorHealth {
    start_time: Instant,
    providers_active: AtomicU64,
    scrapes_total: AtomicU64,
    scrape_failures: AtomicU64,
    points_collected: AtomicU64,
    batches_exported: AtomicU64,
    batches_dropped: AtomicU64,
    export_failures: AtomicU64,
    sources: RwLock<HashMap<String, SourceState>>,
}

impl Default for CollectorHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectorHealth {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            providers_active: AtomicU64::new(0),
            scrapes_total: AtomicU64::new(0),
            scrape_failures: AtomicU64::new(0),
            points_collected: AtomicU64::new(0),
            batches_exported: AtomicU64::new(0),
            batches_dropped: AtomicU64::new(0),
            export_failures: AtomicU64::new(0),
            sources: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_providers_active(&self, count: u64) {
        self.providers_active.store(count, Ordering::SeqCst);
    }

    /// Record a successful scrape of `source` that produced `points` points.
    pub fn record_scrape_success(&self, source: &str, points: u64) {
        self.scrapes_total.fetch_add(1, Ordering::SeqCst);
        self.points_collected.fetch_add(points, Ordering::SeqCst);

        let now = chrono::Utc::now().timestamp_millis();
        let mut sources = self.sources.write();
        let state = sources.entry(source.to_string()).or_default();
        state.status = SourceStatus::Up;
        state.last_seen = now;
        state.consecutive_failures = 0;
        state.last_error = None;
    }

    /// Record a failed scrape of `source`.
    pub fn record_scrape_failure(&self, source: &str, error: &str) {
        self.scrapes_total.fetch_add(1, Ordering::SeqCst);
        self.scrape_failures.fetch_add(1, Ordering::SeqCst);

        let mut sources = self.sources.write();
        let state = sources.entry(source.to_string()).or_default();
        state.consecutive_failures += 1;
        state.last_error = Some(error.to_string());
        state.status = if state.consecutive_failures >= FAILURE_THRESHOLD {
            SourceStatus::Down
        } else {
            SourceStatus::Degraded
        };
    }

    /// Forget a source, e.g. once its provider was unregistered.
    pub fn forget_source(&self, source: &str) {
        self.sources.write().remove(source);
    }

    pub fn record_batch_exported(&self) {
        self.batches_exported.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_batch_dropped(&self) {
        self.batches_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_export_failure(&self) {
        self.export_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn source_liveness(&self, source: &str) -> Option<SourceLiveness> {
        self.sources
            .read()
            .get(source)
            .map(|state| to_liveness(source, state))
    }

    /// Liveness of every known source, sorted by name.
    pub fn all_source_liveness(&self) -> Vec<SourceLiveness> {
        let mut all: Vec<SourceLiveness> = self
            .sources
            .read()
            .iter()
            .map(|(name, state)| to_liveness(name, state))
            .collect();
        all.sort_by(|a, b| a.source.cmp(&b.source));
        all
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let scrapes_total = self.scrapes_total.load(Ordering::SeqCst);
        let any_failing = self
            .sources
            .read()
            .values()
            .any(|s| s.consecutive_failures > 0);

        let status = if scrapes_total == 0 {
            CollectorStatus::Starting
        } else if any_failing {
            CollectorStatus::Degraded
        } else {
            CollectorStatus::Healthy
        };

        HealthSnapshot {
            status,
            uptime_secs: self.start_time.elapsed().as_secs(),
            providers_active: self.providers_active.load(Ordering::SeqCst),
            scrapes_total,
            scrape_failures: self.scrape_failures.load(Ordering::SeqCst),
            points_collected: self.points_collected.load(Ordering::SeqCst),
            batches_exported: self.batches_exported.load(Ordering::SeqCst),
            batches_dropped: self.batches_dropped.load(Ordering::SeqCst),
            export_failures: self.export_failures.load(Ordering::SeqCst),
        }
    }
}

fn to_liveness(name: &str, state: &SourceState) -> SourceLiveness {
    SourceLiveness {
        source: name.to_string(),
        status: state.status,
        last_seen: state.last_seen,
        consecutive_failures: state.consecutive_failures,
        last_error: state.last_error.clone(),
    }
}
