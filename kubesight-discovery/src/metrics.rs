//! Discovery self-metrics.
//!
//! A [`DiscoveryMetrics`] instance is handed to the discoverer that reports
//! into it; whoever exposes self-telemetry holds another reference.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct DiscoveryMetrics {
    rules_count: AtomicI64,
    passes: AtomicU64,
    registrations: AtomicU64,
    unregistrations: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`DiscoveryMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySnapshot {
    pub rules_count: i64,
    pub passes: u64,
    pub registrations: u64,
    pub unregistrations: u64,
    pub failures: u64,
}

impl DiscoveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gauge: number of rules in the last processed configuration.
    pub fn set_rules_count(&self, count: usize) {
        self.rules_count.store(count as i64, Ordering::Relaxed);
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rules_count(&self) -> i64 {
        self.rules_count.load(Ordering::Relaxed)
    }

    pub fn record_registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unregistration(&self) {
        self.unregistrations.fetch_add(1, Ordering::Relaxed);
    }

    /// Resolution, listing or provider construction failed.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiscoverySnapshot {
        DiscoverySnapshot {
            rules_count: self.rules_count.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            unregistrations: self.unregistrations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
