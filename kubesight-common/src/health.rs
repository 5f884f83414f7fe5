//! Health types shared between the pipeline and the self-telemetry endpoint.

use serde::{Deserialize, Serialize};

/// Overall collector status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CollectorStatus {
    /// Scrapes and exports are succeeding.
    Healthy,
    /// Some scrapes or exports are failing.
    Degraded,
    /// Nothing has been scraped yet.
    #[default]
    Starting,
}

impl std::fmt::Display for CollectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorStatus::Healthy => write!(f, "healthy"),
            CollectorStatus::Degraded => write!(f, "degraded"),
            CollectorStatus::Starting => write!(f, "starting"),
        }
    }
}

/// Point-in-time view of the collector counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: CollectorStatus,
    pub uptime_secs: u64,
    /// Providers currently scheduled.
    pub providers_active: u64,
    pub scrapes_total: u64,
    pub scrape_failures: u64,
    pub points_collected: u64,
    pub batches_exported: u64,
    /// Batches a sink skipped because it was still busy.
    pub batches_dropped: u64,
    pub export_failures: u64,
}

impl HealthSnapshot {
    /// Fraction of scrapes that failed, 0.0 when nothing was scraped.
    pub fn scrape_failure_ratio(&self) -> f64 {
        if self.scrapes_total == 0 {
            0.0
        } else {
            self.scrape_failures as f64 / self.scrapes_total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(CollectorStatus::Healthy.to_string(), "healthy");
        assert_eq!(CollectorStatus::default(), CollectorStatus::Starting);
    }

    #[test]
    fn test_failure_ratio() {
        let mut snapshot = HealthSnapshot::default();
        assert_eq!(snapshot.scrape_failure_ratio(), 0.0);

        snapshot.scrapes_total = 10;
        snapshot.scrape_failures = 2;
        assert!((snapshot.scrape_failure_ratio() - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = HealthSnapshot {
            status: CollectorStatus::Degraded,
            scrapes_total: 3,
            ..Default::default()
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"status\":\"degraded\""));
        assert!(json.contains("\"scrapes_total\":3"));
    }
}
