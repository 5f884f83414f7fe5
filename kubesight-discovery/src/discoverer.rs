//! Turns resource events and discovery rules into registrations.

use std::sync::Arc;

use crate::config::{DiscoveryConfig, PrometheusRule};
use crate::error::Result;
use crate::lister::ResourceLister;
use crate::metrics::DiscoveryMetrics;
use crate::registry::{RegisterOutcome, Registry};
use crate::resolve::{Resolution, resolve};
use crate::resource::{Resource, ResourceEvent};

/// Counts from one [`Discoverer::process`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub rules: usize,
    pub skipped_rules: usize,
    pub resources: usize,
    pub registered: usize,
    pub failures: usize,
}

pub struct Discoverer {
    registry: Arc<Registry>,
    lister: Arc<dyn ResourceLister>,
    metrics: Arc<DiscoveryMetrics>,
}

impl Discoverer {
    pub fn new(
        registry: Arc<Registry>,
        lister: Arc<dyn ResourceLister>,
        metrics: Arc<DiscoveryMetrics>,
    ) -> Self {
        Self {
            registry,
            lister,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<DiscoveryMetrics> {
        &self.metrics
    }

    /// A resource was added or updated. It must opt in through the
    /// `prometheus.io/scrape` annotation.
    pub fn discover(&self, resource: &Resource) -> Result<RegisterOutcome> {
        let rule = PrometheusRule {
            resource_type: resource.kind.to_string(),
            ..Default::default()
        };
        self.discover_with(resource, &rule, true)
    }

    /// A resource went away.
    pub fn delete(&self, resource: &Resource) {
        tracing::debug!(resource = %resource.key(), "Resource deleted");
        if self.registry.unregister(&resource.key()) {
            self.metrics.record_unregistration();
        }
    }

    /// Dispatch a watch event. Failures are logged.
    pub fn handle_event(&self, event: &ResourceEvent) {
        match event {
            ResourceEvent::Added(resource) | ResourceEvent::Updated(resource) => {
                if let Err(e) = self.discover(resource) {
                    tracing::warn!(resource = %resource.key(), error = %e, "Discovery failed");
                }
            }
            ResourceEvent::Deleted(resource) => self.delete(resource),
        }
    }

    /// Run every rule of `config` in order.
    ///
    /// A rule with an unknown resource type or whose listing fails is skipped;
    /// the others still run. Per-resource failures are logged and counted.
    pub async fn process(&self, config: &DiscoveryConfig) -> PassSummary {
        tracing::debug!(rules = config.rules.len(), "Processing discovery configuration");
        let mut summary = PassSummary {
            rules: config.rules.len(),
            ..Default::default()
        };

        for rule in &config.rules {
            let kind = match rule.kind() {
                Ok(kind) => kind,
                Err(e) => {
                    tracing::warn!(rule = %rule.name, error = %e, "Skipping rule");
                    summary.skipped_rules += 1;
                    continue;
                }
            };

            let resources = match self.lister.list(kind, &rule.namespace, &rule.labels).await {
                Ok(resources) => resources,
                Err(e) => {
                    tracing::warn!(rule = %rule.name, error = %e, "Listing failed, skipping rule");
                    self.metrics.record_failure();
                    summary.skipped_rules += 1;
                    continue;
                }
            };
            tracing::debug!(rule = %rule.name, kind = %kind, found = resources.len(), "Listed resources");

            for resource in &resources {
                summary.resources += 1;
                match self.discover_with(resource, rule, false) {
                    Ok(RegisterOutcome::Added | RegisterOutcome::Replaced) => summary.registered += 1,
                    Ok(RegisterOutcome::Unchanged) => {}
                    Err(e) => {
                        tracing::warn!(rule = %rule.name, resource = %resource.key(), error = %e, "Discovery failed");
                        summary.failures += 1;
                    }
                }
            }
        }

        self.metrics.set_rules_count(config.rules.len());
        summary
    }

    fn discover_with(
        &self,
        resource: &Resource,
        rule: &PrometheusRule,
        check_annotation: bool,
    ) -> Result<RegisterOutcome> {
        let key = resource.key();
        let resolution = resolve(resource, rule, check_annotation).inspect_err(|_| {
            self.metrics.record_failure();
        })?;

        let opted_out = resolution == Resolution::OptOut;
        match resolution {
            Resolution::Scrape(url) => {
                tracing::trace!(resource = %key, url = %url, "Resolved scrape URL");
                let outcome = self.registry.register(&key, url).inspect_err(|_| {
                    self.metrics.record_failure();
                })?;
                if outcome != RegisterOutcome::Unchanged {
                    self.metrics.record_registration();
                }
                Ok(outcome)
            }
            // No URL any more: whatever was registered for the resource goes.
            Resolution::OptOut | Resolution::Skip => {
                if self.registry.unregister(&key) {
                    tracing::info!(
                        resource = %key,
                        opted_out,
                        "Resource no longer scrapeable, unregistered"
                    );
                    self.metrics.record_unregistration();
                }
                Ok(RegisterOutcome::Unchanged)
            }
        }
    }
}
