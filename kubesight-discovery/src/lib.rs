//! Kubernetes discovery for the KubeSight collector.
//!
//! Pods and services are matched against [`PrometheusRule`]s (periodic
//! passes) or opt in through `prometheus.io/*` annotations (watch events).
//! Each match resolves to a provider URI which the [`Registry`] keeps in sync
//! with a [`ProviderHandler`](kubesight_framework::ProviderHandler), usually
//! the scheduler.
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(Registry::new(factory, scheduler));
//! let discoverer = Discoverer::new(registry, lister, Arc::new(DiscoveryMetrics::new()));
//!
//! discoverer.process(&config.discovery).await;
//! discoverer.handle_event(&ResourceEvent::Deleted(pod));
//! ```

pub mod config;
pub mod discoverer;
pub mod error;
pub mod lister;
pub mod metrics;
pub mod registry;
pub mod resolve;
pub mod resource;

pub use config::{DiscoveryConfig, PrometheusRule};
pub use discoverer::{Discoverer, PassSummary};
pub use error::{DiscoveryError, Result};
pub use lister::{ResourceLister, StaticLister};
pub use metrics::{DiscoveryMetrics, DiscoverySnapshot};
pub use registry::{RegisterOutcome, Registration, Registry};
pub use resolve::{Resolution, resolve};
pub use resource::{Resource, ResourceEvent, ResourceType};
