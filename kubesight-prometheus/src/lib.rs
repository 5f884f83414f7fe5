//! Prometheus scraping for the KubeSight collector.
//!
//! Scrapes a text exposition endpoint and translates it into
//! [`MetricPoint`](kubesight_common::MetricPoint)s.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ ScrapeTransport │────>│     parser      │────>│  PointBuilder   │
//! │   (HTTP GET)    │     │ (MetricFamily)  │     │ (flat points)   │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! Providers are built from URIs by [`PrometheusProviderFactory`], which is
//! what discovery registers.
//!
//! # Naming
//!
//! | Family kind | Points |
//! |-------------|--------|
//! | counter     | `<name>.counter` |
//! | gauge       | `<name>.gauge` |
//! | untyped     | `<name>.value` |
//! | summary     | `<name>.count`, `<name>.sum`, `<name>` tagged `quantile` |
//! | histogram   | `<name>.count`, `<name>.sum`, `<name>.bucket` tagged `le` |
//!
//! Underscores in family names become dots and the provider prefix is
//! prepended.

pub mod error;
pub mod family;
pub mod filter;
pub mod parser;
pub mod point_builder;
pub mod source;

pub use error::{PrometheusError, Result};
pub use family::{Bucket, MetricFamily, MetricKind, Quantile, Sample, SampleValue};
pub use filter::{FilterConfig, MetricFilter};
pub use parser::{Exposition, parse};
pub use point_builder::{MetricPredicate, PointBuilder, Translation, TranslationStats, format_float};
pub use source::{
    HttpTransport, PrometheusProvider, PrometheusProviderFactory, PrometheusSource,
    ScrapeTransport, scrape_url,
};
