//! KubeSight: a Kubernetes-aware telemetry collector.
//!
//! Discovers pods and services, scrapes their Prometheus endpoints and
//! publishes the normalized points over Zenoh.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   Discoverer    │────>│    Scheduler    │────>│    Pipeline     │
//! │ (rules, events) │     │ (scrape loops)  │     │ (tags, sinks)   │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//!                                                          │
//!                                                          v
//!                                                 kubesight/metrics/**
//! ```
//!
//! # Usage
//!
//! ```bash
//! kubesight --config kubesight.json5
//! kubesight --config kubesight.json5 --once
//! ```
//!
//! # Configuration
//!
//! See [`config::KubesightConfig`] for configuration options.

pub mod collector;
pub mod config;
pub mod http;

pub use collector::{Collector, collect_once, provider_factory, run_discovery};
pub use config::KubesightConfig;
pub use http::{AppState, HttpServer};
