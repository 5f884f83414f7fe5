//! KubeSight Common Library
//!
//! This crate provides the data model and shared utilities of the collector:
//!
//! - [`metrics`] - Point, batch and label vocabulary (`MetricPoint`, `DataBatch`, `TagSet`)
//! - [`interner`] - String interning for label names and values
//! - [`serialization`] - JSON/CBOR encoding and decoding
//! - [`config`] - Shared config sections and JSON5 parsing
//! - [`session`] - Zenoh session management
//! - [`keyexpr`] - Key expression builders and parsers
//! - [`health`] - Collector health snapshot
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod health;
pub mod interner;
pub mod keyexpr;
pub mod metrics;
pub mod serialization;
pub mod session;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, ZenohConfig, parse_config};
pub use error::{Error, Result};
pub use health::{CollectorStatus, HealthSnapshot};
pub use interner::StringInterner;
pub use keyexpr::{KEY_PREFIX, KeyExprBuilder, ParsedKeyExpr, all_metrics_wildcard, parse_key_expr};
pub use metrics::{
    DataBatch, ExportedPoint, LabelPair, LabeledMetric, MetricPoint, MetricSet, MetricType,
    MetricValue, TagSet, UnitsType, ValueType, current_timestamp_secs,
};
pub use serialization::{Format, decode, decode_auto, encode};
pub use session::connect;

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init(),
    };

    result.map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))
}
