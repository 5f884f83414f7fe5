//! Error types for the collection pipeline.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using [`CollectorError`].
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Errors that can occur while collecting and exporting metrics.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// A source failed to produce a batch.
    #[error("Scrape of {source_name} failed: {message}")]
    Scrape {
        source_name: String,
        message: String,
    },

    /// A source did not answer within the provider timeout.
    #[error("Scrape of {source_name} timed out after {after:?}")]
    Timeout {
        source_name: String,
        after: Duration,
    },

    /// A provider could not be built from its URI.
    #[error("Provider error: {0}")]
    Provider(String),

    /// A processor rejected a batch.
    #[error("Processor {processor} failed: {message}")]
    Processor { processor: String, message: String },

    /// A sink failed to hand a batch off.
    #[error("Sink {sink} failed: {message}")]
    Sink { sink: String, message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No tokio runtime available to spawn scrape tasks on.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CollectorError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create a provider construction error.
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a scrape error for a named source.
    pub fn scrape(source_name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Scrape {
            source_name: source_name.into(),
            message: msg.into(),
        }
    }

    /// Create a sink error.
    pub fn sink(sink: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Sink {
            sink: sink.into(),
            message: msg.into(),
        }
    }

    /// Wrap an error with context.
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

impl From<kubesight_common::Error> for CollectorError {
    fn from(err: kubesight_common::Error) -> Self {
        match err {
            kubesight_common::Error::Config(msg) => Self::Config(msg),
            kubesight_common::Error::Zenoh(e) => Self::from(e),
            other if other.is_codec() => Self::Serialization(other.to_string()),
            other => Self::with_context("kubesight-common", other),
        }
    }
}

impl From<zenoh::Error> for CollectorError {
    fn from(err: zenoh::Error) -> Self {
        Self::Sink {
            sink: "zenoh".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<json5::Error> for CollectorError {
    fn from(err: json5::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CollectorError::scrape("prometheus: web-0", "connection refused");
        assert_eq!(
            err.to_string(),
            "Scrape of prometheus: web-0 failed: connection refused"
        );

        let err = CollectorError::Timeout {
            source_name: "web-0".to_string(),
            after: Duration::from_secs(10),
        };
        assert!(err.to_string().contains("timed out after 10s"));
    }

    #[test]
    fn test_from_common_config_error() {
        let err: CollectorError = kubesight_common::Error::Config("bad".into()).into();
        assert!(matches!(err, CollectorError::Config(_)));

        let bad_payload = kubesight_common::decode::<u32>(b"{", kubesight_common::Format::Json);
        let err: CollectorError = bad_payload.unwrap_err().into();
        assert!(matches!(err, CollectorError::Serialization(_)));
    }
}
