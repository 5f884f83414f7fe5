//! Error types for Prometheus scraping.

use kubesight_framework::CollectorError;
use thiserror::Error;

/// Result type alias using [`PrometheusError`].
pub type Result<T> = std::result::Result<T, PrometheusError>;

#[derive(Error, Debug)]
pub enum PrometheusError {
    /// The exposition body could not be parsed.
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// The HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The target answered with a non-success status.
    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// The provider URI is missing something or has a bad value.
    #[error("Invalid provider URI: {0}")]
    InvalidUri(String),

    /// A filter pattern did not compile.
    #[error("Invalid filter pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}

impl PrometheusError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    pub fn invalid_uri(msg: impl Into<String>) -> Self {
        Self::InvalidUri(msg.into())
    }
}

impl From<PrometheusError> for CollectorError {
    fn from(err: PrometheusError) -> Self {
        match err {
            PrometheusError::InvalidUri(msg) => CollectorError::Provider(msg),
            PrometheusError::Pattern { .. } => CollectorError::ConfigValidation(err.to_string()),
            other => CollectorError::Provider(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PrometheusError::parse(3, "not a sample line");
        assert_eq!(err.to_string(), "Parse error at line 3: not a sample line");

        let err = PrometheusError::Status {
            status: 503,
            url: "http://10.0.0.1/metrics".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unexpected status 503 from http://10.0.0.1/metrics"
        );
    }

    #[test]
    fn test_into_collector_error() {
        let err: CollectorError = PrometheusError::invalid_uri("missing host").into();
        assert!(matches!(err, CollectorError::Provider(_)));
    }
}
