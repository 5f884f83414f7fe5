//! Error types for discovery.

use kubesight_framework::CollectorError;
use thiserror::Error;

/// Result type alias using [`DiscoveryError`].
pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The lister could not enumerate resources.
    #[error("Listing {kind} resources failed: {message}")]
    Listing { kind: String, message: String },

    /// A resolved scrape URL is not a valid URL.
    #[error("Invalid scrape URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// The provider factory rejected the URL.
    #[error("Provider for {resource} could not be built: {source}")]
    Provider {
        resource: String,
        #[source]
        source: CollectorError,
    },

    /// A discovery rule is unusable.
    #[error("Invalid discovery rule '{rule}': {message}")]
    Rule { rule: String, message: String },
}

impl DiscoveryError {
    pub fn listing(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Listing {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn rule(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rule {
            rule: rule.into(),
            message: message.into(),
        }
    }
}

impl From<DiscoveryError> for CollectorError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::Rule { .. } => CollectorError::ConfigValidation(err.to_string()),
            other => CollectorError::Provider(other.to_string()),
        }
    }
}
