//! Configuration trait shared by collector binaries.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::LoggingConfig;
use crate::error::{CollectorError, Result};

/// Implemented by the top-level configuration struct of a collector.
///
/// ```ignore
/// #[derive(Debug, Deserialize)]
/// pub struct Config {
///     #[serde(default)]
///     pub logging: LoggingConfig,
///     pub discovery: DiscoveryConfig,
/// }
///
/// impl CollectorConfig for Config {
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
///
///     fn validate(&self) -> Result<()> {
///         if self.discovery.rules.is_empty() {
///             return Err(CollectorError::validation("no discovery rules"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait CollectorConfig: Sized + DeserializeOwned {
    fn logging(&self) -> &LoggingConfig;

    /// Called by [`load`](Self::load) after parsing.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Load a JSON5 file and validate it.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(CollectorError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse JSON5 text and validate it.
    fn parse(content: &str) -> Result<Self> {
        let config: Self = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}
