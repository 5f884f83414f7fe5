use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

const ZENOH_MODES: [&str; 3] = ["client", "peer", "router"];

/// Zenoh session settings for the sink.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZenohConfig {
    /// One of `client`, `peer` or `router` (default: peer).
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Routers or peers to connect to, e.g. `tcp/zenoh-router:7447`.
    #[serde(default)]
    pub connect: Vec<String>,

    #[serde(default)]
    pub listen: Vec<String>,
}

fn default_mode() -> String {
    "peer".to_string()
}

impl Default for ZenohConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            connect: Vec::new(),
            listen: Vec::new(),
        }
    }
}

impl ZenohConfig {
    /// Reject unknown modes and endpoints without a `<proto>/` locator prefix.
    pub fn validate(&self) -> Result<()> {
        if !ZENOH_MODES.contains(&self.mode.as_str()) {
            return Err(Error::Config(format!(
                "Invalid Zenoh mode: '{}'. Expected one of {:?}",
                self.mode, ZENOH_MODES
            )));
        }
        for endpoint in self.connect.iter().chain(&self.listen) {
            let valid = endpoint
                .split_once('/')
                .is_some_and(|(proto, addr)| !proto.is_empty() && !addr.is_empty());
            if !valid {
                return Err(Error::Config(format!(
                    "Invalid Zenoh endpoint '{}', expected e.g. 'tcp/host:7447'",
                    endpoint
                )));
            }
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per line, for log shippers.
    Json,
}

/// `logging` section shared by every binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive such as `info` or `kubesight_discovery=debug,info`.
    /// `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Deserialize a JSON5 document. Used for whole files as well as single
/// sections.
pub fn parse_config<T: DeserializeOwned>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Sections {
        #[serde(default)]
        zenoh: ZenohConfig,
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_sections_default_when_absent() {
        let config: Sections = parse_config("{}").unwrap();

        assert_eq!(config.zenoh, ZenohConfig::default());
        assert!(config.zenoh.validate().is_ok());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_client_section() {
        let config: Sections = parse_config(
            r#"{
                // comments and trailing commas are fine
                zenoh: { mode: "client", connect: ["tcp/zenoh-router:7447"], },
                logging: { level: "kubesight_discovery=debug,info", format: "json" },
            }"#,
        )
        .unwrap();

        assert_eq!(config.zenoh.connect, vec!["tcp/zenoh-router:7447"]);
        assert!(config.zenoh.validate().is_ok());
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_zenoh_validation() {
        let config = ZenohConfig {
            mode: "mesh".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ZenohConfig {
            connect: vec!["zenoh-router:7447".to_string()],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("zenoh-router:7447"));
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let result: Result<Sections> = parse_config("{ zenoh: ");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
