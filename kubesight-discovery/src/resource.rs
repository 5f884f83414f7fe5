//! Cluster resources as seen by discovery.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kinds of resource discovery knows how to scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    #[default]
    Pod,
    Service,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Pod => "pod",
            ResourceType::Service => "service",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pod" => Ok(ResourceType::Pod),
            "service" => Ok(ResourceType::Service),
            other => Err(format!("unknown resource type '{}'", other)),
        }
    }
}

/// A pod or service, reduced to what scrape resolution needs.
///
/// `ip` is the pod IP or the service cluster IP; it is empty while the
/// resource has none assigned yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub kind: ResourceType,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub ip: String,
}

impl Resource {
    pub fn new(kind: ResourceType, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Registration key: `<kind>/<namespace>/<name>`.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.kind, self.namespace, self.name)
    }

    /// True if every selector entry is present with the same value.
    pub fn matches_labels(&self, selector: &HashMap<String, String>) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.labels.get(k).is_some_and(|l| l == v))
    }
}

/// Lifecycle notification from the cluster watch.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    Added(Resource),
    Updated(Resource),
    Deleted(Resource),
}

impl ResourceEvent {
    pub fn resource(&self) -> &Resource {
        match self {
            ResourceEvent::Added(r) | ResourceEvent::Updated(r) | ResourceEvent::Deleted(r) => r,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_parse() {
        assert_eq!("pod".parse::<ResourceType>().unwrap(), ResourceType::Pod);
        assert_eq!("Service".parse::<ResourceType>().unwrap(), ResourceType::Service);
        assert!("node".parse::<ResourceType>().is_err());
        assert_eq!(ResourceType::default(), ResourceType::Pod);
    }

    #[test]
    fn test_key_is_qualified() {
        let pod = Resource::new(ResourceType::Pod, "default", "web");
        let svc = Resource::new(ResourceType::Service, "default", "web");
        assert_eq!(pod.key(), "pod/default/web");
        assert_ne!(pod.key(), svc.key());
    }

    #[test]
    fn test_matches_labels() {
        let pod = Resource::new(ResourceType::Pod, "default", "web-0")
            .with_label("app", "web")
            .with_label("tier", "frontend");

        assert!(pod.matches_labels(&HashMap::new()));
        assert!(pod.matches_labels(&HashMap::from([("app".to_string(), "web".to_string())])));
        assert!(!pod.matches_labels(&HashMap::from([("app".to_string(), "db".to_string())])));
    }

    #[test]
    fn test_event_resource() {
        let pod = Resource::new(ResourceType::Pod, "default", "web-0");
        assert_eq!(ResourceEvent::Deleted(pod.clone()).resource(), &pod);
    }
}
