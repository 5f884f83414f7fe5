//! Resource listing.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::resource::{Resource, ResourceType};

/// Lists cluster resources by namespace and label selector.
///
/// An empty namespace means all namespaces; an empty selector matches
/// everything.
#[async_trait]
pub trait ResourceLister: Send + Sync {
    async fn list(
        &self,
        kind: ResourceType,
        namespace: &str,
        selector: &HashMap<String, String>,
    ) -> Result<Vec<Resource>>;
}

/// In-memory lister over a fixed set of resources.
///
/// Used when the collector runs outside a cluster, with resources taken from
/// the configuration file.
#[derive(Debug, Default)]
pub struct StaticLister {
    resources: Vec<Resource>,
}

impl StaticLister {
    pub fn new(resources: Vec<Resource>) -> Self {
        Self { resources }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[async_trait]
impl ResourceLister for StaticLister {
    async fn list(
        &self,
        kind: ResourceType,
        namespace: &str,
        selector: &HashMap<String, String>,
    ) -> Result<Vec<Resource>> {
        Ok(self
            .resources
            .iter()
            .filter(|r| r.kind == kind)
            .filter(|r| namespace.is_empty() || r.namespace == namespace)
            .filter(|r| r.matches_labels(selector))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lister() -> StaticLister {
        StaticLister::new(vec![
            Resource::new(ResourceType::Pod, "default", "web-0").with_label("app", "web"),
            Resource::new(ResourceType::Pod, "default", "db-0").with_label("app", "db"),
            Resource::new(ResourceType::Pod, "prod", "web-1").with_label("app", "web"),
            Resource::new(ResourceType::Service, "default", "web").with_label("app", "web"),
        ])
    }

    #[tokio::test]
    async fn test_list_filters() {
        let lister = lister();
        let web = HashMap::from([("app".to_string(), "web".to_string())]);

        let pods = lister.list(ResourceType::Pod, "", &web).await.unwrap();
        assert_eq!(pods.len(), 2);

        let pods = lister.list(ResourceType::Pod, "default", &web).await.unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].name, "web-0");

        let all = lister
            .list(ResourceType::Pod, "default", &HashMap::new())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let services = lister.list(ResourceType::Service, "", &web).await.unwrap();
        assert_eq!(services.len(), 1);
    }

    #[test]
    fn test_len() {
        assert_eq!(lister().len(), 4);
        assert!(StaticLister::default().is_empty());
    }
}
