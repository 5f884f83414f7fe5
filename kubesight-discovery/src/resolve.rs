//! Scrape URL resolution from a resource, its annotations and a rule.

use url::Url;

use crate::config::PrometheusRule;
use crate::error::{DiscoveryError, Result};
use crate::resource::Resource;

pub const SCRAPE_ANNOTATION: &str = "prometheus.io/scrape";
pub const SCHEME_ANNOTATION: &str = "prometheus.io/scheme";
pub const PORT_ANNOTATION: &str = "prometheus.io/port";
pub const PATH_ANNOTATION: &str = "prometheus.io/path";
pub const PREFIX_ANNOTATION: &str = "prometheus.io/prefix";
pub const SOURCE_ANNOTATION: &str = "prometheus.io/source";

const DEFAULT_SCHEME: &str = "http";
const DEFAULT_PATH: &str = "/metrics";

/// What resolution decided for a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Scrape this provider URI.
    Scrape(Url),
    /// Nothing to scrape: no IP, or no opt-in on the event path.
    Skip,
    /// The resource carries `prometheus.io/scrape: "false"`.
    OptOut,
}

/// Resolve the provider URI for `resource`.
///
/// With `check_annotation` the resource must opt in with
/// `prometheus.io/scrape: "true"`. Annotations win over rule fields, which win
/// over the defaults.
pub fn resolve(resource: &Resource, rule: &PrometheusRule, check_annotation: bool) -> Result<Resolution> {
    let scrape = resource.annotations.get(SCRAPE_ANNOTATION).map(String::as_str);
    if scrape == Some("false") {
        return Ok(Resolution::OptOut);
    }
    if resource.ip.is_empty() {
        return Ok(Resolution::Skip);
    }
    if check_annotation && scrape != Some("true") {
        return Ok(Resolution::Skip);
    }

    let scheme = annotation(resource, SCHEME_ANNOTATION)
        .or(rule.scheme.as_deref())
        .unwrap_or(DEFAULT_SCHEME);
    let port = port(resource, rule);
    let path = annotation(resource, PATH_ANNOTATION)
        .or(rule.path.as_deref())
        .unwrap_or(DEFAULT_PATH);
    let prefix = annotation(resource, PREFIX_ANNOTATION)
        .or(rule.prefix.as_deref())
        .unwrap_or("");
    let source = annotation(resource, SOURCE_ANNOTATION)
        .or(rule.source.as_deref())
        .unwrap_or(&resource.name);

    let host = if resource.ip.contains(':') {
        format!("[{}]", resource.ip)
    } else {
        resource.ip.clone()
    };
    let mut raw = format!("{}://{}", scheme, host);
    if let Some(port) = port {
        raw.push_str(&format!(":{}", port));
    }
    if !path.starts_with('/') {
        raw.push('/');
    }
    raw.push_str(path);

    let mut url = Url::parse(&raw).map_err(|e| DiscoveryError::InvalidUrl {
        url: raw.clone(),
        message: e.to_string(),
    })?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("source", source);
        query.append_pair("prefix", prefix);

        for (key, value) in tags(resource, rule) {
            query.append_pair("tag", &format!("{}:{}", key, value));
        }

        if let Some(interval) = &rule.collection_interval {
            query.append_pair("collectionInterval", interval);
        }
        if let Some(timeout) = &rule.timeout {
            query.append_pair("timeOut", timeout);
        }
        if rule.omit_bucket_suffix {
            query.append_pair("omitBucketSuffix", "true");
        }
    }

    Ok(Resolution::Scrape(url))
}

fn annotation<'a>(resource: &'a Resource, key: &str) -> Option<&'a str> {
    resource
        .annotations
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

fn port(resource: &Resource, rule: &PrometheusRule) -> Option<u16> {
    match annotation(resource, PORT_ANNOTATION) {
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                tracing::warn!(resource = %resource.key(), port = %raw, "Ignoring invalid port annotation");
                rule.port
            }
        },
        None => rule.port,
    }
}

/// Resource identity tags, then its labels in key order when requested.
/// Empty values are left out.
fn tags(resource: &Resource, rule: &PrometheusRule) -> Vec<(String, String)> {
    let mut tags = vec![
        ("kind".to_string(), resource.kind.to_string()),
        ("namespace".to_string(), resource.namespace.clone()),
        (format!("{}_name", resource.kind), resource.name.clone()),
    ];

    if rule.include_labels {
        let mut labels: Vec<_> = resource.labels.iter().collect();
        labels.sort();
        tags.extend(labels.into_iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    tags.retain(|(k, v)| !k.is_empty() && !v.is_empty());
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceType;

    fn pod() -> Resource {
        Resource::new(ResourceType::Pod, "default", "web-0")
            .with_ip("10.2.0.7")
            .with_label("app", "web")
    }

    fn scrape_url(resolution: Resolution) -> String {
        match resolution {
            Resolution::Scrape(url) => url.to_string(),
            other => panic!("expected a URL, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let url = scrape_url(resolve(&pod(), &PrometheusRule::new("web"), false).unwrap());
        assert_eq!(
            url,
            "http://10.2.0.7/metrics?source=web-0&prefix=&tag=kind%3Apod&tag=namespace%3Adefault&tag=pod_name%3Aweb-0"
        );
    }

    #[test]
    fn test_rule_fields() {
        let mut rule = PrometheusRule::new("web");
        rule.scheme = Some("https".to_string());
        rule.port = Some(9102);
        rule.path = Some("stats".to_string());
        rule.prefix = Some("kube.".to_string());
        rule.source = Some("frontend".to_string());
        rule.include_labels = true;
        rule.collection_interval = Some("30s".to_string());
        rule.timeout = Some("5s".to_string());
        rule.omit_bucket_suffix = true;

        let url = scrape_url(resolve(&pod(), &rule, false).unwrap());
        assert_eq!(
            url,
            "https://10.2.0.7:9102/stats?source=frontend&prefix=kube.&tag=kind%3Apod&tag=namespace%3Adefault\
             &tag=pod_name%3Aweb-0&tag=app%3Aweb&collectionInterval=30s&timeOut=5s&omitBucketSuffix=true"
        );
    }

    #[test]
    fn test_annotations_win() {
        let resource = pod()
            .with_annotation(SCRAPE_ANNOTATION, "true")
            .with_annotation(PORT_ANNOTATION, "8080")
            .with_annotation(PATH_ANNOTATION, "/prom")
            .with_annotation(SOURCE_ANNOTATION, "annotated");
        let mut rule = PrometheusRule::new("web");
        rule.port = Some(9102);
        rule.source = Some("frontend".to_string());

        let url = scrape_url(resolve(&resource, &rule, true).unwrap());
        assert!(url.starts_with("http://10.2.0.7:8080/prom?source=annotated&"));
    }

    #[test]
    fn test_invalid_port_annotation_falls_back() {
        let resource = pod().with_annotation(PORT_ANNOTATION, "metrics");
        let mut rule = PrometheusRule::new("web");
        rule.port = Some(9102);

        let url = scrape_url(resolve(&resource, &rule, false).unwrap());
        assert!(url.starts_with("http://10.2.0.7:9102/metrics?"));
    }

    #[test]
    fn test_annotation_check() {
        let rule = PrometheusRule::default();
        assert_eq!(resolve(&pod(), &rule, true).unwrap(), Resolution::Skip);

        let opted_in = pod().with_annotation(SCRAPE_ANNOTATION, "true");
        assert!(matches!(resolve(&opted_in, &rule, true).unwrap(), Resolution::Scrape(_)));

        let opted_out = pod().with_annotation(SCRAPE_ANNOTATION, "false");
        assert_eq!(resolve(&opted_out, &rule, true).unwrap(), Resolution::OptOut);
        assert_eq!(resolve(&opted_out, &rule, false).unwrap(), Resolution::OptOut);
    }

    #[test]
    fn test_requires_ip() {
        let resource = Resource::new(ResourceType::Pod, "default", "pending")
            .with_annotation(SCRAPE_ANNOTATION, "true");
        assert_eq!(
            resolve(&resource, &PrometheusRule::default(), true).unwrap(),
            Resolution::Skip
        );
    }

    #[test]
    fn test_ipv6_host() {
        let resource = pod().with_ip("fd00::7");
        let url = scrape_url(resolve(&resource, &PrometheusRule::new("web"), false).unwrap());
        assert!(url.starts_with("http://[fd00::7]/metrics?"));
    }

    #[test]
    fn test_empty_namespace_tag_dropped() {
        let resource = Resource::new(ResourceType::Service, "", "dns").with_ip("10.96.0.10");
        let url = scrape_url(resolve(&resource, &PrometheusRule::new("dns"), false).unwrap());
        assert!(!url.contains("namespace"));
        assert!(url.contains("tag=service_name%3Adns"));
    }

    #[test]
    fn test_deterministic() {
        let mut resource = pod();
        for i in 0..10 {
            resource = resource.with_label(format!("l{}", i), "x");
        }
        let mut rule = PrometheusRule::new("web");
        rule.include_labels = true;

        let first = resolve(&resource, &rule, false).unwrap();
        for _ in 0..5 {
            assert_eq!(resolve(&resource, &rule, false).unwrap(), first);
        }
    }
}
