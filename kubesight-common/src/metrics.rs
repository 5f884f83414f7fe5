//! Canonical metric data model shared by sources, processors and sinks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::interner::StringInterner;

/// How successive values of a metric relate to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// Monotonically increasing since the collection start time.
    #[default]
    Cumulative,
    /// Instantaneous value.
    Gauge,
    /// Change since the previous sample.
    Delta,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Cumulative => "cumulative",
            MetricType::Gauge => "gauge",
            MetricType::Delta => "delta",
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage type of a [`MetricValue`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Int64,
    Float,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Int64 => "int64",
            ValueType::Float => "double",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unit of a metric value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitsType {
    /// A counter metric.
    #[default]
    Count,
    /// A metric in bytes.
    Bytes,
    /// A metric in milliseconds.
    Milliseconds,
    /// A metric in nanoseconds.
    Nanoseconds,
    /// A metric in millicores.
    Millicores,
}

impl UnitsType {
    /// Unit suffix, empty for plain counts.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitsType::Count => "",
            UnitsType::Bytes => "bytes",
            UnitsType::Milliseconds => "ms",
            UnitsType::Nanoseconds => "ns",
            UnitsType::Millicores => "millicores",
        }
    }
}

/// A single typed metric value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub int_value: i64,
    pub float_value: f64,
    pub metric_type: MetricType,
    pub value_type: ValueType,
}

impl MetricValue {
    /// An integer value.
    pub fn int(value: i64, metric_type: MetricType) -> Self {
        Self {
            int_value: value,
            float_value: 0.0,
            metric_type,
            value_type: ValueType::Int64,
        }
    }

    /// A floating point value.
    pub fn float(value: f64, metric_type: MetricType) -> Self {
        Self {
            int_value: 0,
            float_value: value,
            metric_type,
            value_type: ValueType::Float,
        }
    }

    /// The value widened to `f64`, whichever representation is active.
    pub fn as_f64(&self) -> f64 {
        match self.value_type {
            ValueType::Int64 => self.int_value as f64,
            ValueType::Float => self.float_value,
        }
    }
}

/// A named metric value carrying its own labels (e.g. per-filesystem usage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledMetric {
    pub name: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    #[serde(flatten)]
    pub value: MetricValue,
}

/// All metrics collected for one entity (node, pod, container...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    /// Since when metrics are collected for this entity. Resets when the
    /// entity or the host agent restarts.
    pub collection_start_time: DateTime<Utc>,
    /// When the entity was created. Survives restarts.
    pub entity_create_time: DateTime<Utc>,
    /// Timestamp of this sample.
    pub scrape_time: DateTime<Utc>,
    #[serde(default)]
    pub metric_values: HashMap<String, MetricValue>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub labeled_metrics: Vec<LabeledMetric>,
}

impl MetricSet {
    /// An empty set whose three time markers all start at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            collection_start_time: now,
            entity_create_time: now,
            scrape_time: now,
            metric_values: HashMap::new(),
            labels: HashMap::new(),
            labeled_metrics: Vec::new(),
        }
    }
}

/// The unit of data handed between pipeline stages for one collection cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBatch {
    pub timestamp: DateTime<Utc>,
    /// Multi-metric entities keyed by a stable identity (e.g. `namespace:ns/pod:name`).
    pub metric_sets: HashMap<String, MetricSet>,
    /// Flat single-value timeseries.
    pub metric_points: Vec<MetricPoint>,
}

impl DataBatch {
    /// An empty batch stamped with `timestamp`.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            metric_sets: HashMap::new(),
            metric_points: Vec::new(),
        }
    }

    /// A batch carrying only flat points.
    pub fn from_points(timestamp: DateTime<Utc>, metric_points: Vec<MetricPoint>) -> Self {
        Self {
            timestamp,
            metric_sets: HashMap::new(),
            metric_points,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metric_sets.is_empty() && self.metric_points.is_empty()
    }

    /// Fold another batch into this one. Later metric sets replace earlier
    /// ones with the same key.
    pub fn merge(&mut self, other: DataBatch) {
        self.metric_sets.extend(other.metric_sets);
        self.metric_points.extend(other.metric_points);
    }

    /// Flatten the batch into exportable points.
    ///
    /// Metric set values become points whose source is the set key and whose
    /// tags are the set labels, merged with per-metric labels for labeled
    /// metrics.
    pub fn exported_points(&self) -> Vec<ExportedPoint> {
        let mut out: Vec<ExportedPoint> = self.metric_points.iter().map(MetricPoint::export).collect();

        for (key, set) in &self.metric_sets {
            let timestamp = set.scrape_time.timestamp();
            for (name, value) in &set.metric_values {
                out.push(ExportedPoint {
                    metric: name.clone(),
                    value: value.as_f64(),
                    timestamp,
                    source: key.clone(),
                    tags: set.labels.clone(),
                });
            }
            for labeled in &set.labeled_metrics {
                let mut tags = set.labels.clone();
                tags.extend(labeled.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
                out.push(ExportedPoint {
                    metric: labeled.name.clone(),
                    value: labeled.value.as_f64(),
                    timestamp,
                    source: key.clone(),
                    tags,
                });
            }
        }

        out
    }
}

/// An interned tag. Both halves point into the interner of the translation
/// pass that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelPair {
    pub name: Arc<str>,
    pub value: Arc<str>,
}

impl LabelPair {
    pub fn new(name: Arc<str>, value: Arc<str>) -> Self {
        Self { name, value }
    }
}

/// One normalized timeseries observation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    /// Dotted metric name, prefix included.
    pub metric: String,
    pub value: f64,
    /// Unix seconds.
    pub timestamp: i64,
    pub source: String,
    /// Tags set directly on the point.
    pub tags: HashMap<String, String>,
    label_pairs: Vec<LabelPair>,
}

impl MetricPoint {
    pub fn new(
        metric: impl Into<String>,
        value: f64,
        timestamp: i64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            metric: metric.into(),
            value,
            timestamp,
            source: source.into(),
            tags: HashMap::new(),
            label_pairs: Vec::new(),
        }
    }

    /// Add a direct tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Replace the interned label pairs of this point.
    pub fn set_label_pairs(&mut self, pairs: Vec<LabelPair>) {
        self.label_pairs = pairs;
    }

    pub fn label_pairs(&self) -> &[LabelPair] {
        &self.label_pairs
    }

    /// Build the key-unique tag map of this point.
    ///
    /// Direct tags are inserted first and label pairs second, so a label pair
    /// overrides a direct tag with the same key. A fresh map is built on every
    /// call.
    pub fn tags(&self) -> HashMap<String, String> {
        let mut tags = HashMap::with_capacity(self.tags.len() + self.label_pairs.len());
        for (k, v) in &self.tags {
            tags.insert(k.clone(), v.clone());
        }
        for pair in &self.label_pairs {
            tags.insert(pair.name.to_string(), pair.value.to_string());
        }
        tags
    }

    /// Wire-adjacent view of this point used by sinks.
    pub fn export(&self) -> ExportedPoint {
        ExportedPoint {
            metric: self.metric.clone(),
            value: self.value,
            timestamp: self.timestamp,
            source: self.source.clone(),
            tags: self.tags(),
        }
    }
}

/// Serializable shape of a [`MetricPoint`] with its tags resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedPoint {
    pub metric: String,
    pub value: f64,
    /// Unix seconds.
    pub timestamp: i64,
    pub source: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
}

/// Key-unique tag map under construction.
///
/// Empty keys and empty values never enter the set. The type deliberately has
/// no `Clone`: deriving per-point variants goes through [`TagSet::branch`], so
/// every copy is visible at the call site.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: HashMap<String, String>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tags: HashMap::with_capacity(capacity),
        }
    }

    /// Insert a tag, overriding any previous value. Returns `false` when the
    /// tag was rejected for having an empty key or value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        let value = value.into();
        if key.is_empty() || value.is_empty() {
            return false;
        }
        self.tags.insert(key, value);
        true
    }

    /// Independent copy with room for one more tag.
    pub fn branch(&self) -> Self {
        let mut tags = HashMap::with_capacity(self.tags.len() + 1);
        tags.extend(self.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { tags }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.tags
    }

    /// Convert to interned pairs, sorted by name for a stable order.
    pub fn to_label_pairs(&self, interner: &mut StringInterner) -> Vec<LabelPair> {
        let mut pairs: Vec<LabelPair> = self
            .tags
            .iter()
            .map(|(k, v)| LabelPair::new(interner.intern(k), interner.intern(v)))
            .collect();
        pairs.sort_by(|a, b| a.name.cmp(&b.name));
        pairs
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// Current time in seconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch (should never happen in practice).
pub fn current_timestamp_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> MetricPoint {
        MetricPoint::new("test", 1.0, 0, "test.source")
    }

    fn pair(name: &str, value: &str) -> LabelPair {
        LabelPair::new(Arc::from(name), Arc::from(value))
    }

    #[test]
    fn test_empty_tags() {
        assert_eq!(point().tags(), HashMap::new());
    }

    #[test]
    fn test_tags_from_label_pairs() {
        let mut p = point();
        p.set_label_pairs(vec![pair("name", "value")]);

        let expected: HashMap<String, String> =
            [("name".to_string(), "value".to_string())].into_iter().collect();
        assert_eq!(p.tags(), expected);
    }

    #[test]
    fn test_tags_from_multiple_label_pairs() {
        let mut p = point();
        p.set_label_pairs(vec![pair("name", "value"), pair("name2", "value2")]);

        let tags = p.tags();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get("name"), Some(&"value".to_string()));
        assert_eq!(tags.get("name2"), Some(&"value2".to_string()));
    }

    #[test]
    fn test_tags_from_direct_tags() {
        let p = point().with_tag("name", "value");
        assert_eq!(p.tags().get("name"), Some(&"value".to_string()));
    }

    #[test]
    fn test_tags_merge_direct_and_label_pairs() {
        let mut p = point().with_tag("tag", "tag_value");
        p.set_label_pairs(vec![pair("label_pair", "label_pair_value")]);

        let tags = p.tags();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get("tag"), Some(&"tag_value".to_string()));
        assert_eq!(tags.get("label_pair"), Some(&"label_pair_value".to_string()));
    }

    #[test]
    fn test_label_pair_overrides_direct_tag() {
        let mut p = point().with_tag("env", "direct");
        p.set_label_pairs(vec![pair("env", "pair")]);

        assert_eq!(p.tags().get("env"), Some(&"pair".to_string()));
    }

    #[test]
    fn test_set_label_pairs_replaces() {
        let mut p = point();
        p.set_label_pairs(vec![pair("a", "1"), pair("b", "2")]);
        p.set_label_pairs(vec![pair("c", "3")]);

        let tags = p.tags();
        assert_eq!(tags.len(), 1);
        assert!(tags.contains_key("c"));
    }

    #[test]
    fn test_tag_set_rejects_empty() {
        let mut tags = TagSet::new();
        assert!(!tags.insert("env", ""));
        assert!(!tags.insert("", "prod"));
        assert!(tags.insert("env", "prod"));
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn test_tag_set_branch_is_independent() {
        let base: TagSet = [("job", "api")].into_iter().collect();
        let mut first = base.branch();
        let mut second = base.branch();

        first.insert("quantile", "0.5");
        second.insert("quantile", "0.99");

        assert_eq!(base.get("quantile"), None);
        assert_eq!(first.get("quantile"), Some("0.5"));
        assert_eq!(second.get("quantile"), Some("0.99"));
        assert_eq!(first.get("job"), Some("api"));
    }

    #[test]
    fn test_to_label_pairs_interns() {
        let mut interner = StringInterner::new();
        let a: TagSet = [("namespace", "default")].into_iter().collect();
        let b: TagSet = [("namespace", "default")].into_iter().collect();

        let pa = a.to_label_pairs(&mut interner);
        let pb = b.to_label_pairs(&mut interner);

        assert!(Arc::ptr_eq(&pa[0].name, &pb[0].name));
        assert!(Arc::ptr_eq(&pa[0].value, &pb[0].value));
    }

    #[test]
    fn test_metric_value_as_f64() {
        assert_eq!(MetricValue::int(42, MetricType::Gauge).as_f64(), 42.0);
        assert_eq!(MetricValue::float(1.5, MetricType::Cumulative).as_f64(), 1.5);
    }

    #[test]
    fn test_batch_merge() {
        let now = Utc::now();
        let mut batch = DataBatch::from_points(now, vec![point()]);
        let mut other = DataBatch::new(now);
        other
            .metric_sets
            .insert("namespace:default/pod:web".to_string(), MetricSet::new(now));

        batch.merge(other);

        assert_eq!(batch.metric_points.len(), 1);
        assert_eq!(batch.metric_sets.len(), 1);
        assert!(!batch.is_empty());
        assert!(DataBatch::new(now).is_empty());
    }

    #[test]
    fn test_exported_points_flatten_sets() {
        let now = Utc::now();
        let mut set = MetricSet::new(now);
        set.labels.insert("pod".to_string(), "web".to_string());
        set.metric_values
            .insert("cpu/usage".to_string(), MetricValue::int(7, MetricType::Cumulative));
        set.labeled_metrics.push(LabeledMetric {
            name: "filesystem/usage".to_string(),
            labels: [("device".to_string(), "sda1".to_string())].into_iter().collect(),
            value: MetricValue::float(2.5, MetricType::Gauge),
        });

        let mut batch = DataBatch::from_points(now, vec![point()]);
        batch.metric_sets.insert("pod:web".to_string(), set);

        let points = batch.exported_points();
        assert_eq!(points.len(), 3);

        let cpu = points.iter().find(|p| p.metric == "cpu/usage").unwrap();
        assert_eq!(cpu.value, 7.0);
        assert_eq!(cpu.source, "pod:web");
        assert_eq!(cpu.tags.get("pod"), Some(&"web".to_string()));

        let fs = points.iter().find(|p| p.metric == "filesystem/usage").unwrap();
        assert_eq!(fs.tags.len(), 2);
        assert_eq!(fs.tags.get("device"), Some(&"sda1".to_string()));
    }

    #[test]
    fn test_export_resolves_tags() {
        let mut p = MetricPoint::new("http.requests.gauge", 5.0, 100, "node1");
        p.set_label_pairs(vec![pair("code", "200")]);

        let exported = p.export();
        assert_eq!(exported.metric, "http.requests.gauge");
        assert_eq!(exported.source, "node1");
        assert_eq!(exported.tags.get("code"), Some(&"200".to_string()));
    }
}
