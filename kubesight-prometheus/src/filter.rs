//! Glob based metric filtering, used as the translator predicate.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PrometheusError, Result};
use crate::point_builder::MetricPredicate;

/// Filter configuration. Every list is optional; an empty filter keeps
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Glob patterns a metric name must match (empty = all).
    #[serde(default)]
    pub metric_allow_list: Vec<String>,

    /// Glob patterns of metric names to drop.
    #[serde(default)]
    pub metric_deny_list: Vec<String>,

    /// Per tag name, glob patterns of which one value must match (empty = all).
    #[serde(default)]
    pub tag_allow_list: HashMap<String, Vec<String>>,

    /// Per tag name, glob patterns of values to drop.
    #[serde(default)]
    pub tag_deny_list: HashMap<String, Vec<String>>,

    /// Glob patterns of tag names that disqualify a point.
    #[serde(default)]
    pub tag_key_deny_list: Vec<String>,
}

impl FilterConfig {
    pub fn is_empty(&self) -> bool {
        self.metric_allow_list.is_empty()
            && self.metric_deny_list.is_empty()
            && self.tag_allow_list.is_empty()
            && self.tag_deny_list.is_empty()
            && self.tag_key_deny_list.is_empty()
    }
}

/// Compiled [`FilterConfig`].
#[derive(Debug, Clone, Default)]
pub struct MetricFilter {
    metric_allow: Vec<glob::Pattern>,
    metric_deny: Vec<glob::Pattern>,
    tag_allow: Vec<(String, Vec<glob::Pattern>)>,
    tag_deny: Vec<(String, Vec<glob::Pattern>)>,
    tag_key_deny: Vec<glob::Pattern>,
}

impl MetricFilter {
    /// Compile a filter. Fails on the first pattern that is not a valid glob.
    pub fn new(config: &FilterConfig) -> Result<Self> {
        Ok(Self {
            metric_allow: compile(&config.metric_allow_list)?,
            metric_deny: compile(&config.metric_deny_list)?,
            tag_allow: compile_keyed(&config.tag_allow_list)?,
            tag_deny: compile_keyed(&config.tag_deny_list)?,
            tag_key_deny: compile(&config.tag_key_deny_list)?,
        })
    }

    /// Check if a point with this name and tags should be kept.
    pub fn should_include(&self, name: &str, tags: &HashMap<String, String>) -> bool {
        if !self.metric_allow.is_empty() && !self.metric_allow.iter().any(|p| p.matches(name)) {
            return false;
        }
        if self.metric_deny.iter().any(|p| p.matches(name)) {
            return false;
        }

        if !self.tag_allow.is_empty() && !any_tag_matches(&self.tag_allow, tags) {
            return false;
        }
        if any_tag_matches(&self.tag_deny, tags) {
            return false;
        }

        if tags
            .keys()
            .any(|k| self.tag_key_deny.iter().any(|p| p.matches(k)))
        {
            return false;
        }

        true
    }

    /// Wrap the filter as a translator predicate.
    pub fn into_predicate(self) -> Arc<MetricPredicate> {
        Arc::new(move |name: &str, tags: &HashMap<String, String>| self.should_include(name, tags))
    }
}

fn any_tag_matches(rules: &[(String, Vec<glob::Pattern>)], tags: &HashMap<String, String>) -> bool {
    rules.iter().any(|(key, patterns)| {
        tags.get(key)
            .is_some_and(|value| patterns.iter().any(|p| p.matches(value)))
    })
}

fn compile(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| PrometheusError::Pattern {
                pattern: p.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

fn compile_keyed(rules: &HashMap<String, Vec<String>>) -> Result<Vec<(String, Vec<glob::Pattern>)>> {
    let mut compiled: Vec<(String, Vec<glob::Pattern>)> = rules
        .iter()
        .map(|(key, patterns)| Ok((key.clone(), compile(patterns)?)))
        .collect::<Result<_>>()?;
    compiled.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(compiled)
}
