/// Default key expression prefix for everything KubeSight publishes.
pub const KEY_PREFIX: &str = "kubesight";

/// Builder for the key expressions exported points are published under.
///
/// Key expressions follow the pattern:
/// `<prefix>/metrics/<source>/<metric>`
#[derive(Debug, Clone)]
pub struct KeyExprBuilder {
    prefix: String,
}

impl Default for KeyExprBuilder {
    fn default() -> Self {
        Self::new(KEY_PREFIX)
    }
}

impl KeyExprBuilder {
    /// Create a builder with a custom prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build the key for one point.
    ///
    /// # Example
    /// ```
    /// use kubesight_common::keyexpr::KeyExprBuilder;
    ///
    /// let key = KeyExprBuilder::default().metric_key("web-7d9f", "http.requests.counter");
    /// assert_eq!(key, "kubesight/metrics/web-7d9f/http.requests.counter");
    /// ```
    pub fn metric_key(&self, source: &str, metric: &str) -> String {
        format!(
            "{}/metrics/{}/{}",
            self.prefix,
            sanitize_chunk(source),
            sanitize_chunk(metric)
        )
    }

    /// Wildcard matching every point of a source.
    pub fn source_wildcard(&self, source: &str) -> String {
        format!("{}/metrics/{}/*", self.prefix, sanitize_chunk(source))
    }

    /// Key the collector publishes its status on.
    pub fn status_key(&self) -> String {
        format!("{}/@/status", self.prefix)
    }
}

/// Build a wildcard key expression for all KubeSight metrics.
///
/// # Example
/// ```
/// use kubesight_common::keyexpr::all_metrics_wildcard;
///
/// assert_eq!(all_metrics_wildcard(), "kubesight/metrics/**");
/// ```
pub fn all_metrics_wildcard() -> String {
    format!("{}/metrics/**", KEY_PREFIX)
}

/// Replace characters that would split or glob a key chunk.
fn sanitize_chunk(chunk: &str) -> String {
    if chunk.is_empty() {
        return "_".to_string();
    }
    chunk
        .chars()
        .map(|c| match c {
            '/' | '*' | '$' | '?' | '#' => '_',
            c => c,
        })
        .collect()
}

/// Parsed components of a metric key expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKeyExpr<'a> {
    pub source: &'a str,
    pub metric: &'a str,
}

/// Split a metric key back into source and metric.
///
/// Returns `None` if the key doesn't match `<prefix>/metrics/<source>/<metric>`.
pub fn parse_key_expr<'a>(prefix: &str, key: &'a str) -> Option<ParsedKeyExpr<'a>> {
    let rest = key.strip_prefix(prefix)?.strip_prefix("/metrics/")?;
    let (source, metric) = rest.split_once('/')?;
    if source.is_empty() || metric.is_empty() || metric.contains('/') {
        return None;
    }
    Some(ParsedKeyExpr { source, metric })
}
