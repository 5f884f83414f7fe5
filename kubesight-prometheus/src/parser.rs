//! Prometheus text exposition parser (format 0.0.4).
//!
//! Produces one [`MetricFamily`] per metric name. Histogram and summary
//! series (`_bucket`, `_sum`, `_count`, `quantile`) are folded into a single
//! sample per label set. Sample timestamps are accepted and ignored.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{PrometheusError, Result};
use crate::family::{Bucket, MetricFamily, MetricKind, Quantile, Sample, SampleValue};

/// `name{labels} value [timestamp]`
static SAMPLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z_:][a-zA-Z0-9_:]*)\s*(?:\{(.*)\})?\s+(\S+)(?:\s+(-?\d+))?\s*$").unwrap()
});

/// One `name="value"` pair inside the braces.
static LABEL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*=\s*"((?:[^"\\]|\\.)*)"\s*(?:,|$)"#).unwrap()
});

/// `# HELP name text` or `# TYPE name kind`
static META_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#\s*(HELP|TYPE)\s+([a-zA-Z_:][a-zA-Z0-9_:]*)(?:\s+(.*))?$").unwrap());

/// Result of parsing one exposition body.
#[derive(Debug, Default)]
pub struct Exposition {
    pub families: HashMap<String, MetricFamily>,
    /// Sample lines skipped because they could not be read.
    pub malformed: usize,
}

/// Parse a full exposition body.
///
/// A bad sample line is logged and skipped. The body is only rejected when
/// it has sample lines and none of them could be read.
pub fn parse(text: &str) -> Result<Exposition> {
    let mut builder = Builder::default();
    let mut accepted = 0usize;
    let mut malformed = 0usize;
    let mut first_error = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('#') {
            if let Some(caps) = META_REGEX.captures(line) {
                let name = &caps[2];
                let rest = caps.get(3).map(|m| m.as_str().trim()).unwrap_or("");
                match &caps[1] {
                    "HELP" => builder.help(name, unescape_help(rest)),
                    _ => builder.declare(name, MetricKind::from_type_token(rest)),
                }
            }
            continue;
        }

        match parse_sample(&mut builder, line) {
            Ok(()) => accepted += 1,
            Err(message) => {
                tracing::debug!(line = idx + 1, error = %message, "Skipping malformed sample");
                malformed += 1;
                if first_error.is_none() {
                    first_error = Some(PrometheusError::parse(idx + 1, message));
                }
            }
        }
    }

    if accepted == 0 {
        if let Some(err) = first_error {
            return Err(err);
        }
    }

    Ok(Exposition {
        families: builder.finish(),
        malformed,
    })
}

fn parse_sample(builder: &mut Builder, line: &str) -> std::result::Result<(), String> {
    let caps = SAMPLE_REGEX
        .captures(line)
        .ok_or_else(|| "not a sample line".to_string())?;

    let name = &caps[1];
    let labels = match caps.get(2) {
        Some(body) => parse_labels(body.as_str())?,
        None => HashMap::new(),
    };
    let value =
        parse_value(&caps[3]).ok_or_else(|| format!("invalid value '{}'", &caps[3]))?;

    builder.sample(name, labels, value)
}

/// Parse a sample value, accepting the `+Inf`, `-Inf` and `NaN` spellings.
pub fn parse_value(s: &str) -> Option<f64> {
    match s {
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        other => other.parse::<f64>().ok(),
    }
}

fn parse_labels(body: &str) -> std::result::Result<HashMap<String, String>, String> {
    let mut labels = HashMap::new();
    let mut rest = body.trim();

    while !rest.is_empty() {
        let caps = LABEL_REGEX
            .captures(rest)
            .ok_or_else(|| format!("malformed labels near '{}'", rest))?;
        labels.insert(caps[1].to_string(), unescape_label(&caps[2]));
        rest = rest[caps[0].len()..].trim_start();
    }

    Ok(labels)
}

fn unescape_label(s: &str) -> String {
    unescape(s, true)
}

fn unescape_help(s: &str) -> String {
    unescape(s, false)
}

fn unescape(s: &str, quotes: bool) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some('"') if quotes => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Label set of a sample without the `le`/`quantile` label, in a hashable form.
type GroupKey = Vec<(String, String)>;

#[derive(Default)]
struct Group {
    labels: HashMap<String, String>,
    buckets: Vec<Bucket>,
    quantiles: Vec<Quantile>,
    count: u64,
    sum: f64,
}

#[derive(Default)]
struct FamilyState {
    help: String,
    kind: MetricKind,
    scalars: Vec<Sample>,
    groups: Vec<Group>,
    group_index: HashMap<GroupKey, usize>,
}

impl FamilyState {
    fn group(&mut self, labels: HashMap<String, String>) -> &mut Group {
        let mut key: GroupKey = labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        key.sort();

        let idx = match self.group_index.get(&key) {
            Some(idx) => *idx,
            None => {
                self.groups.push(Group {
                    labels,
                    ..Default::default()
                });
                self.group_index.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        &mut self.groups[idx]
    }
}

#[derive(Default)]
struct Builder {
    families: HashMap<String, FamilyState>,
    order: Vec<String>,
}

impl Builder {
    fn family(&mut self, name: &str) -> &mut FamilyState {
        if !self.families.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.families.entry(name.to_string()).or_default()
    }

    fn help(&mut self, name: &str, help: String) {
        self.family(name).help = help;
    }

    fn declare(&mut self, name: &str, kind: MetricKind) {
        self.family(name).kind = kind;
    }

    fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.families.get(name).map(|f| f.kind)
    }

    /// Route one series to the family it belongs to.
    fn sample(
        &mut self,
        name: &str,
        mut labels: HashMap<String, String>,
        value: f64,
    ) -> std::result::Result<(), String> {
        for (suffix, is_bucket, is_count) in [
            ("_bucket", true, false),
            ("_count", false, true),
            ("_sum", false, false),
        ] {
            let Some(base) = name.strip_suffix(suffix) else {
                continue;
            };
            let kind = self.kind_of(base);
            let complex = matches!(kind, Some(MetricKind::Histogram))
                || (!is_bucket && matches!(kind, Some(MetricKind::Summary)));
            if !complex {
                continue;
            }

            let family = self.family(base);
            if is_bucket {
                let le = labels
                    .remove("le")
                    .ok_or_else(|| format!("{} without le label", name))?;
                let upper_bound =
                    parse_value(&le).ok_or_else(|| format!("invalid le '{}'", le))?;
                let cumulative_count = as_count(name, value)?;
                family.group(labels).buckets.push(Bucket {
                    upper_bound,
                    cumulative_count,
                });
            } else if is_count {
                let count = as_count(name, value)?;
                family.group(labels).count = count;
            } else {
                family.group(labels).sum = value;
            }
            return Ok(());
        }

        let family = self.family(name);
        match family.kind {
            MetricKind::Summary => {
                let q = labels
                    .remove("quantile")
                    .ok_or_else(|| format!("{} without quantile label", name))?;
                let quantile = parse_value(&q).ok_or_else(|| format!("invalid quantile '{}'", q))?;
                family.group(labels).quantiles.push(Quantile { quantile, value });
            }
            MetricKind::Histogram => {
                return Err(format!("bare sample {} in histogram family", name));
            }
            MetricKind::Counter => family.scalars.push(Sample {
                labels,
                value: SampleValue::Counter(value),
            }),
            MetricKind::Gauge => family.scalars.push(Sample {
                labels,
                value: SampleValue::Gauge(value),
            }),
            MetricKind::Untyped => family.scalars.push(Sample {
                labels,
                value: SampleValue::Untyped(value),
            }),
        }
        Ok(())
    }

    fn finish(mut self) -> HashMap<String, MetricFamily> {
        let mut out = HashMap::with_capacity(self.order.len());

        for name in self.order {
            let Some(state) = self.families.remove(&name) else {
                continue;
            };

            let mut samples = state.scalars;
            for group in state.groups {
                let value = match state.kind {
                    MetricKind::Histogram => SampleValue::Histogram {
                        buckets: group.buckets,
                        sample_count: group.count,
                        sample_sum: group.sum,
                    },
                    _ => SampleValue::Summary {
                        quantiles: group.quantiles,
                        sample_count: group.count,
                        sample_sum: group.sum,
                    },
                };
                samples.push(Sample {
                    labels: group.labels,
                    value,
                });
            }

            if samples.is_empty() {
                continue;
            }

            out.insert(
                name.clone(),
                MetricFamily {
                    name,
                    help: state.help,
                    kind: state.kind,
                    samples,
                },
            );
        }

        out
    }
}

/// Observation counts are whole, non-negative and finite.
fn as_count(name: &str, value: f64) -> std::result::Result<u64, String> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Ok(value as u64)
    } else {
        Err(format!("{} has invalid count {}", name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPOSITION: &str = r#"
# HELP http_requests_total The total number of HTTP requests.
# TYPE http_requests_total counter
http_requests_total{method="post",code="200"} 1027 1395066363000
http_requests_total{method="post",code="400"}    3 1395066363000

# A plain comment
msdos_file_access_time_seconds{path="C:\\DIR\\FILE.TXT",error="Cannot find file:\n\"FILE.TXT\""} 1.458255915e9

# HELP http_request_duration_seconds A histogram of the request duration.
# TYPE http_request_duration_seconds histogram
http_request_duration_seconds_bucket{le="0.05"} 24054
http_request_duration_seconds_bucket{le="0.1"} 33444
http_request_duration_seconds_bucket{le="+Inf"} 144320
http_request_duration_seconds_sum 53423
http_request_duration_seconds_count 144320

# HELP rpc_duration_seconds A summary of the RPC duration in seconds.
# TYPE rpc_duration_seconds summary
rpc_duration_seconds{quantile="0.5"} 4773
rpc_duration_seconds{quantile="0.99"} 76656
rpc_duration_seconds_sum 1.7560473e+07
rpc_duration_seconds_count 2693

# TYPE temperature gauge
temperature NaN
"#;

    #[test]
    fn test_parse_counter_family() {
        let families = parse(EXPOSITION).unwrap().families;
        let family = &families["http_requests_total"];

        assert_eq!(family.kind, MetricKind::Counter);
        assert_eq!(family.help, "The total number of HTTP requests.");
        assert_eq!(family.samples.len(), 2);

        let ok = family
            .samples
            .iter()
            .find(|s| s.labels.get("code").map(String::as_str) == Some("200"))
            .unwrap();
        assert_eq!(ok.value, SampleValue::Counter(1027.0));
        assert_eq!(ok.labels.get("method"), Some(&"post".to_string()));
    }

    #[test]
    fn test_parse_untyped_with_escapes() {
        let families = parse(EXPOSITION).unwrap().families;
        let family = &families["msdos_file_access_time_seconds"];

        assert_eq!(family.kind, MetricKind::Untyped);
        let sample = &family.samples[0];
        assert_eq!(sample.labels["path"], r"C:\DIR\FILE.TXT");
        assert_eq!(sample.labels["error"], "Cannot find file:\n\"FILE.TXT\"");
        assert_eq!(sample.value, SampleValue::Untyped(1.458255915e9));
    }

    #[test]
    fn test_parse_histogram_grouping() {
        let families = parse(EXPOSITION).unwrap().families;
        let family = &families["http_request_duration_seconds"];

        assert_eq!(family.kind, MetricKind::Histogram);
        assert_eq!(family.samples.len(), 1);
        assert!(!families.contains_key("http_request_duration_seconds_bucket"));

        match &family.samples[0].value {
            SampleValue::Histogram {
                buckets,
                sample_count,
                sample_sum,
            } => {
                assert_eq!(buckets.len(), 3);
                assert_eq!(buckets[0].upper_bound, 0.05);
                assert_eq!(buckets[2].upper_bound, f64::INFINITY);
                assert_eq!(buckets[2].cumulative_count, 144320);
                assert_eq!(*sample_count, 144320);
                assert_eq!(*sample_sum, 53423.0);
            }
            other => panic!("expected histogram, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_summary_grouping() {
        let families = parse(EXPOSITION).unwrap().families;
        let family = &families["rpc_duration_seconds"];

        match &family.samples[0].value {
            SampleValue::Summary {
                quantiles,
                sample_count,
                sample_sum,
            } => {
                assert_eq!(quantiles.len(), 2);
                assert_eq!(quantiles[1].quantile, 0.99);
                assert_eq!(quantiles[1].value, 76656.0);
                assert_eq!(*sample_count, 2693);
                assert_eq!(*sample_sum, 1.7560473e7);
            }
            other => panic!("expected summary, got {:?}", other),
        }
    }

    #[test]
    fn test_histogram_groups_by_labels() {
        let text = "\
# TYPE latency histogram
latency_bucket{path=\"/a\",le=\"1\"} 1
latency_bucket{path=\"/b\",le=\"1\"} 2
latency_count{path=\"/a\"} 1
latency_count{path=\"/b\"} 2
";
        let families = parse(text).unwrap().families;
        assert_eq!(families["latency"].samples.len(), 2);
    }

    #[test]
    fn test_suffix_without_type_is_own_family() {
        let families = parse("jobs_count 3\n").unwrap().families;
        assert_eq!(families["jobs_count"].samples[0].value, SampleValue::Untyped(3.0));
    }

    #[test]
    fn test_nan_value() {
        let families = parse(EXPOSITION).unwrap().families;
        match families["temperature"].samples[0].value {
            SampleValue::Gauge(v) => assert!(v.is_nan()),
            ref other => panic!("expected gauge, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_line_keeps_other_families() {
        let text = "\
# TYPE up gauge
up 1
# TYPE down gauge
down abc
# TYPE ok gauge
ok 2
this is not valid
";
        let exposition = parse(text).unwrap();

        assert_eq!(exposition.malformed, 2);
        assert_eq!(exposition.families["up"].samples[0].value, SampleValue::Gauge(1.0));
        assert_eq!(exposition.families["ok"].samples[0].value, SampleValue::Gauge(2.0));
        assert!(!exposition.families.contains_key("down"));
    }

    #[test]
    fn test_unusable_body() {
        let err = parse("# TYPE up gauge\nthis is not valid\nup{job=\"a\" 1\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));

        assert!(parse("up abc\n").is_err());
    }

    #[test]
    fn test_bucket_without_le_is_skipped() {
        let text = "# TYPE h histogram\nh_bucket 1\nh_bucket{le=\"1\"} 2\nh_count 2\n";
        let exposition = parse(text).unwrap();

        assert_eq!(exposition.malformed, 1);
        match &exposition.families["h"].samples[0].value {
            SampleValue::Histogram { buckets, .. } => assert_eq!(buckets.len(), 1),
            other => panic!("expected histogram, got {:?}", other),
        }
    }

    #[test]
    fn test_summary_without_quantile_is_skipped() {
        let text = "# TYPE rpc summary\nrpc 0.3\nrpc_count 4\n";
        let exposition = parse(text).unwrap();
        assert_eq!(exposition.malformed, 1);
        assert_eq!(exposition.families["rpc"].samples.len(), 1);
    }

    #[test]
    fn test_invalid_counts_are_malformed() {
        let text = "\
# TYPE h histogram
h_bucket{le=\"1\"} -3
h_bucket{le=\"2\"} 2.5
h_bucket{le=\"+Inf\"} 4
h_count NaN
h_sum 1.5
";
        let exposition = parse(text).unwrap();

        assert_eq!(exposition.malformed, 3);
        match &exposition.families["h"].samples[0].value {
            SampleValue::Histogram {
                buckets,
                sample_count,
                ..
            } => {
                assert_eq!(buckets.len(), 1);
                assert_eq!(buckets[0].cumulative_count, 4);
                assert_eq!(*sample_count, 0);
            }
            other => panic!("expected histogram, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(parse("").unwrap().families.is_empty());
        assert!(parse("# only a comment\n").unwrap().families.is_empty());
    }
}
