//! Translation of metric families into dotted, tagged points.

use std::collections::HashMap;
use std::sync::Arc;

use kubesight_common::{MetricPoint, StringInterner, TagSet};

use crate::family::{MetricFamily, Sample, SampleValue};

/// Decides whether a translated point is kept, given its final name and tags.
pub type MetricPredicate = dyn Fn(&str, &HashMap<String, String>) -> bool + Send + Sync;

/// Counters of one translation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TranslationStats {
    pub families: usize,
    pub samples: usize,
    pub points: usize,
    /// Points rejected by the predicate.
    pub filtered: usize,
    /// Values dropped for being NaN.
    pub nan_dropped: usize,
    /// Samples whose value does not match the family kind, plus sample
    /// lines the parser skipped.
    pub malformed: usize,
}

#[derive(Debug, Default)]
pub struct Translation {
    pub points: Vec<MetricPoint>,
    pub stats: TranslationStats,
}

/// Turns scraped families into [`MetricPoint`]s for one source.
///
/// Names become `<prefix><name with '_' replaced by '.'>` plus a suffix
/// chosen by value kind. Static tags are merged under the sample labels.
#[derive(Clone)]
pub struct PointBuilder {
    source: String,
    prefix: String,
    omit_bucket_suffix: bool,
    tags: HashMap<String, String>,
    is_valid: Arc<MetricPredicate>,
}

impl std::fmt::Debug for PointBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointBuilder")
            .field("source", &self.source)
            .field("prefix", &self.prefix)
            .field("omit_bucket_suffix", &self.omit_bucket_suffix)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

impl PointBuilder {
    /// A builder that keeps every point.
    pub fn new(
        source: impl Into<String>,
        prefix: impl Into<String>,
        tags: HashMap<String, String>,
    ) -> Self {
        Self {
            source: source.into(),
            prefix: prefix.into(),
            omit_bucket_suffix: false,
            tags,
            is_valid: Arc::new(|_: &str, _: &HashMap<String, String>| true),
        }
    }

    /// Name histogram bucket points `<name>` instead of `<name>.bucket`.
    pub fn with_omit_bucket_suffix(mut self, omit: bool) -> Self {
        self.omit_bucket_suffix = omit;
        self
    }

    pub fn with_predicate(mut self, predicate: Arc<MetricPredicate>) -> Self {
        self.is_valid = predicate;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Final metric name for a raw, possibly suffixed, family name.
    pub fn metric_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name.replace('_', "."))
    }

    /// Translate every family, stamping points with `now` (unix seconds).
    ///
    /// Families are visited in name order. Nothing here fails: malformed
    /// samples are counted and skipped.
    pub fn build(&self, families: &HashMap<String, MetricFamily>, now: i64) -> Translation {
        let mut pass = Pass {
            builder: self,
            interner: StringInterner::new(),
            now,
            out: Translation::default(),
        };

        let mut names: Vec<&String> = families.keys().collect();
        names.sort();

        for name in names {
            let family = &families[name];
            pass.out.stats.families += 1;

            for sample in &family.samples {
                pass.out.stats.samples += 1;
                if !sample.value.fits(family.kind) {
                    pass.out.stats.malformed += 1;
                    tracing::debug!(
                        family = %name,
                        kind = %family.kind,
                        "Skipping sample whose value does not match the family type"
                    );
                    continue;
                }
                pass.sample(name, sample);
            }
        }

        pass.out.stats.points = pass.out.points.len();
        pass.out
    }

    fn base_tags(&self, sample: &Sample) -> TagSet {
        let mut tags = TagSet::with_capacity(self.tags.len() + sample.labels.len());
        for (k, v) in &self.tags {
            tags.insert(k.as_str(), v.as_str());
        }
        for (k, v) in &sample.labels {
            tags.insert(k.as_str(), v.as_str());
        }
        tags
    }
}

/// State of one `build` call. The interner lives exactly as long as the pass.
struct Pass<'a> {
    builder: &'a PointBuilder,
    interner: StringInterner,
    now: i64,
    out: Translation,
}

impl Pass<'_> {
    fn sample(&mut self, name: &str, sample: &Sample) {
        let tags = self.builder.base_tags(sample);

        match &sample.value {
            SampleValue::Gauge(v) => self.scalar(name, ".gauge", *v, &tags),
            SampleValue::Counter(v) => self.scalar(name, ".counter", *v, &tags),
            SampleValue::Untyped(v) => self.scalar(name, ".value", *v, &tags),
            SampleValue::Summary {
                quantiles,
                sample_count,
                sample_sum,
            } => {
                for q in quantiles {
                    if q.value.is_nan() {
                        self.out.stats.nan_dropped += 1;
                        continue;
                    }
                    let mut branched = tags.branch();
                    branched.insert("quantile", format_float(q.quantile));
                    self.push(name, q.value, &branched);
                }
                self.push(&format!("{}.count", name), *sample_count as f64, &tags);
                self.push(&format!("{}.sum", name), *sample_sum, &tags);
            }
            SampleValue::Histogram {
                buckets,
                sample_count,
                sample_sum,
            } => {
                let bucket_name = if self.builder.omit_bucket_suffix {
                    name.to_string()
                } else {
                    format!("{}.bucket", name)
                };
                for b in buckets {
                    let mut branched = tags.branch();
                    branched.insert("le", format_float(b.upper_bound));
                    self.push(&bucket_name, b.cumulative_count as f64, &branched);
                }
                self.push(&format!("{}.count", name), *sample_count as f64, &tags);
                self.push(&format!("{}.sum", name), *sample_sum, &tags);
            }
        }
    }

    fn scalar(&mut self, name: &str, suffix: &str, value: f64, tags: &TagSet) {
        if value.is_nan() {
            self.out.stats.nan_dropped += 1;
            return;
        }
        self.push(&format!("{}{}", name, suffix), value, tags);
    }

    fn push(&mut self, name: &str, value: f64, tags: &TagSet) {
        let mut point = MetricPoint::new(
            self.builder.metric_name(name),
            value,
            self.now,
            self.builder.source.as_str(),
        );
        point.set_label_pairs(tags.to_label_pairs(&mut self.interner));

        if (self.builder.is_valid)(&point.metric, &point.tags()) {
            self.out.points.push(point);
        } else {
            self.out.stats.filtered += 1;
        }
    }
}

/// Format a float the way bucket bounds and quantiles are spelled in tags.
///
/// Shortest round-trip digits; `+Inf`, `-Inf` and `NaN` for the special
/// values; exponent form with a signed two-digit exponent when the decimal
/// exponent is below -4 or at least 21.
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if v == 0.0 {
        return v.to_string();
    }

    let sci = format!("{:e}", v);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return v.to_string();
    };
    let exp: i32 = match exp.parse() {
        Ok(e) => e,
        Err(_) => return v.to_string(),
    };

    if (-4..21).contains(&exp) {
        v.to_string()
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exp.abs())
    }
}
