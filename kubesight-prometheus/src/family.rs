//! In-memory shape of a parsed exposition: families of labeled samples.

use std::collections::HashMap;

/// Declared type of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MetricKind {
    Counter,
    Gauge,
    Summary,
    Histogram,
    #[default]
    Untyped,
}

impl MetricKind {
    /// Parse the type token of a `# TYPE` line. Unknown tokens are untyped.
    pub fn from_type_token(token: &str) -> Self {
        match token {
            "counter" => MetricKind::Counter,
            "gauge" => MetricKind::Gauge,
            "summary" => MetricKind::Summary,
            "histogram" => MetricKind::Histogram,
            _ => MetricKind::Untyped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Summary => "summary",
            MetricKind::Histogram => "histogram",
            MetricKind::Untyped => "untyped",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantile {
    pub quantile: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub upper_bound: f64,
    pub cumulative_count: u64,
}

/// Value of one sample. The variant must agree with the family kind.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Gauge(f64),
    Counter(f64),
    Untyped(f64),
    Summary {
        quantiles: Vec<Quantile>,
        sample_count: u64,
        sample_sum: f64,
    },
    Histogram {
        buckets: Vec<Bucket>,
        sample_count: u64,
        sample_sum: f64,
    },
}

impl SampleValue {
    /// Whether this value may appear in a family of `kind`.
    ///
    /// Scalar families accept any scalar value; summaries and histograms only
    /// their own variant.
    pub fn fits(&self, kind: MetricKind) -> bool {
        match (kind, self) {
            (
                MetricKind::Counter | MetricKind::Gauge | MetricKind::Untyped,
                SampleValue::Gauge(_) | SampleValue::Counter(_) | SampleValue::Untyped(_),
            ) => true,
            (MetricKind::Summary, SampleValue::Summary { .. }) => true,
            (MetricKind::Histogram, SampleValue::Histogram { .. }) => true,
            _ => false,
        }
    }
}

/// One labeled observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: HashMap<String, String>,
    pub value: SampleValue,
}

impl Sample {
    pub fn new(value: SampleValue) -> Self {
        Self {
            labels: HashMap::new(),
            value,
        }
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }
}

/// All samples sharing a metric name.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            help: String::new(),
            kind,
            samples: Vec::new(),
        }
    }

    pub fn with_sample(mut self, sample: Sample) -> Self {
        self.samples.push(sample);
        self
    }
}
