//! Scraped sample types.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use super::point::{DroppedMetric, Point, PointsConversion};

/// Metric type as declared by the scrape source.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    #[default]
    Untyped,
}

/// Typed field value.
///
/// Conversion keeps the variant as-is so the stored column type matches what
/// was scraped.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    UInteger(u64),
    Boolean(bool),
    String(String),
}

impl FieldValue {
    /// Whether storage can hold this value. Non-finite floats cannot.
    pub fn is_storable(&self) -> bool {
        match self {
            Self::Float(v) => v.is_finite(),
            _ => true,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        Self::UInteger(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

/// Line-protocol rendering of the value (without the key).
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}i"),
            Self::UInteger(v) => write!(f, "{v}u"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::String(v) => {
                f.write_str("\"")?;
                for c in v.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"")
            }
        }
    }
}

/// One scraped sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub tags: HashMap<String, String>,
    pub fields: HashMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
    pub metric_type: MetricType,
}

impl Metric {
    pub fn new(
        name: impl Into<String>,
        metric_type: MetricType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            tags: HashMap::new(),
            fields: HashMap::new(),
            timestamp,
            metric_type,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// All metrics produced by one fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSlice(Vec<Metric>);

impl MetricsSlice {
    pub fn new(metrics: Vec<Metric>) -> Self {
        Self(metrics)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Metric> {
        self.0.iter()
    }

    pub fn push(&mut self, metric: Metric) {
        self.0.push(metric);
    }

    pub fn into_inner(self) -> Vec<Metric> {
        self.0
    }

    /// Convert every metric into a [`Point`].
    ///
    /// Each metric is converted on its own; the ones that cannot become a
    /// valid point are recorded in [`PointsConversion::dropped`] and the rest
    /// are still returned.
    pub fn points(&self) -> PointsConversion {
        let mut conversion = PointsConversion::default();
        for metric in &self.0 {
            match Point::from_metric(metric) {
                Ok(point) => conversion.points.push(point),
                Err(reason) => {
                    tracing::debug!(metric = %metric.name, error = %reason, "Dropping metric");
                    conversion.dropped.push(DroppedMetric {
                        name: metric.name.clone(),
                        reason,
                    });
                }
            }
        }
        conversion
    }
}

impl From<Vec<Metric>> for MetricsSlice {
    fn from(metrics: Vec<Metric>) -> Self {
        Self(metrics)
    }
}

impl FromIterator<Metric> for MetricsSlice {
    fn from_iter<I: IntoIterator<Item = Metric>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for MetricsSlice {
    type Item = Metric;
    type IntoIter = std::vec::IntoIter<Metric>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a MetricsSlice {
    type Item = &'a Metric;
    type IntoIter = std::slice::Iter<'a, Metric>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
