//! Prometheus text exposition format (0.0.4).
//!
//! Parsing is done by `prometheus_parser`; this module maps each parsed
//! family onto [`Metric`]s, one per label set:
//!
//! - counter / gauge / untyped: a single `counter` / `gauge` / `value` field
//! - summary: `count`, `sum` and one field per quantile
//! - histogram: `count`, `sum` and one field per bucket upper bound

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use prometheus_parser::{GroupKey, GroupKind, MetricGroup, SimpleMetric, parse_text};
use thiserror::Error;

use crate::model::{FieldValue, Metric, MetricType, MetricsSlice};

/// Media type requested from Prometheus targets.
pub const ACCEPT_HEADER: &str = "text/plain;version=0.0.4;q=1,*/*;q=0.1";

/// A malformed scrape body.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ParseError(#[from] prometheus_parser::ParserError);

/// Parse a text-format body. Samples without a timestamp are stamped `now`.
///
/// Any malformed line fails the whole body.
pub fn parse(body: &str, now: DateTime<Utc>) -> Result<MetricsSlice, ParseError> {
    let groups = parse_text(body)?;
    Ok(groups
        .into_iter()
        .flat_map(|group| family_metrics(group, now))
        .collect())
}

fn family_metrics(group: MetricGroup, now: DateTime<Utc>) -> Vec<Metric> {
    let MetricGroup { name, metrics } = group;
    match metrics {
        GroupKind::Counter(map) => simple(&name, MetricType::Counter, "counter", map, now),
        GroupKind::Gauge(map) => simple(&name, MetricType::Gauge, "gauge", map, now),
        GroupKind::Untyped(map) => simple(&name, MetricType::Untyped, "value", map, now),
        GroupKind::Summary(map) => map
            .into_iter()
            .map(|(key, summary)| {
                let mut fields = HashMap::with_capacity(summary.quantiles.len() + 2);
                fields.insert("count".to_string(), FieldValue::Float(summary.count as f64));
                fields.insert("sum".to_string(), FieldValue::Float(summary.sum));
                for q in summary.quantiles {
                    fields.insert(format_bound(q.quantile), FieldValue::Float(q.value));
                }
                metric(&name, MetricType::Summary, key, fields, now)
            })
            .collect(),
        GroupKind::Histogram(map) => map
            .into_iter()
            .map(|(key, histogram)| {
                let mut fields = HashMap::with_capacity(histogram.buckets.len() + 2);
                fields.insert("count".to_string(), FieldValue::Float(histogram.count as f64));
                fields.insert("sum".to_string(), FieldValue::Float(histogram.sum));
                for b in histogram.buckets {
                    fields.insert(format_bound(b.bucket), FieldValue::Float(b.count as f64));
                }
                metric(&name, MetricType::Histogram, key, fields, now)
            })
            .collect(),
    }
}

fn simple(
    name: &str,
    kind: MetricType,
    field: &str,
    samples: impl IntoIterator<Item = (GroupKey, SimpleMetric)>,
    now: DateTime<Utc>,
) -> Vec<Metric> {
    samples
        .into_iter()
        .map(|(key, sample)| {
            let fields = HashMap::from([(field.to_string(), FieldValue::Float(sample.value))]);
            metric(name, kind, key, fields, now)
        })
        .collect()
}

fn metric(
    name: &str,
    kind: MetricType,
    key: GroupKey,
    fields: HashMap<String, FieldValue>,
    now: DateTime<Utc>,
) -> Metric {
    Metric {
        name: name.to_string(),
        tags: key.labels.into_iter().collect(),
        fields,
        timestamp: key
            .timestamp
            .filter(|ms| *ms > 0)
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(now),
        metric_type: kind,
    }
}

/// Field key for a quantile or bucket bound.
fn format_bound(v: f64) -> String {
    if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}
