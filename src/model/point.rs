//! Storage points and metric-to-point conversion.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::metric::{FieldValue, Metric};

/// Maximum length in bytes of a serialized series key (measurement + tags).
pub const MAX_KEY_LENGTH: usize = 65535;

/// Reasons a metric cannot become a [`Point`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointError {
    #[error("max key length exceeded: {len} > {max}")]
    KeyTooLong { len: usize, max: usize },

    #[error("missing measurement name")]
    EmptyName,

    #[error("point without fields is unsupported")]
    NoFields,

    #[error("invalid value for field '{0}': non-finite floats are unsupported")]
    UnsupportedValue(String),

    #[error("timestamp {0} is outside the representable range")]
    TimestampOutOfRange(DateTime<Utc>),
}

/// A metric that was left out of a conversion, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedMetric {
    pub name: String,
    pub reason: PointError,
}

/// Result of converting a [`MetricsSlice`](super::MetricsSlice).
///
/// Holds the valid points together with every metric that was dropped, so a
/// caller can log the failures without losing the good subset.
#[derive(Debug, Clone, Default)]
pub struct PointsConversion {
    pub points: Vec<Point>,
    pub dropped: Vec<DroppedMetric>,
}

impl PointsConversion {
    /// Aggregate error for the dropped metrics, if there were any.
    pub fn error(&self) -> Option<ConversionError> {
        if self.dropped.is_empty() {
            None
        } else {
            Some(ConversionError {
                dropped: self.dropped.clone(),
            })
        }
    }

    /// Split into the valid points and the aggregate error.
    pub fn into_result(self) -> (Vec<Point>, Option<ConversionError>) {
        let err = (!self.dropped.is_empty()).then(|| ConversionError {
            dropped: self.dropped,
        });
        (self.points, err)
    }
}

/// Aggregate error for metrics that could not be converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    dropped: Vec<DroppedMetric>,
}

impl ConversionError {
    pub fn dropped(&self) -> &[DroppedMetric] {
        &self.dropped
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let too_long = self
            .dropped
            .iter()
            .filter(|d| matches!(d.reason, PointError::KeyTooLong { .. }))
            .count();

        let mut parts = Vec::new();
        if too_long > 0 {
            parts.push(format!(
                "max key length exceeded: {too_long} metric(s) dropped"
            ));
        }
        parts.extend(
            self.dropped
                .iter()
                .filter(|d| !matches!(d.reason, PointError::KeyTooLong { .. }))
                .map(|d| format!("{}: {}", d.name, d.reason)),
        );
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ConversionError {}

/// A storage-ready time-series record.
///
/// Names, tag keys and tag values are held unescaped; escaping is applied
/// only when the point is serialized with [`Point::key`] or `Display`.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: DateTime<Utc>,
}

impl Point {
    /// Build a point, checking the key-length bound and field validity.
    pub fn new(
        measurement: impl Into<String>,
        tags: BTreeMap<String, String>,
        fields: BTreeMap<String, FieldValue>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, PointError> {
        let measurement = measurement.into();
        if measurement.is_empty() {
            return Err(PointError::EmptyName);
        }
        if fields.is_empty() {
            return Err(PointError::NoFields);
        }
        if let Some((key, _)) = fields.iter().find(|(_, v)| !v.is_storable()) {
            return Err(PointError::UnsupportedValue(key.clone()));
        }
        if timestamp.timestamp_nanos_opt().is_none() {
            return Err(PointError::TimestampOutOfRange(timestamp));
        }

        let point = Self {
            measurement,
            tags,
            fields,
            timestamp,
        };
        let len = point.key_len();
        if len > MAX_KEY_LENGTH {
            return Err(PointError::KeyTooLong {
                len,
                max: MAX_KEY_LENGTH,
            });
        }
        Ok(point)
    }

    pub(crate) fn from_metric(metric: &Metric) -> Result<Self, PointError> {
        let tags = metric
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let fields = metric
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self::new(metric.name.clone(), tags, fields, metric.timestamp)
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Replace the timestamp.
    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.timestamp = timestamp;
    }

    /// Serialized series key: escaped measurement followed by sorted tags.
    ///
    /// Tags with an empty value are not part of the key.
    pub fn key(&self) -> String {
        let mut key = String::with_capacity(self.measurement.len());
        escape_into(&mut key, &self.measurement, &[',', ' ']);
        for (k, v) in self.tags.iter().filter(|(_, v)| !v.is_empty()) {
            key.push(',');
            escape_into(&mut key, k, &[',', '=', ' ']);
            key.push('=');
            escape_into(&mut key, v, &[',', '=', ' ']);
        }
        key
    }

    fn key_len(&self) -> usize {
        self.key().len()
    }
}

/// InfluxDB line protocol: `key field=value[,field=value] unix_nanos`.
impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())?;
        let mut sep = ' ';
        for (k, v) in &self.fields {
            let mut escaped = String::with_capacity(k.len());
            escape_into(&mut escaped, k, &[',', '=', ' ']);
            write!(f, "{sep}{escaped}={v}")?;
            sep = ',';
        }
        write!(f, " {}", self.timestamp.timestamp_nanos_opt().unwrap_or_default())
    }
}

/// Backslash, newline and carriage return are escaped in every position.
fn escape_into(out: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => {
                if special.contains(&c) {
                    out.push('\\');
                }
                out.push(c);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(value: f64) -> BTreeMap<String, FieldValue> {
        BTreeMap::from([("gauge".to_string(), FieldValue::Float(value))])
    }

    #[test]
    fn test_line_protocol() {
        let point = Point::new(
            "go_goroutines",
            BTreeMap::new(),
            fields(36.0),
            DateTime::from_timestamp(0, 0).unwrap(),
        )
        .unwrap();
        assert_eq!(point.to_string(), "go_goroutines gauge=36 0");
    }

    #[test]
    fn test_key_sorts_and_escapes_tags() {
        let tags = BTreeMap::from([
            ("zone".to_string(), "us east".to_string()),
            ("app".to_string(), "a=b,c".to_string()),
            ("empty".to_string(), String::new()),
        ]);
        let point = Point::new("cpu load", tags, fields(1.5), Utc::now()).unwrap();
        assert_eq!(point.key(), r"cpu\ load,app=a\=b\,c,zone=us\ east");
        assert_eq!(point.tags()["zone"], "us east");
    }

    #[test]
    fn test_backslash_and_newline_stay_on_one_line() {
        let tags = BTreeMap::from([
            ("path".to_string(), "C:\\".to_string()),
            ("msg".to_string(), "a\nb".to_string()),
        ]);
        let point = Point::new(
            "m",
            tags,
            fields(1.0),
            DateTime::from_timestamp(0, 0).unwrap(),
        )
        .unwrap();
        let line = point.to_string();
        assert_eq!(line, r"m,msg=a\nb,path=C:\\ gauge=1 0");
        assert_eq!(line.lines().count(), 1);
    }

    #[test]
    fn test_key_length_boundary() {
        let ok = Point::new("x".repeat(MAX_KEY_LENGTH), BTreeMap::new(), fields(1.0), Utc::now());
        assert!(ok.is_ok());

        let err = Point::new(
            "x".repeat(MAX_KEY_LENGTH + 1),
            BTreeMap::new(),
            fields(1.0),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            PointError::KeyTooLong {
                len: MAX_KEY_LENGTH + 1,
                max: MAX_KEY_LENGTH
            }
        );
    }

    #[test]
    fn test_escaping_counts_toward_key_length() {
        let name = " ".repeat(MAX_KEY_LENGTH / 2 + 1);
        let err = Point::new(name, BTreeMap::new(), fields(1.0), Utc::now()).unwrap_err();
        assert!(matches!(err, PointError::KeyTooLong { .. }));
    }

    #[test]
    fn test_invalid_points() {
        assert_eq!(
            Point::new("", BTreeMap::new(), fields(1.0), Utc::now()).unwrap_err(),
            PointError::EmptyName
        );
        assert_eq!(
            Point::new("m", BTreeMap::new(), BTreeMap::new(), Utc::now()).unwrap_err(),
            PointError::NoFields
        );
        assert_eq!(
            Point::new("m", BTreeMap::new(), fields(f64::NAN), Utc::now()).unwrap_err(),
            PointError::UnsupportedValue("gauge".to_string())
        );
    }

    #[test]
    fn test_conversion_error_message() {
        let err = ConversionError {
            dropped: vec![
                DroppedMetric {
                    name: "long".to_string(),
                    reason: PointError::KeyTooLong { len: 70000, max: MAX_KEY_LENGTH },
                },
                DroppedMetric {
                    name: "nan".to_string(),
                    reason: PointError::UnsupportedValue("gauge".to_string()),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("max key length exceeded: 1 metric(s) dropped"));
        assert!(msg.contains("nan: invalid value for field 'gauge'"));
    }
}
