//! Metric model and point conversion.
//!
//! - [`Metric`] / [`MetricsSlice`]: samples produced by one scrape
//! - [`Point`]: storage-ready record with a length-bounded series key
//! - [`PointsConversion`]: best-effort conversion result that keeps the valid
//!   points next to the reasons other metrics were dropped

mod metric;
mod point;

pub use metric::{FieldValue, Metric, MetricType, MetricsSlice};
pub use point::{
    ConversionError, DroppedMetric, MAX_KEY_LENGTH, Point, PointError, PointsConversion,
};
