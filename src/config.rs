//! Shard-run configuration: the downsample interval/timezone, the metric and
//! label field lists, the bulk-sink thresholds, and the task parameters that
//! identify one shard-run invocation.
//!
//! Every config type here validates eagerly at construction — rejecting an
//! out-of-range value at the point it's built rather than the point it's
//! first used — mirroring how the inherited codebase validates its own
//! `ts-*` settings before they're ever read by a command handler.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::common::rounding::{CalendarUnit, Interval};
use crate::error::{DownsampleError, DownsampleResult};
use crate::model::Timestamp;

/// Whether a metric is a monotonic counter (last-observed semantics) or a
/// gauge (full min/max/sum/value_count aggregate).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricType {
    Gauge,
    Counter,
}

/// The aggregations a gauge metric supports. Currently the engine always
/// emits all four sub-values for a gauge (§4.2); this enumerates which ones
/// a given metric's mapping declared as supported, for validation/warning
/// purposes — a metric declaring none of them is almost certainly a
/// configuration mistake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GaugeAggregation {
    Min,
    Max,
    Sum,
    ValueCount,
}

pub const ALL_GAUGE_AGGREGATIONS: [GaugeAggregation; 4] = [
    GaugeAggregation::Min,
    GaugeAggregation::Max,
    GaugeAggregation::Sum,
    GaugeAggregation::ValueCount,
];

/// A single metric field's downsample configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricField {
    pub name: String,
    pub metric_type: MetricType,
    /// Only meaningful for `MetricType::Gauge`; empty for counters.
    pub supported_aggregations: Vec<GaugeAggregation>,
}

impl MetricField {
    pub fn gauge(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metric_type: MetricType::Gauge,
            supported_aggregations: ALL_GAUGE_AGGREGATIONS.to_vec(),
        }
    }

    pub fn counter(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metric_type: MetricType::Counter,
            supported_aggregations: Vec::new(),
        }
    }
}

/// A label field carried through as a last-observed passthrough value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LabelField {
    pub name: String,
}

impl LabelField {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Either a fixed duration or a calendar unit, as accepted from the wire
/// (`interval_type` + `interval`); resolved into a `common::rounding::Interval`
/// by `DownsampleConfig::validate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalSpec {
    Fixed { millis: i64 },
    Calendar { unit: CalendarUnit },
}

/// `{interval, interval_type, time_zone, timestamp_field}` from §6.1.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownsampleConfig {
    pub interval: IntervalSpec,
    pub time_zone: Tz,
    pub timestamp_field: String,
    pub metrics: Vec<MetricField>,
    pub labels: Vec<LabelField>,
}

impl DownsampleConfig {
    /// Validates and resolves the wire-level interval spec into the
    /// allocation-free `Interval` the rounding module operates on.
    pub fn validate(&self) -> DownsampleResult<Interval> {
        if self.timestamp_field.trim().is_empty() {
            return Err(DownsampleError::InvalidConfiguration(
                "timestamp_field must not be empty".into(),
            ));
        }
        if self.metrics.is_empty() && self.labels.is_empty() {
            return Err(DownsampleError::InvalidConfiguration(
                "at least one metric or label field is required".into(),
            ));
        }
        let interval = match self.interval {
            IntervalSpec::Fixed { millis } => {
                if millis <= 0 {
                    return Err(DownsampleError::InvalidConfiguration(format!(
                        "fixed interval must be positive, got {millis}"
                    )));
                }
                Interval::Fixed(millis)
            }
            IntervalSpec::Calendar { unit } => Interval::Calendar(unit),
        };
        Ok(interval)
    }
}

/// `{max_actions, max_batch_bytes, max_in_flight_bytes, max_retries}` from
/// §4.6, with the defaults given there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSinkConfig {
    pub max_actions: usize,
    pub max_batch_bytes: usize,
    pub max_in_flight_bytes: usize,
    pub max_retries: u32,
}

impl Default for BulkSinkConfig {
    fn default() -> Self {
        Self {
            max_actions: 10_000,
            max_batch_bytes: 1024 * 1024,
            max_in_flight_bytes: 50 * 1024 * 1024,
            max_retries: 3,
        }
    }
}

impl BulkSinkConfig {
    pub fn validate(&self) -> DownsampleResult<()> {
        if self.max_actions == 0 {
            return Err(DownsampleError::InvalidConfiguration(
                "max_actions must be positive".into(),
            ));
        }
        if self.max_batch_bytes == 0 {
            return Err(DownsampleError::InvalidConfiguration(
                "max_batch_bytes must be positive".into(),
            ));
        }
        if self.max_in_flight_bytes < self.max_batch_bytes {
            return Err(DownsampleError::InvalidConfiguration(format!(
                "max_in_flight_bytes ({}) must be >= max_batch_bytes ({})",
                self.max_in_flight_bytes, self.max_batch_bytes
            )));
        }
        Ok(())
    }
}

/// `{target_index, shard_id, time_series_start_ms, time_series_end_ms}`
/// from §6.1.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShardTaskParams {
    pub target_index: String,
    pub shard_id: u32,
    pub time_series_start_ms: Timestamp,
    pub time_series_end_ms: Timestamp,
}

impl ShardTaskParams {
    pub fn validate(&self) -> DownsampleResult<()> {
        if self.target_index.trim().is_empty() {
            return Err(DownsampleError::InvalidConfiguration(
                "target_index must not be empty".into(),
            ));
        }
        if self.time_series_end_ms < self.time_series_start_ms {
            return Err(DownsampleError::InvalidConfiguration(format!(
                "time_series_end_ms ({}) must be >= time_series_start_ms ({})",
                self.time_series_end_ms, self.time_series_start_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> DownsampleConfig {
        DownsampleConfig {
            interval: IntervalSpec::Fixed { millis: 3_600_000 },
            time_zone: chrono_tz::UTC,
            timestamp_field: "@timestamp".to_string(),
            metrics: vec![MetricField::gauge("cpu")],
            labels: vec![LabelField::new("host")],
        }
    }

    #[test]
    fn rejects_empty_timestamp_field() {
        let mut cfg = base_config();
        cfg.timestamp_field = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_fixed_interval() {
        let mut cfg = base_config();
        cfg.interval = IntervalSpec::Fixed { millis: 0 };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_no_fields() {
        let mut cfg = base_config();
        cfg.metrics.clear();
        cfg.labels.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_valid_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn bulk_sink_rejects_in_flight_below_batch_bytes() {
        let cfg = BulkSinkConfig {
            max_actions: 10,
            max_batch_bytes: 1000,
            max_in_flight_bytes: 500,
            max_retries: 1,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bulk_sink_default_is_valid() {
        assert!(BulkSinkConfig::default().validate().is_ok());
    }

    #[test]
    fn shard_task_params_rejects_inverted_range() {
        let params = ShardTaskParams {
            target_index: "metrics-rollup".into(),
            shard_id: 0,
            time_series_start_ms: 1000,
            time_series_end_ms: 500,
        };
        assert!(params.validate().is_err());
    }
}
