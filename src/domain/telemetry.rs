// Telemetry data domain models
use super::error::{DashboardError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeSeriesPoint {
    pub time_ms: i64,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(time_ms: i64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

/// Time-bucketed averages of one device property over one window.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregatedSeries {
    timestamps: Vec<i64>,
    values: Vec<f64>,
}

impl AggregatedSeries {
    /// Timestamps are epoch seconds and must be strictly ascending.
    pub fn new(timestamps: Vec<i64>, values: Vec<f64>) -> Result<Self> {
        if timestamps.len() != values.len() {
            return Err(DashboardError::MalformedSeries(format!(
                "{} timestamps but {} values",
                timestamps.len(),
                values.len()
            )));
        }
        if let Some(pair) = timestamps.windows(2).find(|w| w[0] >= w[1]) {
            return Err(DashboardError::MalformedSeries(format!(
                "timestamp {} is not after {}",
                pair[1], pair[0]
            )));
        }
        Ok(Self { timestamps, values })
    }

    /// Build from unordered `(epoch_seconds, value)` pairs, keeping the last
    /// value seen for duplicated timestamps.
    pub fn from_samples(mut samples: Vec<(i64, f64)>) -> Self {
        samples.sort_by_key(|(ts, _)| *ts);
        let mut timestamps: Vec<i64> = Vec::with_capacity(samples.len());
        let mut values: Vec<f64> = Vec::with_capacity(samples.len());
        for (ts, value) in samples {
            if timestamps.last() == Some(&ts) {
                if let Some(last) = values.last_mut() {
                    *last = value;
                }
                continue;
            }
            timestamps.push(ts);
            values.push(value);
        }
        Self { timestamps, values }
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.timestamps.iter().copied().zip(self.values.iter().copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YRange {
    pub min: f64,
    pub max: f64,
}

/// Chart payload for one property of one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub unit: String,
    pub points: Vec<TimeSeriesPoint>,
    pub y_range: YRange,
}

/// A single value pushed by the live feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveReading {
    pub device_id: String,
    pub property_id: String,
    pub value: f64,
    pub timestamp: Option<DateTime<Utc>>,
}
