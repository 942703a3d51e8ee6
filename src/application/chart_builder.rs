// Chart-ready series from cached aggregates
use crate::domain::telemetry::{AggregatedSeries, ChartSeries, TimeSeriesPoint, YRange};

pub const Y_PADDING_PERCENT: f64 = 10.0;

/// Half-height used when every value is the same, so the axis never collapses.
const FLAT_RANGE_PADDING: f64 = 1.0;

pub fn build(series: &AggregatedSeries, unit: &str) -> ChartSeries {
    let points = series
        .samples()
        .map(|(ts, value)| TimeSeriesPoint::new(ts * 1000, value))
        .collect();

    ChartSeries {
        unit: unit.to_string(),
        points,
        y_range: padded_range(series.values(), Y_PADDING_PERCENT),
    }
}

/// `[min, max]` of `values` widened by `padding_percent` of the span on each side.
pub fn padded_range(values: &[f64], padding_percent: f64) -> YRange {
    let (min, max) = values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .unwrap_or((0.0, 0.0));

    let span = max - min;
    let padding = if span == 0.0 {
        FLAT_RANGE_PADDING
    } else {
        span * padding_percent / 100.0
    };

    YRange {
        min: min - padding,
        max: max + padding,
    }
}
