// Point-in-time value lookup and normalization for heatmap coloring
use crate::application::series_cache::AggregatedSeriesCache;
use crate::domain::device::{DeviceCatalog, SeriesKey, ValueRange};
use crate::domain::error::{DashboardError, Result};
use crate::domain::telemetry::AggregatedSeries;

/// Value of the sample whose timestamp is nearest to `t` (epoch seconds).
/// Ties go to the earlier sample.
pub fn closest_sample(series: &AggregatedSeries, t: i64) -> Result<f64> {
    let timestamps = series.timestamps();
    if timestamps.is_empty() {
        return Err(DashboardError::EmptySeries);
    }

    let idx = match timestamps.binary_search(&t) {
        Ok(exact) => exact,
        Err(0) => 0,
        Err(insert_at) if insert_at == timestamps.len() => insert_at - 1,
        Err(insert_at) => {
            let before = insert_at - 1;
            let distance_before = t - timestamps[before];
            let distance_after = timestamps[insert_at] - t;
            if distance_after < distance_before {
                insert_at
            } else {
                before
            }
        }
    };

    Ok(series.values()[idx])
}

/// Map `value` into [0, 1] against `range`. A zero-width range maps to 0.
pub fn normalize(value: f64, range: ValueRange) -> f64 {
    let width = range.max - range.min;
    if width == 0.0 || width.is_nan() {
        return 0.0;
    }
    let normalized = (value - range.min) / width;
    if normalized.is_nan() {
        return 0.0;
    }
    normalized.clamp(0.0, 1.0)
}

/// Normalized value of a device property at `t`, or 0 when there is no data.
pub fn sensor_value(
    key: &SeriesKey,
    cache: &AggregatedSeriesCache,
    catalog: &DeviceCatalog,
    t: i64,
) -> f64 {
    let Some(property) = catalog.property(&key.property_id) else {
        return 0.0;
    };
    let Some(series) = cache.get(key) else {
        return 0.0;
    };

    match closest_sample(&series, t) {
        Ok(value) => normalize(value, property.effective_range()),
        Err(e) => {
            tracing::warn!("No value for {}: {}", key, e);
            0.0
        }
    }
}

/// Tooltip text for a raw value, e.g. "21.50 °C".
pub fn format_reading(value: f64, unit: &str) -> String {
    format!("{:.2} {}", value, unit)
}
