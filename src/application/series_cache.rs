// Cache of aggregated series fetched for the active window
use crate::domain::device::SeriesKey;
use crate::domain::telemetry::AggregatedSeries;
use std::collections::HashMap;
use std::sync::Arc;

/// Fetched series for the currently active window, keyed by device/property.
///
/// Entries are only meaningful for one window span; the owner calls
/// [`reset`](Self::reset) whenever start, end or resolution change.
#[derive(Debug, Default)]
pub struct AggregatedSeriesCache {
    entries: HashMap<SeriesKey, Arc<AggregatedSeries>>,
}

impl AggregatedSeriesCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SeriesKey) -> Option<Arc<AggregatedSeries>> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &SeriesKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn put(&mut self, key: SeriesKey, series: AggregatedSeries) {
        self.entries.insert(key, Arc::new(series));
    }

    pub fn reset(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!("Dropping {} cached series", self.entries.len());
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached series of one device, by property id.
    pub fn device_entries<'a>(
        &'a self,
        device_id: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a AggregatedSeries)> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| key.device_id == device_id)
            .map(|(key, series)| (key.property_id.as_str(), series.as_ref()))
    }
}
