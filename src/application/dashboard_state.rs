// Owned state of one dashboard session and its update methods
use crate::application::chart_builder;
use crate::application::query_coordinator::{
    CompletionOutcome, FetchRequest, InterestSelection, QueryCoordinator, SelectionTarget,
};
use crate::application::rate_limiter::{RateLimiter, Submission};
use crate::application::series_cache::AggregatedSeriesCache;
use crate::application::value_resolver::{self, format_reading};
use crate::domain::device::{DeviceCatalog, SeriesKey};
use crate::domain::error::Result;
use crate::domain::telemetry::{AggregatedSeries, ChartSeries, LiveReading};
use crate::domain::time_window::{Resolution, TimeWindow};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Resolution a newly selected group is shown at.
pub const GROUP_RESOLUTION: Resolution = Resolution::OneHour;

/// Side effects the owner of the state has to carry out after an update.
#[derive(Debug, Default, PartialEq)]
pub struct Effects {
    pub applied_window: Option<TimeWindow>,
    pub fetches: Vec<FetchRequest>,
    /// Arm a retry of the rate-limited window update after this delay.
    pub retry_after: Option<Duration>,
}

impl Effects {
    fn merge(mut self, other: Effects) -> Effects {
        if other.applied_window.is_some() {
            self.applied_window = other.applied_window;
        }
        self.fetches.extend(other.fetches);
        self.retry_after = other.retry_after.or(self.retry_after);
        self
    }
}

/// Time window, cache, in-flight fetches and selection of a dashboard.
///
/// Every mutation goes through a method here so the cache is always reset
/// before the coordinator sees a new window span.
pub struct DashboardState {
    catalog: DeviceCatalog,
    window: TimeWindow,
    limiter: RateLimiter<TimeWindow>,
    cache: AggregatedSeriesCache,
    coordinator: QueryCoordinator,
    selection: InterestSelection,
    live_values: HashMap<SeriesKey, LiveReading>,
}

impl DashboardState {
    pub fn new(catalog: DeviceCatalog, window: TimeWindow, limiter: RateLimiter<TimeWindow>) -> Self {
        Self {
            catalog,
            window,
            limiter,
            cache: AggregatedSeriesCache::new(),
            coordinator: QueryCoordinator::new(),
            selection: InterestSelection::default(),
            live_values: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn selection(&self) -> &InterestSelection {
        &self.selection
    }

    pub fn cache(&self) -> &AggregatedSeriesCache {
        &self.cache
    }

    pub fn pending_fetches(&self) -> usize {
        self.coordinator.pending_len()
    }

    /// Newest window asked for, applied or not.
    fn latest_requested(&self) -> TimeWindow {
        self.limiter.pending().copied().unwrap_or(self.window)
    }

    /// Slider or date-picker change. `current` defaults to `start`.
    pub fn submit_time_window_change(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        current: Option<DateTime<Utc>>,
    ) -> Result<Effects> {
        let resolution = self.latest_requested().resolution();
        let window = TimeWindow::create(start, end, resolution, current.unwrap_or(start))?;
        Ok(self.submit(window))
    }

    /// Time marker drag or playback tick.
    pub fn set_current_time(&mut self, t: DateTime<Utc>) -> Effects {
        let window = self.latest_requested().with_current(t);
        self.submit(window)
    }

    /// Resolution changes are not rate limited.
    pub fn set_resolution(&mut self, resolution: Resolution) -> Effects {
        if let Some(pending) = self.limiter.pending_mut() {
            *pending = pending.with_resolution(resolution);
        }
        if self.window.resolution() == resolution {
            return Effects::default();
        }
        self.apply_window(self.window.with_resolution(resolution))
    }

    /// Retry timer fired: apply the pending window if the interval allows.
    pub fn retry_pending(&mut self) -> Effects {
        let mut effects = match self.limiter.poll() {
            Some(window) => self.apply_window(window),
            None => Effects::default(),
        };
        if self.limiter.has_pending() {
            effects.retry_after = Some(self.limiter.retry_delay());
        }
        effects
    }

    fn submit(&mut self, window: TimeWindow) -> Effects {
        match self.limiter.submit(window) {
            Submission::Applied(window) => self.apply_window(window),
            Submission::Deferred { retry_in } => Effects {
                retry_after: Some(retry_in),
                ..Effects::default()
            },
        }
    }

    fn apply_window(&mut self, window: TimeWindow) -> Effects {
        if window.span() != self.window.span() {
            tracing::info!("Time window changed to {}", window.span());
            self.cache.reset();
        }
        self.window = window;

        Effects {
            applied_window: Some(window),
            ..self.reconcile()
        }
    }

    /// Select a group, hover a device, or (`None`) go back to the whole model.
    pub fn set_interest_selection(&mut self, target: Option<SelectionTarget>) -> Effects {
        let mut effects = Effects::default();
        match target {
            Some(SelectionTarget::Group(group_id)) => {
                if self.selection.group.as_deref() != Some(group_id.as_str()) {
                    tracing::info!("Selected group {}", group_id);
                    self.selection.group = Some(group_id);
                    if self.window.resolution() != GROUP_RESOLUTION {
                        effects = self.set_resolution(GROUP_RESOLUTION);
                    }
                }
            }
            Some(SelectionTarget::Device(device_id)) => {
                self.selection.hovered_device = Some(device_id);
            }
            None => {
                self.selection = InterestSelection::default();
            }
        }
        effects.merge(self.reconcile())
    }

    /// Mouse left the hovered device; the selected group stays.
    pub fn clear_hover(&mut self) -> Effects {
        if let Some(device_id) = self.selection.hovered_device.take() {
            tracing::debug!("Hover on {} cleared", device_id);
        }
        Effects::default()
    }

    /// Fetches needed for the current selection under the active window.
    pub fn reconcile(&mut self) -> Effects {
        let interest = self.selection.interest_set(&self.catalog.tree);
        Effects {
            fetches: self
                .coordinator
                .reconcile(&interest, self.window.span(), &self.cache),
            ..Effects::default()
        }
    }

    /// Route a finished fetch. Failures are handed back after the pending
    /// entry is dropped so the caller can report them.
    pub fn on_fetch_finished(
        &mut self,
        request: FetchRequest,
        result: Result<AggregatedSeries>,
    ) -> Result<CompletionOutcome> {
        match result {
            Ok(series) => Ok(self.coordinator.complete(
                request,
                series,
                self.window.span(),
                &mut self.cache,
            )),
            Err(error) => {
                self.coordinator.fail(&request, &error);
                Err(error)
            }
        }
    }

    /// Normalized value for heatmap coloring at the current time.
    pub fn sensor_value(&self, device_id: &str, property_id: &str) -> f64 {
        value_resolver::sensor_value(
            &SeriesKey::new(device_id, property_id),
            &self.cache,
            &self.catalog,
            self.window.current_epoch_seconds(),
        )
    }

    /// Chart series of every cached property of a device.
    pub fn chart_data(&self, device_id: &str) -> BTreeMap<String, ChartSeries> {
        self.cache
            .device_entries(device_id)
            .map(|(property_id, series)| {
                let unit = self.catalog.unit_for(property_id);
                (property_id.to_string(), chart_builder::build(series, &unit))
            })
            .collect()
    }

    /// Tooltip text per property at the current time, e.g. "21.50 °C".
    pub fn device_readings(&self, device_id: &str) -> BTreeMap<String, String> {
        let t = self.window.current_epoch_seconds();
        self.cache
            .device_entries(device_id)
            .filter_map(|(property_id, series)| {
                let value = value_resolver::closest_sample(series, t).ok()?;
                let unit = self.catalog.unit_for(property_id);
                Some((property_id.to_string(), format_reading(value, &unit)))
            })
            .collect()
    }

    /// Record values pushed by the live feed; returns how many were kept.
    /// Readings for devices or properties outside the catalog are dropped.
    pub fn apply_live_readings(&mut self, readings: Vec<LiveReading>) -> usize {
        let mut applied = 0;
        for reading in readings {
            let known = self
                .catalog
                .tree
                .find_device(&reading.device_id)
                .is_some_and(|d| d.property_ids.contains(&reading.property_id))
                && self.catalog.property(&reading.property_id).is_some();
            if !known {
                tracing::debug!(
                    "Dropping live reading for unknown {}/{}",
                    reading.device_id,
                    reading.property_id
                );
                continue;
            }

            let key = SeriesKey::new(reading.device_id.clone(), reading.property_id.clone());
            let newer = match (self.live_values.get(&key), reading.timestamp) {
                (Some(existing), Some(ts)) => existing.timestamp.is_none_or(|prev| ts >= prev),
                _ => true,
            };
            if newer {
                self.live_values.insert(key, reading);
                applied += 1;
            }
        }
        applied
    }

    pub fn current_property_value(&self, device_id: &str, property_id: &str) -> Option<&LiveReading> {
        self.live_values
            .get(&SeriesKey::new(device_id, property_id))
    }
}
