// Decides which series need fetching and tracks fetches in flight
use crate::application::series_cache::AggregatedSeriesCache;
use crate::domain::device::{DeviceRef, DeviceTree, SeriesKey};
use crate::domain::error::DashboardError;
use crate::domain::telemetry::AggregatedSeries;
use crate::domain::time_window::WindowSpan;
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};

/// One fetch against the data store, tagged with the span it was issued under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    pub key: SeriesKey,
    pub span: WindowSpan,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionTarget {
    Group(String),
    Device(String),
}

/// What the user is currently looking at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestSelection {
    pub group: Option<String>,
    pub hovered_device: Option<String>,
}

impl InterestSelection {
    /// Series needed for this selection:
    /// devices of the selected group, plus the hovered device, or every
    /// device in the model when no group is selected.
    pub fn interest_set(&self, tree: &DeviceTree) -> BTreeSet<SeriesKey> {
        let mut devices: Vec<&DeviceRef> = match &self.group {
            Some(group_id) => tree.devices_in_group(group_id),
            None => tree.all_devices(),
        };

        if let Some(hovered) = self.hovered_device.as_deref() {
            match tree.find_device(hovered) {
                Some(device) => devices.push(device),
                None => tracing::debug!("Hovered device {} is not in the device tree", hovered),
            }
        }

        devices.iter().flat_map(|d| d.series_keys()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Stored,
    /// The window changed while the fetch was in flight.
    StaleDiscarded,
}

/// Owns the set of fetches in flight.
#[derive(Debug, Default)]
pub struct QueryCoordinator {
    pending: HashSet<FetchRequest>,
}

impl QueryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, key: &SeriesKey, span: &WindowSpan) -> bool {
        self.pending.contains(&FetchRequest {
            key: key.clone(),
            span: *span,
        })
    }

    /// Fetches to issue for every pair of `interest` that is neither cached nor
    /// already in flight for `span`. Calling it again without completions in
    /// between returns nothing new.
    pub fn reconcile(
        &mut self,
        interest: &BTreeSet<SeriesKey>,
        span: WindowSpan,
        cache: &AggregatedSeriesCache,
    ) -> Vec<FetchRequest> {
        let mut requests = Vec::new();
        for key in interest {
            if cache.contains(key) {
                continue;
            }
            let request = FetchRequest {
                key: key.clone(),
                span,
            };
            if self.pending.insert(request.clone()) {
                requests.push(request);
            }
        }

        if !requests.is_empty() {
            tracing::debug!(
                "Issuing {} fetches for {} ({} in flight)",
                requests.len(),
                span,
                self.pending.len()
            );
        }
        requests
    }

    /// Store a finished fetch, unless it belongs to a window that is no longer active.
    pub fn complete(
        &mut self,
        request: FetchRequest,
        series: AggregatedSeries,
        active_span: WindowSpan,
        cache: &mut AggregatedSeriesCache,
    ) -> CompletionOutcome {
        self.pending.remove(&request);

        if request.span != active_span {
            tracing::debug!(
                "Discarding {} fetched for {}, active window is {}",
                request.key,
                request.span,
                active_span
            );
            return CompletionOutcome::StaleDiscarded;
        }

        cache.put(request.key, series);
        CompletionOutcome::Stored
    }

    /// Forget a failed fetch; the pair is retried by the next `reconcile`.
    pub fn fail(&mut self, request: &FetchRequest, error: &DashboardError) {
        self.pending.remove(request);
        tracing::warn!("Fetch for {} ({}) failed: {}", request.key, request.span, error);
    }
}
