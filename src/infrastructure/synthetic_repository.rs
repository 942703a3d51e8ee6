// Synthetic repository - Deterministic generated data for demos and local development
use crate::application::telemetry_repository::TelemetryRepository;
use crate::domain::device::DeviceCatalog;
use crate::domain::telemetry::AggregatedSeries;
use crate::domain::time_window::WindowSpan;
use anyhow::Result;
use async_trait::async_trait;
use std::f64::consts::PI;
use std::time::Duration;

const SECONDS_PER_DAY: f64 = 86_400.0;
/// Upper bound on buckets generated for one series (about a year at PT5M).
pub const MAX_BUCKETS: i64 = 105_120;

#[derive(Debug, Clone)]
pub struct SyntheticRepository {
    catalog: DeviceCatalog,
    latency: Duration,
}

impl SyntheticRepository {
    pub fn new(catalog: DeviceCatalog, latency: Duration) -> Self {
        Self { catalog, latency }
    }

    /// Stable per-device phase so neighbouring sensors do not move in lockstep.
    fn phase(device_id: &str) -> f64 {
        let hash = device_id
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
        (hash % 360) as f64 * PI / 180.0
    }

    /// A daily cycle around the middle of the property's range.
    fn generate(
        &self,
        device_id: &str,
        property_id: &str,
        span: &WindowSpan,
    ) -> Result<AggregatedSeries> {
        let (min, max) = self
            .catalog
            .property(property_id)
            .map(|p| {
                let range = p.effective_range();
                (range.min, range.max)
            })
            .unwrap_or((0.0, 100.0));
        let mid = (min + max) / 2.0;
        let amplitude = (max - min) * 0.35;
        let phase = Self::phase(device_id);

        let step = span.resolution.bucket_seconds();
        let first = span.start.timestamp().div_euclid(step) * step;
        let end = span.end.timestamp();
        let buckets = (end - first + step - 1) / step;
        if buckets > MAX_BUCKETS {
            anyhow::bail!(
                "{} needs {} buckets, more than the {} allowed",
                span,
                buckets,
                MAX_BUCKETS
            );
        }

        let samples = (0..)
            .map(|i| first + i * step)
            .take_while(|ts| *ts < end)
            .filter(|ts| *ts >= span.start.timestamp())
            .map(|ts| {
                let angle = 2.0 * PI * (ts as f64 / SECONDS_PER_DAY) + phase;
                (ts, mid + amplitude * angle.sin())
            })
            .collect();

        Ok(AggregatedSeries::from_samples(samples))
    }
}

#[async_trait]
impl TelemetryRepository for SyntheticRepository {
    async fn load_catalog(&self) -> Result<DeviceCatalog> {
        Ok(self.catalog.clone())
    }

    async fn fetch_aggregated_series(
        &self,
        device_id: &str,
        property_id: &str,
        span: &WindowSpan,
    ) -> Result<AggregatedSeries> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.catalog.tree.find_device(device_id).is_none() {
            anyhow::bail!("Unknown device {}", device_id);
        }
        self.generate(device_id, property_id, span)
    }
}
