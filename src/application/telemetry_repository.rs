// Repository trait for device metadata and aggregated data access
use crate::domain::device::DeviceCatalog;
use crate::domain::telemetry::AggregatedSeries;
use crate::domain::time_window::WindowSpan;
use async_trait::async_trait;

#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Device tree and property metadata of the building
    async fn load_catalog(&self) -> anyhow::Result<DeviceCatalog>;

    /// Aggregated values of one device property, bucketed by the span's resolution
    async fn fetch_aggregated_series(
        &self,
        device_id: &str,
        property_id: &str,
        span: &WindowSpan,
    ) -> anyhow::Result<AggregatedSeries>;
}
