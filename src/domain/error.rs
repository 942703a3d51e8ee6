// Error taxonomy for the time-window engine
use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DashboardError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DashboardError {
    /// A window whose end does not come after its start.
    #[error("invalid time range: end {end} is not after start {start}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Closest-sample lookup on a series with no samples.
    #[error("aggregated series is empty")]
    EmptySeries,

    #[error("series data is malformed: {0}")]
    MalformedSeries(String),

    #[error("fetch failed for {device_id}/{property_id}: {reason}")]
    Fetch {
        device_id: String,
        property_id: String,
        reason: String,
    },

    #[error("unknown resolution: {0}")]
    UnknownResolution(String),

    #[error("malformed live update: {0}")]
    MalformedLiveUpdate(String),

    #[error("dashboard service is no longer running")]
    ServiceStopped,
}
