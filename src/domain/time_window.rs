// Time window domain model
use super::error::{DashboardError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bucket size of the aggregated data requested for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "P1D")]
    OneDay,
    #[serde(rename = "PT6H")]
    SixHours,
    #[default]
    #[serde(rename = "PT1H")]
    OneHour,
    #[serde(rename = "PT15M")]
    FifteenMinutes,
    #[serde(rename = "PT5M")]
    FiveMinutes,
}

impl Resolution {
    pub fn all() -> &'static [Resolution] {
        &[
            Resolution::OneDay,
            Resolution::SixHours,
            Resolution::OneHour,
            Resolution::FifteenMinutes,
            Resolution::FiveMinutes,
        ]
    }

    /// ISO-8601 duration used by the UI and the data adapters.
    pub fn as_iso8601(&self) -> &'static str {
        match self {
            Resolution::OneDay => "P1D",
            Resolution::SixHours => "PT6H",
            Resolution::OneHour => "PT1H",
            Resolution::FifteenMinutes => "PT15M",
            Resolution::FiveMinutes => "PT5M",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Resolution::OneDay => "1 day",
            Resolution::SixHours => "6 hrs",
            Resolution::OneHour => "1 hr",
            Resolution::FifteenMinutes => "15 mins",
            Resolution::FiveMinutes => "5 min",
        }
    }

    pub fn bucket_seconds(&self) -> i64 {
        match self {
            Resolution::OneDay => 24 * 60 * 60,
            Resolution::SixHours => 6 * 60 * 60,
            Resolution::OneHour => 60 * 60,
            Resolution::FifteenMinutes => 15 * 60,
            Resolution::FiveMinutes => 5 * 60,
        }
    }

    /// Interval literal for an InfluxQL `GROUP BY time(..)` clause.
    pub fn influx_interval(&self) -> &'static str {
        match self {
            Resolution::OneDay => "1d",
            Resolution::SixHours => "6h",
            Resolution::OneHour => "1h",
            Resolution::FifteenMinutes => "15m",
            Resolution::FiveMinutes => "5m",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_iso8601())
    }
}

impl FromStr for Resolution {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        Resolution::all()
            .iter()
            .copied()
            .find(|r| r.as_iso8601().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DashboardError::UnknownResolution(s.to_string()))
    }
}

/// The part of a window that identifies which aggregated data belongs to it.
///
/// Fetches are tagged with the span they were issued under; moving only the
/// current-time marker keeps the span unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WindowSpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub resolution: Resolution,
}

impl fmt::Display for WindowSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}@{}",
            self.start.to_rfc3339(),
            self.end.to_rfc3339(),
            self.resolution
        )
    }
}

/// Half-open time interval with a resolution and a current-time marker.
///
/// Values are never mutated; every transition returns a new window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    resolution: Resolution,
    current: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window. `current` is clamped into `[start, end]`.
    pub fn create(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Resolution,
        current: DateTime<Utc>,
    ) -> Result<Self> {
        if end <= start {
            return Err(DashboardError::InvalidRange { start, end });
        }
        Ok(Self {
            start,
            end,
            resolution,
            current: current.clamp(start, end),
        })
    }

    /// Window the dashboard opens with: two weeks back from today (UTC
    /// midnight) up to tomorrow, pulled into the data range when one is known.
    pub fn default_for(
        now: DateTime<Utc>,
        data_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
        lookback_days: i64,
        resolution: Resolution,
    ) -> Result<Self> {
        let today = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .unwrap_or(now);

        let mut current = today;
        let mut end = today + Duration::days(1);
        let mut start = today - Duration::days(lookback_days);

        if let Some((data_start, data_end)) = data_range {
            if start < data_start || start >= data_end {
                start = data_start;
            }
            if end <= data_start || end >= data_end {
                end = data_end;
            }
            if current <= data_start || current >= data_end {
                current = data_end;
            }
        }

        Self::create(start, end, resolution, current)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn current(&self) -> DateTime<Utc> {
        self.current
    }

    pub fn current_epoch_seconds(&self) -> i64 {
        self.current.timestamp()
    }

    pub fn span(&self) -> WindowSpan {
        WindowSpan {
            start: self.start,
            end: self.end,
            resolution: self.resolution,
        }
    }

    pub fn with_current(&self, t: DateTime<Utc>) -> Self {
        Self {
            current: t.clamp(self.start, self.end),
            ..*self
        }
    }

    pub fn with_bounds(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        Self::create(start, end, self.resolution, self.current)
    }

    pub fn with_resolution(&self, resolution: Resolution) -> Self {
        Self { resolution, ..*self }
    }
}
