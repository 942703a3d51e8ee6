use crate::application::rate_limiter::{DEFAULT_INTERVAL, DEFAULT_RETRY_DELAY};
use crate::domain::device::{DeviceCatalog, DeviceGroup, DeviceProperty, DeviceTree};
use crate::domain::time_window::Resolution;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub timeline: TimelineSettings,
    #[serde(default)]
    pub adapter: AdapterSettings,
    pub influx: Option<InfluxSettings>,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimelineSettings {
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// First instant the data source has data for.
    pub data_start: Option<DateTime<Utc>>,
    pub data_end: Option<DateTime<Utc>>,
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            lookback_days: default_lookback_days(),
            data_start: None,
            data_end: None,
            rate_limit_ms: default_rate_limit_ms(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_lookback_days() -> i64 {
    14
}

fn default_rate_limit_ms() -> u64 {
    DEFAULT_INTERVAL.as_millis() as u64
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}

/// Padding around the data range so the slider selection stays visible.
const SLIDER_MARGIN_DAYS: i64 = 2;

impl TimelineSettings {
    pub fn data_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.data_start, self.data_end) {
            (Some(start), Some(end)) if start < end => Some((start, end)),
            _ => None,
        }
    }

    /// Range the time slider can be dragged over.
    pub fn slider_range(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self.data_range() {
            Some((start, end)) => (
                start - Duration::days(SLIDER_MARGIN_DAYS),
                end + Duration::days(SLIDER_MARGIN_DAYS),
            ),
            None => (
                DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or(now),
                now + Duration::days(7),
            ),
        }
    }

    pub fn rate_limit(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.rate_limit_ms)
    }

    pub fn retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    #[default]
    Synthetic,
    Influx,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AdapterSettings {
    #[serde(default)]
    pub kind: AdapterKind,
    /// Artificial delay for synthetic fetches.
    #[serde(default)]
    pub latency_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub token: String,
    pub database: String,
    pub retention_policy: String,
    #[serde(default = "default_series_query")]
    pub series_query: String,
}

fn default_series_query() -> String {
    "SELECT mean(\"value\") AS \"value\" FROM \"sensor_data\" \
     WHERE \"device\"='${device}' AND \"property\"='${property}' \
     AND time >= '${start}' AND time < '${end}' \
     GROUP BY time(${interval}) fill(none)"
        .to_string()
}

/// Building model: device tree and property metadata.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ModelConfig {
    #[serde(default)]
    pub groups: Vec<DeviceGroup>,
    #[serde(default)]
    pub properties: Vec<DeviceProperty>,
}

impl ModelConfig {
    pub fn to_catalog(&self) -> DeviceCatalog {
        DeviceCatalog::new(DeviceTree::new(self.groups.clone()), self.properties.clone())
    }
}

/// Load `config/dashboard.*`, overridable with `DASHBOARD__SECTION__KEY` variables.
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard"))
        .add_source(config::Environment::with_prefix("DASHBOARD").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Replace template variables in a query string
pub fn prepare_query(query: &str, vars: &HashMap<String, String>) -> String {
    let mut result = query.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_prepare_query() {
        let mut vars = HashMap::new();
        vars.insert("device".to_string(), "sensor-12".to_string());
        vars.insert("interval".to_string(), "15m".to_string());

        let query = "SELECT mean(value) FROM s WHERE device='${device}' GROUP BY time(${interval})";
        let result = prepare_query(query, &vars);

        assert_eq!(result, "SELECT mean(value) FROM s WHERE device='sensor-12' GROUP BY time(15m)");
    }

    #[test]
    fn test_deserialize_model_from_toml() {
        let source = r#"
            [timeline]
            resolution = "PT15M"
            data_start = "2023-01-01T00:00:00Z"
            data_end = "2023-02-01T00:00:00Z"

            [[model.properties]]
            id = "temp"
            name = "Temperature"
            data_unit = "celsius"
            range_min = 15.0
            range_max = 30.0

            [[model.groups]]
            id = "floor-1"
            name = "Floor 1"

            [[model.groups.devices]]
            id = "sensor-1"
            property_ids = ["temp"]
        "#;

        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.timeline.resolution, Resolution::FifteenMinutes);
        assert_eq!(config.timeline.rate_limit_ms, 16);
        assert_eq!(config.adapter.kind, AdapterKind::Synthetic);
        assert_eq!(config.server.bind, "0.0.0.0:8080");

        let catalog = config.model.to_catalog();
        assert_eq!(catalog.tree.devices_in_group("floor-1").len(), 1);
        assert_eq!(catalog.unit_for("temp"), "°C");

        let (slider_start, _) = config.timeline.slider_range(Utc::now());
        assert_eq!(slider_start, Utc.with_ymd_and_hms(2022, 12, 30, 0, 0, 0).unwrap());
    }
}
