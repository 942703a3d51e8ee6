// InfluxDB repository implementation
use crate::application::telemetry_repository::TelemetryRepository;
use crate::domain::device::DeviceCatalog;
use crate::domain::telemetry::AggregatedSeries;
use crate::domain::time_window::WindowSpan;
use crate::infrastructure::config::{prepare_query, InfluxSettings};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct InfluxRepository {
    client: reqwest::Client,
    host: String,
    token: String,
    database: String,
    retention_policy: String,
    series_query: String,
    catalog: DeviceCatalog,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResponse {
    results: Vec<InfluxQLResult>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResult {
    #[serde(default)]
    series: Option<Vec<InfluxQLSeries>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLSeries {
    #[allow(dead_code)]
    name: String,
    columns: Vec<String>,
    values: Vec<Vec<serde_json::Value>>,
}

impl InfluxRepository {
    /// The building model is not stored in Influx, so the catalog comes from configuration.
    pub fn new(settings: InfluxSettings, catalog: DeviceCatalog) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: settings.host.trim_end_matches('/').to_string(),
            token: settings.token,
            database: settings.database,
            retention_policy: settings.retention_policy,
            series_query: settings.series_query,
            catalog,
        }
    }

    fn build_query_url(&self, query: &str) -> String {
        let encoded_query = urlencoding::encode(query);
        format!(
            "{}/query?db={}&rp={}&q={}&epoch=s",
            self.host, self.database, self.retention_policy, encoded_query
        )
    }

    fn series_query_for(&self, device_id: &str, property_id: &str, span: &WindowSpan) -> String {
        let mut vars = HashMap::new();
        vars.insert("device".to_string(), device_id.to_string());
        vars.insert("property".to_string(), property_id.to_string());
        vars.insert(
            "start".to_string(),
            span.start.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        vars.insert(
            "end".to_string(),
            span.end.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        vars.insert(
            "interval".to_string(),
            span.resolution.influx_interval().to_string(),
        );
        prepare_query(&self.series_query, &vars)
    }

    async fn execute_query(&self, query: &str) -> Result<InfluxQLResponse> {
        let url = self.build_query_url(query);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request to InfluxDB")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB query failed with status {}: {}", status, body);
        }

        let data = response
            .json::<InfluxQLResponse>()
            .await
            .context("Failed to parse InfluxDB response")?;

        // Check for errors in the response
        if let Some(result) = data.results.first() {
            if let Some(error) = &result.error {
                anyhow::bail!("InfluxDB query error: {}", error);
            }
        }

        Ok(data)
    }

    /// `(epoch seconds, value)` rows of the first result; rows with a null value are skipped.
    fn parse_series(response: &InfluxQLResponse) -> AggregatedSeries {
        let mut samples = Vec::new();
        if let Some(series) = response.results.first().and_then(|r| r.series.as_ref()) {
            for s in series {
                let time_idx = s.columns.iter().position(|c| c == "time").unwrap_or(0);
                let value_idx = s.columns.iter().position(|c| c == "value").unwrap_or(1);

                for row in &s.values {
                    let time = row.get(time_idx).and_then(|v| v.as_i64());
                    let value = row.get(value_idx).and_then(|v| v.as_f64());
                    if let (Some(time), Some(value)) = (time, value) {
                        samples.push((time, value));
                    }
                }
            }
        }
        AggregatedSeries::from_samples(samples)
    }
}

#[async_trait]
impl TelemetryRepository for InfluxRepository {
    async fn load_catalog(&self) -> Result<DeviceCatalog> {
        Ok(self.catalog.clone())
    }

    async fn fetch_aggregated_series(
        &self,
        device_id: &str,
        property_id: &str,
        span: &WindowSpan,
    ) -> Result<AggregatedSeries> {
        let query = self.series_query_for(device_id, property_id, span);
        tracing::debug!("Executing series query: {}", query);

        let response = self
            .execute_query(&query)
            .await
            .with_context(|| format!("Fetching {}/{} for {}", device_id, property_id, span))?;
        let series = Self::parse_series(&response);

        tracing::debug!(
            "Got {} buckets for {}/{} from InfluxDB",
            series.len(),
            device_id,
            property_id
        );
        Ok(series)
    }
}
