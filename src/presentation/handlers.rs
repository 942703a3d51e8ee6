// HTTP request handlers
use crate::application::query_coordinator::SelectionTarget;
use crate::domain::error::DashboardError;
use crate::domain::telemetry::LiveReading;
use crate::domain::time_window::{Resolution, TimeWindow};
use crate::infrastructure::event_stream::stream_from_receiver;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::infrastructure::live_feed::parse_live_message;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type HandlerResult = Result<Response, DashboardError>;

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = match &self {
            DashboardError::InvalidRange { .. }
            | DashboardError::UnknownResolution(_)
            | DashboardError::MalformedLiveUpdate(_) => StatusCode::BAD_REQUEST,
            DashboardError::ServiceStopped => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct WindowRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub current: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CurrentRequest {
    pub current: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ResolutionRequest {
    pub resolution: String,
}

#[derive(Debug, Serialize)]
pub struct TimelineView {
    pub window: TimeWindow,
    pub slider_start: DateTime<Utc>,
    pub slider_end: DateTime<Utc>,
    pub resolutions: Vec<ResolutionOption>,
}

#[derive(Debug, Serialize)]
pub struct ResolutionOption {
    pub value: Resolution,
    pub label: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PropertyValue {
    /// Normalized to [0, 1] for the heatmap.
    pub value: f64,
    pub live: Option<LiveReading>,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn get_timeline(headers: HeaderMap, State(state): State<Arc<AppState>>) -> HandlerResult {
    let window = state.dashboard.time_window().await?;
    let (slider_start, slider_end) = state.slider_range;
    let view = TimelineView {
        window,
        slider_start,
        slider_end,
        resolutions: Resolution::all()
            .iter()
            .map(|r| ResolutionOption {
                value: *r,
                label: r.label(),
            })
            .collect(),
    };
    Ok(json_response(&view, accepts_brotli(&headers)).await.into_response())
}

/// Rate limited: the change may be applied a few milliseconds later.
pub async fn put_timeline(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WindowRequest>,
) -> HandlerResult {
    state
        .dashboard
        .submit_time_window_change(request.start, request.end, request.current)
        .await?;
    Ok(StatusCode::ACCEPTED.into_response())
}

pub async fn put_current_time(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CurrentRequest>,
) -> HandlerResult {
    state.dashboard.set_current_time(request.current).await?;
    Ok(StatusCode::ACCEPTED.into_response())
}

pub async fn put_resolution(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResolutionRequest>,
) -> HandlerResult {
    let resolution: Resolution = request.resolution.parse()?;
    state.dashboard.set_resolution(resolution).await?;
    Ok(StatusCode::ACCEPTED.into_response())
}

/// `{"group": id}`, `{"device": id}` or `null` to clear.
pub async fn put_selection(
    State(state): State<Arc<AppState>>,
    Json(target): Json<Option<SelectionTarget>>,
) -> HandlerResult {
    state.dashboard.set_interest_selection(target).await?;
    Ok(StatusCode::ACCEPTED.into_response())
}

/// Mouse left the hovered device; the group selection is kept.
pub async fn delete_hover(State(state): State<Arc<AppState>>) -> HandlerResult {
    state.dashboard.clear_hover().await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn list_properties(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> HandlerResult {
    let properties = state.dashboard.properties().await?;
    Ok(json_response(&properties, accepts_brotli(&headers))
        .await
        .into_response())
}

pub async fn device_chart(
    Path(device_id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> HandlerResult {
    let charts = state.dashboard.get_chart_data(&device_id).await?;
    Ok(json_response(&charts, accepts_brotli(&headers))
        .await
        .into_response())
}

pub async fn device_readings(
    Path(device_id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> HandlerResult {
    let readings = state.dashboard.device_readings(&device_id).await?;
    Ok(json_response(&readings, accepts_brotli(&headers))
        .await
        .into_response())
}

pub async fn property_value(
    Path((device_id, property_id)): Path<(String, String)>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> HandlerResult {
    let value = PropertyValue {
        value: state.dashboard.get_sensor_value(&device_id, &property_id).await?,
        live: state.dashboard.live_value(&device_id, &property_id).await?,
    };
    Ok(json_response(&value, accepts_brotli(&headers))
        .await
        .into_response())
}

/// Push endpoint for the device data feed.
pub async fn post_live(State(state): State<Arc<AppState>>, body: String) -> HandlerResult {
    let readings = parse_live_message(&body)?;
    tracing::debug!("Received {} live readings", readings.len());
    state.dashboard.apply_live_readings(readings).await?;
    Ok(StatusCode::ACCEPTED.into_response())
}

/// Stream dashboard events (window changes, query completions, live updates)
pub async fn stream_events(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    stream_from_receiver(state.dashboard.subscribe(), accepts_brotli(&headers))
}
