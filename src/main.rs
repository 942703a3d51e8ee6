// Main entry point - Dependency injection and server setup
use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use dataviz_timeline::application::clock::TokioClock;
use dataviz_timeline::application::dashboard_service::DashboardService;
use dataviz_timeline::application::dashboard_state::DashboardState;
use dataviz_timeline::application::rate_limiter::RateLimiter;
use dataviz_timeline::application::telemetry_repository::TelemetryRepository;
use dataviz_timeline::domain::time_window::TimeWindow;
use dataviz_timeline::infrastructure::config::{load_app_config, AdapterKind, AppConfig};
use dataviz_timeline::infrastructure::influx_repository::InfluxRepository;
use dataviz_timeline::infrastructure::synthetic_repository::SyntheticRepository;
use dataviz_timeline::presentation::app_state::AppState;
use dataviz_timeline::presentation::handlers::{
    delete_hover, device_chart, device_readings, get_timeline, health_check, list_properties, post_live,
    property_value, put_current_time, put_resolution, put_selection, put_timeline, stream_events,
};

fn build_repository(config: &AppConfig) -> anyhow::Result<Arc<dyn TelemetryRepository>> {
    let catalog = config.model.to_catalog();
    let repository: Arc<dyn TelemetryRepository> = match config.adapter.kind {
        AdapterKind::Synthetic => Arc::new(SyntheticRepository::new(
            catalog,
            std::time::Duration::from_millis(config.adapter.latency_ms),
        )),
        AdapterKind::Influx => {
            let influx = config
                .influx
                .clone()
                .context("adapter.kind is influx but no [influx] section is configured")?;
            Arc::new(InfluxRepository::new(influx, catalog))
        }
    };
    Ok(repository)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_app_config().context("Failed to load config/dashboard")?;

    // Create repository (infrastructure layer)
    let repository = build_repository(&config)?;
    let catalog = repository
        .load_catalog()
        .await
        .context("Failed to load device catalog")?;
    tracing::info!(
        "Loaded {} devices and {} properties",
        catalog.tree.all_devices().len(),
        catalog.properties().count()
    );

    // Create dashboard service (application layer)
    let now = Utc::now();
    let timeline = &config.timeline;
    let window = TimeWindow::default_for(
        now,
        timeline.data_range(),
        timeline.lookback_days,
        timeline.resolution,
    )?;
    let limiter = RateLimiter::new(
        Arc::new(TokioClock),
        timeline.rate_limit(),
        timeline.retry_delay(),
    );
    let dashboard = DashboardService::spawn(DashboardState::new(catalog, window, limiter), repository);

    let state = Arc::new(AppState {
        dashboard,
        slider_range: timeline.slider_range(now),
    });

    // Build router (presentation layer)
    // Note: JSON bodies are compressed by our response builders, so there is
    // no CompressionLayer here
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/timeline", get(get_timeline).put(put_timeline))
        .route("/timeline/current", put(put_current_time))
        .route("/timeline/resolution", put(put_resolution))
        .route("/selection", put(put_selection))
        .route("/selection/hover", delete(delete_hover))
        .route("/properties", get(list_properties))
        .route("/devices/:id/chart", get(device_chart))
        .route("/devices/:id/readings", get(device_readings))
        .route("/devices/:id/properties/:pid/value", get(property_value))
        .route("/live", post(post_live))
        .route("/events", get(stream_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;
    tracing::info!("Starting dataviz-timeline service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
