// Application state for HTTP handlers
use crate::application::dashboard_service::DashboardHandle;
use chrono::{DateTime, Utc};

#[derive(Clone)]
pub struct AppState {
    pub dashboard: DashboardHandle,
    /// Range the time slider may be dragged over.
    pub slider_range: (DateTime<Utc>, DateTime<Utc>),
}
