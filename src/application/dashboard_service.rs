// Dashboard service - Single task owning the dashboard state, driven by commands
use crate::application::dashboard_state::{DashboardState, Effects};
use crate::application::query_coordinator::{CompletionOutcome, FetchRequest, SelectionTarget};
use crate::application::telemetry_repository::TelemetryRepository;
use crate::domain::device::DeviceProperty;
use crate::domain::error::{DashboardError, Result};
use crate::domain::telemetry::{AggregatedSeries, ChartSeries, LiveReading};
use crate::domain::time_window::{Resolution, TimeWindow, WindowSpan};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

const COMMAND_QUEUE_SIZE: usize = 256;
const EVENT_QUEUE_SIZE: usize = 256;

/// Notifications for the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DashboardEvent {
    WindowChanged {
        window: TimeWindow,
    },
    QueryCompleted {
        device_id: String,
        property_id: String,
        span: WindowSpan,
    },
    QueryFailed {
        device_id: String,
        property_id: String,
        reason: String,
    },
    LiveUpdate {
        readings: usize,
    },
}

type Inspect = Box<dyn FnOnce(&DashboardState) + Send>;

enum Command {
    SubmitWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        current: Option<DateTime<Utc>>,
        reply: oneshot::Sender<Result<()>>,
    },
    SetCurrentTime(DateTime<Utc>),
    SetResolution(Resolution),
    SetSelection(Option<SelectionTarget>),
    ClearHover,
    RetryPendingWindow,
    FetchFinished {
        request: FetchRequest,
        result: Result<AggregatedSeries>,
    },
    ApplyLive(Vec<LiveReading>),
    Inspect(Inspect),
}

/// Cloneable entry point used by the UI layer.
#[derive(Clone)]
pub struct DashboardHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<DashboardEvent>,
}

pub struct DashboardService {
    state: DashboardState,
    repository: Arc<dyn TelemetryRepository>,
    commands: mpsc::WeakSender<Command>,
    events: broadcast::Sender<DashboardEvent>,
    retry_armed: bool,
}

impl DashboardService {
    /// Start the service task and request data for the initial selection.
    pub fn spawn(state: DashboardState, repository: Arc<dyn TelemetryRepository>) -> DashboardHandle {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (events, _) = broadcast::channel(EVENT_QUEUE_SIZE);

        let service = DashboardService {
            state,
            repository,
            commands: tx.downgrade(),
            events: events.clone(),
            retry_armed: false,
        };
        tokio::spawn(service.run(rx));

        DashboardHandle {
            commands: tx,
            events,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let initial = self.state.reconcile();
        self.execute(initial);

        while let Some(command) = rx.recv().await {
            let effects = self.handle(command);
            self.execute(effects);
        }
        tracing::debug!("Dashboard service stopped");
    }

    fn handle(&mut self, command: Command) -> Effects {
        match command {
            Command::SubmitWindow {
                start,
                end,
                current,
                reply,
            } => match self.state.submit_time_window_change(start, end, current) {
                Ok(effects) => {
                    let _ = reply.send(Ok(()));
                    effects
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                    Effects::default()
                }
            },
            Command::SetCurrentTime(t) => self.state.set_current_time(t),
            Command::SetResolution(resolution) => self.state.set_resolution(resolution),
            Command::SetSelection(target) => self.state.set_interest_selection(target),
            Command::ClearHover => self.state.clear_hover(),
            Command::RetryPendingWindow => {
                self.retry_armed = false;
                self.state.retry_pending()
            }
            Command::FetchFinished { request, result } => {
                self.finish_fetch(request, result);
                Effects::default()
            }
            Command::ApplyLive(readings) => {
                let applied = self.state.apply_live_readings(readings);
                self.publish(DashboardEvent::LiveUpdate { readings: applied });
                Effects::default()
            }
            Command::Inspect(inspect) => {
                inspect(&self.state);
                Effects::default()
            }
        }
    }

    fn finish_fetch(&mut self, request: FetchRequest, result: Result<AggregatedSeries>) {
        let device_id = request.key.device_id.clone();
        let property_id = request.key.property_id.clone();
        let span = request.span;

        match self.state.on_fetch_finished(request, result) {
            Ok(CompletionOutcome::Stored) => self.publish(DashboardEvent::QueryCompleted {
                device_id,
                property_id,
                span,
            }),
            Ok(CompletionOutcome::StaleDiscarded) => {}
            Err(error) => {
                let reason = match error {
                    DashboardError::Fetch { reason, .. } => reason,
                    other => other.to_string(),
                };
                self.publish(DashboardEvent::QueryFailed {
                    device_id,
                    property_id,
                    reason,
                })
            }
        }
    }

    fn execute(&mut self, effects: Effects) {
        if let Some(window) = effects.applied_window {
            self.publish(DashboardEvent::WindowChanged { window });
        }
        for request in effects.fetches {
            self.spawn_fetch(request);
        }
        if let Some(delay) = effects.retry_after {
            self.arm_retry(delay);
        }
    }

    fn spawn_fetch(&self, request: FetchRequest) {
        let repo = self.repository.clone();
        let commands = self.commands.clone();

        tokio::spawn(async move {
            let result = repo
                .fetch_aggregated_series(
                    &request.key.device_id,
                    &request.key.property_id,
                    &request.span,
                )
                .await
                .map_err(|e| DashboardError::Fetch {
                    device_id: request.key.device_id.clone(),
                    property_id: request.key.property_id.clone(),
                    reason: format!("{:#}", e),
                });

            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::FetchFinished { request, result }).await;
            }
        });
    }

    fn arm_retry(&mut self, delay: Duration) {
        if self.retry_armed {
            return;
        }
        self.retry_armed = true;

        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::RetryPendingWindow).await;
            }
        });
    }

    fn publish(&self, event: DashboardEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl DashboardHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.events.subscribe()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DashboardError::ServiceStopped)
    }

    /// Run `f` against the state inside the service task.
    pub async fn read<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&DashboardState) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Inspect(Box::new(move |state| {
            let _ = tx.send(f(state));
        })))
        .await?;
        rx.await.map_err(|_| DashboardError::ServiceStopped)
    }

    /// Slider/date-picker change; rejects windows whose end is not after start.
    pub async fn submit_time_window_change(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        current: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SubmitWindow {
            start,
            end,
            current,
            reply,
        })
        .await?;
        rx.await.map_err(|_| DashboardError::ServiceStopped)?
    }

    pub async fn set_current_time(&self, t: DateTime<Utc>) -> Result<()> {
        self.send(Command::SetCurrentTime(t)).await
    }

    pub async fn set_resolution(&self, resolution: Resolution) -> Result<()> {
        self.send(Command::SetResolution(resolution)).await
    }

    pub async fn set_interest_selection(&self, target: Option<SelectionTarget>) -> Result<()> {
        self.send(Command::SetSelection(target)).await
    }

    pub async fn clear_hover(&self) -> Result<()> {
        self.send(Command::ClearHover).await
    }

    pub async fn apply_live_readings(&self, readings: Vec<LiveReading>) -> Result<()> {
        self.send(Command::ApplyLive(readings)).await
    }

    pub async fn time_window(&self) -> Result<TimeWindow> {
        self.read(|state| state.window()).await
    }

    pub async fn get_sensor_value(&self, device_id: &str, property_id: &str) -> Result<f64> {
        let (device_id, property_id) = (device_id.to_string(), property_id.to_string());
        self.read(move |state| state.sensor_value(&device_id, &property_id))
            .await
    }

    pub async fn get_chart_data(&self, device_id: &str) -> Result<BTreeMap<String, ChartSeries>> {
        let device_id = device_id.to_string();
        self.read(move |state| state.chart_data(&device_id)).await
    }

    pub async fn device_readings(&self, device_id: &str) -> Result<BTreeMap<String, String>> {
        let device_id = device_id.to_string();
        self.read(move |state| state.device_readings(&device_id)).await
    }

    /// Latest live reading for one property, if any arrived.
    pub async fn live_value(&self, device_id: &str, property_id: &str) -> Result<Option<LiveReading>> {
        let (device_id, property_id) = (device_id.to_string(), property_id.to_string());
        self.read(move |state| state.current_property_value(&device_id, &property_id).cloned())
            .await
    }

    pub async fn properties(&self) -> Result<Vec<DeviceProperty>> {
        self.read(|state| state.catalog().properties().cloned().collect())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::clock::TokioClock;
    use crate::application::rate_limiter::RateLimiter;
    use crate::domain::device::{DeviceCatalog, DeviceGroup, DeviceProperty, DeviceRef, DeviceTree};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Series whose values encode the window start, answered after `latency`.
    struct MockRepository {
        latency: Duration,
        failing: HashSet<String>,
        calls: Mutex<Vec<(String, WindowSpan)>>,
    }

    impl MockRepository {
        fn new(latency: Duration) -> Self {
            Self {
                latency,
                failing: HashSet::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, WindowSpan)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TelemetryRepository for MockRepository {
        async fn load_catalog(&self) -> anyhow::Result<DeviceCatalog> {
            Ok(catalog())
        }

        async fn fetch_aggregated_series(
            &self,
            device_id: &str,
            _property_id: &str,
            span: &WindowSpan,
        ) -> anyhow::Result<AggregatedSeries> {
            self.calls
                .lock()
                .unwrap()
                .push((device_id.to_string(), *span));
            tokio::time::sleep(self.latency).await;
            if self.failing.contains(device_id) {
                anyhow::bail!("device {} is offline", device_id);
            }
            let start = span.start.timestamp();
            Ok(AggregatedSeries::new(
                vec![start, start + 3600],
                vec![start as f64, 40.0],
            )?)
        }
    }

    fn catalog() -> DeviceCatalog {
        let device = |id: &str| DeviceRef {
            id: id.to_string(),
            name: id.to_string(),
            property_ids: vec!["temp".to_string()],
        };
        DeviceCatalog::new(
            DeviceTree::new(vec![DeviceGroup {
                id: "floor-1".to_string(),
                name: String::new(),
                groups: vec![],
                devices: vec![device("A"), device("B")],
            }]),
            vec![DeviceProperty::new("temp", "celsius", 0.0, 40.0)],
        )
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn start(repository: Arc<MockRepository>) -> DashboardHandle {
        let window = TimeWindow::create(day(1), day(2), Resolution::OneHour, day(1)).unwrap();
        let limiter = RateLimiter::with_defaults(Arc::new(TokioClock));
        DashboardService::spawn(DashboardState::new(catalog(), window, limiter), repository)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_window_fetches_whole_model() {
        let repository = Arc::new(MockRepository::new(Duration::from_millis(20)));
        let handle = start(repository.clone());
        settle().await;

        assert_eq!(repository.calls().len(), 2);
        let charts = handle.get_chart_data("A").await.unwrap();
        assert_eq!(charts["temp"].points.len(), 2);
        assert_eq!(handle.get_sensor_value("A", "temp").await.unwrap(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_applies_first_and_last_window() {
        let repository = Arc::new(MockRepository::new(Duration::from_millis(1)));
        let handle = start(repository.clone());
        let mut events = handle.subscribe();

        for d in 2..12 {
            handle
                .submit_time_window_change(day(d), day(d + 1), None)
                .await
                .unwrap();
        }
        settle().await;

        let mut applied = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let DashboardEvent::WindowChanged { window } = event {
                applied.push(window.start());
            }
        }
        assert_eq!(applied, vec![day(2), day(11)]);
        assert_eq!(handle.time_window().await.unwrap().start(), day(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_results_are_not_cached() {
        let repository = Arc::new(MockRepository::new(Duration::from_millis(200)));
        let handle = start(repository.clone());

        // Initial fetches for day 1 are still in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle
            .submit_time_window_change(day(5), day(6), None)
            .await
            .unwrap();
        settle().await;

        let spans: Vec<WindowSpan> = repository.calls().into_iter().map(|(_, s)| s).collect();
        assert_eq!(spans.len(), 4);

        let charts = handle.get_chart_data("A").await.unwrap();
        let first = charts["temp"].points[0];
        assert_eq!(first.value, day(5).timestamp() as f64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_reports_and_retries_on_next_reconcile() {
        let mut repository = MockRepository::new(Duration::from_millis(5));
        repository.failing.insert("B".to_string());
        let repository = Arc::new(repository);
        let handle = start(repository.clone());
        let mut events = handle.subscribe();
        settle().await;

        assert_eq!(handle.get_sensor_value("B", "temp").await.unwrap(), 0.0);
        let mut failures = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let DashboardEvent::QueryFailed {
                device_id,
                property_id,
                reason,
            } = event
            {
                failures.push((device_id, property_id, reason));
            }
        }
        assert_eq!(
            failures,
            vec![(
                "B".to_string(),
                "temp".to_string(),
                "device B is offline".to_string()
            )]
        );

        handle
            .set_interest_selection(Some(SelectionTarget::Group("floor-1".to_string())))
            .await
            .unwrap();
        settle().await;

        let b_calls = repository
            .calls()
            .into_iter()
            .filter(|(device, _)| device == "B")
            .count();
        assert_eq!(b_calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_range_is_returned_to_caller() {
        let repository = Arc::new(MockRepository::new(Duration::from_millis(1)));
        let handle = start(repository);

        let err = handle
            .submit_time_window_change(day(3), day(3), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::InvalidRange { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_hover_keeps_selected_group() {
        let repository = Arc::new(MockRepository::new(Duration::from_millis(1)));
        let handle = start(repository);
        handle
            .set_interest_selection(Some(SelectionTarget::Group("floor-1".to_string())))
            .await
            .unwrap();
        handle
            .set_interest_selection(Some(SelectionTarget::Device("A".to_string())))
            .await
            .unwrap();

        handle.clear_hover().await.unwrap();
        let selection = handle.read(|state| state.selection().clone()).await.unwrap();
        assert_eq!(selection.group.as_deref(), Some("floor-1"));
        assert_eq!(selection.hovered_device, None);
    }
}
