// Application layer - Dashboard state machine and the ports it drives
pub mod chart_builder;
pub mod clock;
pub mod dashboard_service;
pub mod dashboard_state;
pub mod query_coordinator;
pub mod rate_limiter;
pub mod series_cache;
pub mod telemetry_repository;
pub mod value_resolver;
