// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod event_stream;
pub mod http_response;
pub mod influx_repository;
pub mod live_feed;
pub mod synthetic_repository;
