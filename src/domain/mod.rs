// Domain layer - Pure values shared by every other layer
pub mod device;
pub mod error;
pub mod telemetry;
pub mod time_window;
