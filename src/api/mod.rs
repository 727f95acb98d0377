//! Network logger API
//!
//! The service object hosts construct at startup, plus its configuration.

mod config;
mod logger_api;

pub use config::LoggerConfig;
pub use logger_api::{init_logging, MaintenanceHandle, NetworkLogger};
