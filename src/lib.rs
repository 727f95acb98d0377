//! # Network Logger Core
//!
//! In-app capture of outgoing HTTP traffic for debugging builds.
//!
//! ## Features
//!
//! - Transparent capture on every session construction entry point
//! - Bounded in-memory history with live change events
//! - Bodies persisted to a private directory and loaded lazily
//! - Age-based retention of on-disk artifacts
//! - Export to cURL and HAR
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Host app sessions                       │
//! ├─────────────────────────────────────────────────────────┤
//! │   SessionConstructor ── hook ──> RecordingTransport     │
//! ├─────────────────────────────────────────────────────────┤
//! │                 Network Logger Core (Rust)              │
//! │  ┌──────────┐  ┌──────────┐  ┌───────────┐  ┌────────┐  │
//! │  │ Recorder │──│ LogStore │──│ BodyStore │──│ Sweeper│  │
//! │  └──────────┘  └──────────┘  └───────────┘  └────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod format;
pub mod intercept;
pub mod models;
pub mod storage;

pub use api::{init_logging, LoggerConfig, MaintenanceHandle, NetworkLogger};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
