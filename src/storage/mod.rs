//! Exchange history, body persistence and retention

mod body_store;
mod har;
mod log_store;
mod retention;

pub use body_store::{BodyStore, BodyStoreError, DEFAULT_TRANSCRIPT_MAX_BYTES};
pub use har::{exchanges_to_har, export_har_to_path, LoadedExchange};
pub use log_store::{LogEvent, LogSnapshot, LogStore, DEFAULT_MAX_ENTRIES};
pub use retention::{RetentionSweeper, SweepReport, DEFAULT_RETENTION_DAYS};
