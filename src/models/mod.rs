//! Data models for the network logger
//!
//! These models are shared between the capture path and the presentation layer.

pub mod body;
pub mod exchange;
pub mod summary;

pub use body::*;
pub use exchange::*;
pub use summary::*;
