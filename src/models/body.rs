//! Persisted payload handles and the artifact naming convention.
//!
//! Every file the logger writes is named `logger_<kind>_<timestamp>_<token>`.
//! Retention only ever deletes names that parse with [`is_log_artifact`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const REQUEST_BODY_PREFIX: &str = "logger_request_body_";
const RESPONSE_BODY_PREFIX: &str = "logger_response_body_";
const TRANSCRIPT_PREFIX: &str = "logger_transcript_";

/// Which side of the exchange a body belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyRole {
    Request,
    Response,
}

impl BodyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyRole::Request => "request",
            BodyRole::Response => "response",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            BodyRole::Request => REQUEST_BODY_PREFIX,
            BodyRole::Response => RESPONSE_BODY_PREFIX,
        }
    }
}

/// Opaque reference to a persisted payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyHandle {
    pub file_name: String,
    pub directory: PathBuf,
    /// Byte size at save time
    pub size: u64,
}

impl BodyHandle {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    pub fn role(&self) -> Option<BodyRole> {
        if self.file_name.starts_with(REQUEST_BODY_PREFIX) {
            Some(BodyRole::Request)
        } else if self.file_name.starts_with(RESPONSE_BODY_PREFIX) {
            Some(BodyRole::Response)
        } else {
            None
        }
    }
}

/// Fresh, unique body file name for `role`.
pub fn body_file_name(role: BodyRole) -> String {
    format!(
        "{}{}_{}",
        role.prefix(),
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Fresh, unique transcript file name.
pub fn transcript_file_name() -> String {
    format!(
        "{}{}_{}",
        TRANSCRIPT_PREFIX,
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    )
}

/// True when `name` follows the logger naming convention:
/// a known prefix followed by `<timestamp>_<token>`, both non-empty and alphanumeric.
pub fn is_log_artifact(name: &str) -> bool {
    let rest = [REQUEST_BODY_PREFIX, RESPONSE_BODY_PREFIX, TRANSCRIPT_PREFIX]
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix));
    let Some(rest) = rest else {
        return false;
    };
    match rest.split_once('_') {
        Some((timestamp, token)) => is_segment(timestamp) && is_segment(token),
        None => false,
    }
}

fn is_segment(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

pub fn is_log_artifact_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(is_log_artifact)
        .unwrap_or(false)
}
