//! Views handed to the presentation layer

use serde::{Deserialize, Serialize};

use super::exchange::{ContentTypeClass, ExchangeRecord, ExchangeState, HttpMethod};

/// List-row colour for an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusColor {
    /// Still waiting
    Gray,
    /// 1xx / 2xx
    Green,
    /// 3xx
    Blue,
    /// 4xx or abandoned
    Orange,
    /// 5xx or failed
    Red,
}

impl StatusColor {
    pub fn for_record(record: &ExchangeRecord) -> Self {
        match (&record.state, record.response_status_code) {
            (ExchangeState::Pending, _) => StatusColor::Gray,
            (ExchangeState::Failed { .. }, _) => StatusColor::Red,
            (ExchangeState::Abandoned, _) => StatusColor::Orange,
            (ExchangeState::Completed, Some(code)) if code < 300 => StatusColor::Green,
            (ExchangeState::Completed, Some(code)) if code < 400 => StatusColor::Blue,
            (ExchangeState::Completed, Some(code)) if code < 500 => StatusColor::Orange,
            (ExchangeState::Completed, _) => StatusColor::Red,
        }
    }
}

/// One row of the history list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeSummary {
    pub id: String,
    pub method: HttpMethod,
    pub url: String,
    pub status_code: Option<u16>,
    pub color: StatusColor,
    /// e.g. "12s ago"
    pub relative_time: String,
}

/// A lazily loaded body as the detail screen sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyView {
    /// No body was captured
    Empty,
    Loaded {
        bytes: Vec<u8>,
        /// Display text: pretty JSON, raw UTF-8, or a byte count
        display: String,
    },
    /// The file was swept or wiped
    NotFound,
    /// The body could not be written or read back
    Unreadable { reason: String },
}

impl BodyView {
    pub fn display_text(&self) -> String {
        match self {
            BodyView::Empty => String::new(),
            BodyView::Loaded { display, .. } => display.clone(),
            BodyView::NotFound => "body no longer available".to_string(),
            BodyView::Unreadable { .. } => "unable to read value".to_string(),
        }
    }
}

/// Full record with bodies resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeDetail {
    pub record: ExchangeRecord,
    pub content_type_class: ContentTypeClass,
    pub request_body: BodyView,
    pub response_body: BodyView,
}
