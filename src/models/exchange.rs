//! Exchange model
//!
//! Represents a single HTTP request/response pair observed by a recording session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::body::BodyHandle;

/// HTTP methods
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Connect,
    Trace,
    /// Extension methods such as WebDAV's PROPFIND, kept verbatim
    Other(String),
}

impl HttpMethod {
    /// Standard methods match case-insensitively; anything else is kept as given.
    pub fn from_name(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "PATCH" => HttpMethod::Patch,
            "DELETE" => HttpMethod::Delete,
            "HEAD" => HttpMethod::Head,
            "OPTIONS" => HttpMethod::Options,
            "CONNECT" => HttpMethod::Connect,
            "TRACE" => HttpMethod::Trace,
            _ => HttpMethod::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Other(name) => name,
        }
    }
}

impl From<&http::Method> for HttpMethod {
    fn from(method: &http::Method) -> Self {
        HttpMethod::from_name(method.as_str())
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache behaviour requested for an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CachePolicy {
    #[default]
    UseProtocolDefault,
    ReloadIgnoringCache,
    ReturnCacheElseLoad,
    ReturnCacheDontLoad,
}

/// Per-request options carried as an `http::Request` extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub cache_policy: CachePolicy,
}

/// Lifecycle state of an exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeState {
    /// Request sent, no terminal outcome yet
    Pending,
    /// A response arrived
    Completed,
    /// Network error or cancellation
    Failed { reason: String },
    /// No terminal outcome within the abandon horizon
    Abandoned,
}

impl ExchangeState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExchangeState::Pending)
    }
}

/// Coarse payload classification derived from Content-Type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentTypeClass {
    Json,
    Xml,
    Html,
    Image,
    Other,
}

impl ContentTypeClass {
    pub fn from_content_type(value: &str) -> Self {
        let mime = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if mime.starts_with("image/") {
            ContentTypeClass::Image
        } else if mime.ends_with("json") {
            ContentTypeClass::Json
        } else if mime.contains("html") {
            ContentTypeClass::Html
        } else if mime.ends_with("xml") {
            ContentTypeClass::Xml
        } else {
            ContentTypeClass::Other
        }
    }
}

/// Represents a single observed request/response exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRecord {
    /// Unique identifier for this exchange
    pub id: String,

    // Request data
    pub request_url: String,
    pub request_method: HttpMethod,
    pub request_headers: BTreeMap<String, String>,
    pub request_body: Option<BodyHandle>,
    pub request_date: DateTime<Utc>,
    pub request_timeout: Option<Duration>,
    pub request_cache_policy: CachePolicy,

    // Response data
    pub response_status_code: Option<u16>,
    pub response_headers: BTreeMap<String, String>,
    pub response_body: Option<BodyHandle>,
    pub response_date: Option<DateTime<Utc>>,

    pub state: ExchangeState,
}

impl ExchangeRecord {
    /// Create a pending record for an outgoing request
    pub fn new(
        method: HttpMethod,
        url: &str,
        headers: BTreeMap<String, String>,
        options: RequestOptions,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request_url: url.to_string(),
            request_method: method,
            request_headers: headers,
            request_body: None,
            request_date: Utc::now(),
            request_timeout: options.timeout,
            request_cache_policy: options.cache_policy,
            response_status_code: None,
            response_headers: BTreeMap::new(),
            response_body: None,
            response_date: None,
            state: ExchangeState::Pending,
        }
    }

    /// Time between request and terminal outcome
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.response_date.map(|end| end - self.request_date)
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.duration().map(|d| d.num_milliseconds())
    }

    pub fn content_type_class(&self) -> ContentTypeClass {
        header_value(&self.response_headers, "content-type")
            .or_else(|| header_value(&self.request_headers, "content-type"))
            .map(ContentTypeClass::from_content_type)
            .unwrap_or(ContentTypeClass::Other)
    }

    pub fn host(&self) -> &str {
        let without_scheme = self
            .request_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.request_url);
        without_scheme
            .split(['/', '?', '#'])
            .next()
            .unwrap_or(without_scheme)
    }

    pub fn is_pending(&self) -> bool {
        self.state == ExchangeState::Pending
    }
}

/// Case-insensitive header lookup
pub fn header_value<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Collapse an `http::HeaderMap` into an ordered map with unique keys.
/// Repeated headers are joined with ", "; non-UTF-8 values are decoded lossily.
pub fn headers_to_map(headers: &http::HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    out
}
