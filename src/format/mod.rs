//! Text rendering for captured exchanges
//!
//! Pure functions only; nothing here touches the store or the disk.

use crate::models::{ContentTypeClass, ExchangeRecord, ExchangeState};
use chrono::{DateTime, Utc};

/// Reformat a JSON body. Any other class, or JSON that fails to parse, yields `None`.
pub fn pretty_print(bytes: &[u8], class: ContentTypeClass) -> Option<String> {
    if class != ContentTypeClass::Json {
        return None;
    }
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    serde_json::to_string_pretty(&value).ok()
}

/// Best available text for a body: pretty JSON, raw UTF-8, or its size.
pub fn display_body(bytes: &[u8], class: ContentTypeClass) -> String {
    if let Some(pretty) = pretty_print(bytes, class) {
        return pretty;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) if class != ContentTypeClass::Image => text.to_string(),
        _ => format!("<{}>", size_str(bytes.len() as u64)),
    }
}

/// Equivalent `curl` invocation for a record.
/// Headers come out in the record's key order, so the output is deterministic.
pub fn curl_command(record: &ExchangeRecord, body: Option<&[u8]>) -> String {
    let mut parts = vec![format!(
        "curl -X {} {}",
        record.request_method,
        shell_quote(&record.request_url)
    )];
    for (name, value) in &record.request_headers {
        parts.push(format!("-H {}", shell_quote(&format!("{}: {}", name, value))));
    }
    match body {
        Some(bytes) if !bytes.is_empty() => match std::str::from_utf8(bytes) {
            Ok(text) => parts.push(format!("--data-raw {}", shell_quote(text))),
            Err(_) => parts.push(format!("# binary body omitted ({} bytes)", bytes.len())),
        },
        _ => {}
    }
    parts.join(" \\\n  ")
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Human-friendly age, e.g. "just now", "42s ago", "3h ago".
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = now.signed_duration_since(then).num_seconds();
    match secs {
        s if s < 5 => "just now".to_string(),
        s if s < 60 => format!("{}s ago", s),
        s if s < 3600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3600),
        s => format!("{}d ago", s / 86_400),
    }
}

pub fn duration_str(record: &ExchangeRecord) -> String {
    match record.duration_ms() {
        Some(ms) if ms < 1000 => format!("{}ms", ms),
        Some(ms) => format!("{:.1}s", ms as f64 / 1000.0),
        None => "-".to_string(),
    }
}

pub fn size_str(size: u64) -> String {
    if size < 1024 {
        format!("{}B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1}KB", size as f64 / 1024.0)
    } else {
        format!("{:.1}MB", size as f64 / (1024.0 * 1024.0))
    }
}

/// One transcript line for a finalized record
pub fn transcript_line(record: &ExchangeRecord) -> String {
    let outcome = match (&record.state, record.response_status_code) {
        (ExchangeState::Completed, Some(code)) => code.to_string(),
        (ExchangeState::Failed { reason }, _) => format!("FAILED ({})", reason),
        (ExchangeState::Abandoned, _) => "ABANDONED".to_string(),
        _ => "PENDING".to_string(),
    };
    let size = record
        .response_body
        .as_ref()
        .map(|handle| size_str(handle.size))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{} {} {} -> {} {} {} [{}]",
        record.request_date.to_rfc3339(),
        record.request_method,
        record.request_url,
        outcome,
        duration_str(record),
        size,
        record.id
    )
}
