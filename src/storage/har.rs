use anyhow::{anyhow, Context};
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::models::{header_value, ExchangeRecord, ExchangeState};

const HAR_VERSION: &str = "1.2";
const CREATOR_NAME: &str = "netlog";
const CREATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A record paired with whatever bodies could still be loaded
pub struct LoadedExchange<'a> {
    pub record: &'a ExchangeRecord,
    pub request_body: Option<Bytes>,
    pub response_body: Option<Bytes>,
}

#[derive(Serialize)]
struct HarLog<'a> {
    log: HarLogInner<'a>,
}

#[derive(Serialize)]
struct HarLogInner<'a> {
    version: &'static str,
    creator: HarCreator<'a>,
    entries: Vec<HarEntry>,
}

#[derive(Serialize)]
struct HarCreator<'a> {
    name: &'a str,
    version: &'a str,
}

#[derive(Serialize)]
struct HarEntry {
    #[serde(rename = "startedDateTime")]
    started_datetime: String,
    time: i64,
    request: HarRequest,
    response: HarResponse,
    cache: HashMap<String, Value>,
    timings: HarTimings,
}

#[derive(Serialize)]
struct HarRequest {
    method: String,
    url: String,
    #[serde(rename = "httpVersion")]
    http_version: String,
    headers: Vec<HarHeader>,
    #[serde(rename = "queryString")]
    query_string: Vec<HarHeader>,
    cookies: Vec<Value>,
    #[serde(rename = "headersSize")]
    headers_size: i64,
    #[serde(rename = "bodySize")]
    body_size: i64,
    #[serde(skip_serializing_if = "Option::is_none", rename = "postData")]
    post_data: Option<HarPostData>,
}

#[derive(Serialize)]
struct HarResponse {
    status: i64,
    #[serde(rename = "statusText")]
    status_text: String,
    #[serde(rename = "httpVersion")]
    http_version: String,
    headers: Vec<HarHeader>,
    cookies: Vec<Value>,
    content: HarContent,
    #[serde(rename = "redirectURL")]
    redirect_url: String,
    #[serde(rename = "headersSize")]
    headers_size: i64,
    #[serde(rename = "bodySize")]
    body_size: i64,
}

#[derive(Serialize)]
struct HarHeader {
    name: String,
    value: String,
}

#[derive(Serialize)]
struct HarPostData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding: Option<&'static str>,
}

#[derive(Serialize)]
struct HarContent {
    size: i64,
    #[serde(rename = "mimeType")]
    mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding: Option<&'static str>,
}

#[derive(Serialize)]
struct HarTimings {
    send: i64,
    wait: i64,
    receive: i64,
}

pub fn exchanges_to_har(exchanges: &[LoadedExchange<'_>]) -> anyhow::Result<Value> {
    let entries = exchanges.iter().map(HarEntry::from).collect();
    serde_json::to_value(HarLog {
        log: HarLogInner {
            version: HAR_VERSION,
            creator: HarCreator {
                name: CREATOR_NAME,
                version: CREATOR_VERSION,
            },
            entries,
        },
    })
    .context("serializing HAR log")
}

impl HarEntry {
    fn from(exchange: &LoadedExchange<'_>) -> Self {
        let record = exchange.record;
        let time = record.duration_ms().unwrap_or(0);
        Self {
            started_datetime: record.request_date.to_rfc3339(),
            time,
            request: HarRequest::from(exchange),
            response: HarResponse::from(exchange),
            cache: HashMap::new(),
            timings: HarTimings {
                send: 0,
                wait: time,
                receive: 0,
            },
        }
    }
}

impl HarRequest {
    fn from(exchange: &LoadedExchange<'_>) -> Self {
        let record = exchange.record;
        let mime_type = header_value(&record.request_headers, "content-type");
        let (body_size, post_data) = match &exchange.request_body {
            Some(bytes) => {
                let (text, encoding) = encode_text(bytes);
                (
                    bytes.len() as i64,
                    Some(HarPostData {
                        mime_type: mime_type.unwrap_or("application/octet-stream").to_string(),
                        text,
                        encoding,
                    }),
                )
            }
            None => (0, None),
        };
        Self {
            method: record.request_method.to_string(),
            url: record.request_url.clone(),
            http_version: "HTTP/1.1".to_string(),
            headers: har_headers(&record.request_headers),
            query_string: query_pairs(&record.request_url),
            cookies: Vec::new(),
            headers_size: -1,
            body_size,
            post_data,
        }
    }
}

impl HarResponse {
    fn from(exchange: &LoadedExchange<'_>) -> Self {
        let record = exchange.record;
        let mime_type = header_value(&record.response_headers, "content-type")
            .unwrap_or("application/octet-stream")
            .to_string();
        let (text, encoding) = match &exchange.response_body {
            Some(bytes) => {
                let (text, encoding) = encode_text(bytes);
                (Some(text), encoding)
            }
            None => (None, None),
        };
        let size = record
            .response_body
            .as_ref()
            .map(|handle| handle.size as i64)
            .unwrap_or(0);
        let status_text = match &record.state {
            ExchangeState::Failed { reason } => reason.clone(),
            ExchangeState::Abandoned => "abandoned".to_string(),
            _ => String::new(),
        };
        Self {
            status: record.response_status_code.map(i64::from).unwrap_or(0),
            status_text,
            http_version: "HTTP/1.1".to_string(),
            headers: har_headers(&record.response_headers),
            cookies: Vec::new(),
            content: HarContent {
                size,
                mime_type,
                text,
                encoding,
            },
            redirect_url: header_value(&record.response_headers, "location")
                .unwrap_or_default()
                .to_string(),
            headers_size: -1,
            body_size: size,
        }
    }
}

fn har_headers(headers: &BTreeMap<String, String>) -> Vec<HarHeader> {
    headers
        .iter()
        .map(|(name, value)| HarHeader {
            name: name.clone(),
            value: value.clone(),
        })
        .collect()
}

fn encode_text(bytes: &Bytes) -> (String, Option<&'static str>) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), None),
        Err(_) => (general_purpose::STANDARD.encode(bytes), Some("base64")),
    }
}

fn query_pairs(url: &str) -> Vec<HarHeader> {
    let Some((_, query)) = url.split_once('?') else {
        return Vec::new();
    };
    let query = query.split('#').next().unwrap_or_default();
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            HarHeader {
                name: name.to_string(),
                value: value.to_string(),
            }
        })
        .collect()
}

pub async fn export_har_to_path(
    exchanges: &[LoadedExchange<'_>],
    output_path: impl AsRef<Path>,
) -> anyhow::Result<usize> {
    if exchanges.is_empty() {
        return Err(anyhow!("No exchanges to export"));
    }
    let value = exchanges_to_har(exchanges)?;
    let json = serde_json::to_string_pretty(&value)?;
    tokio::fs::write(output_path, json)
        .await
        .context("writing HAR file")?;
    Ok(exchanges.len())
}
