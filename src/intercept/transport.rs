//! Transport seam
//!
//! Sessions send requests through a [`Transport`]. Capture works by decorating the
//! host's real transport with [`RecordingTransport`], which observes each exchange
//! and hands the inner result back untouched.

use super::recorder::{ExchangeRecorder, RecordHandle};
use crate::models::RequestOptions;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;

pub type TransportResult = Result<http::Response<Bytes>, TransportError>;
pub type TransportFuture<'a> = BoxFuture<'a, TransportResult>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

pub trait Transport: Send + Sync {
    fn send(&self, request: http::Request<Bytes>) -> TransportFuture<'_>;
}

/// Base transport backed by `reqwest`
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: http::Request<Bytes>) -> TransportFuture<'_> {
        Box::pin(async move {
            let options = request
                .extensions()
                .get::<RequestOptions>()
                .copied()
                .unwrap_or_default();
            let (parts, body) = request.into_parts();
            let mut builder = self
                .client
                .request(parts.method, parts.uri.to_string())
                .headers(parts.headers)
                .body(body);
            if let Some(timeout) = options.timeout {
                builder = builder.timeout(timeout);
            }

            let upstream = builder.send().await?;
            let status = upstream.status();
            let version = upstream.version();
            let headers = upstream.headers().clone();
            let body = upstream.bytes().await?;

            let mut response = http::Response::new(body);
            *response.status_mut() = status;
            *response.version_mut() = version;
            *response.headers_mut() = headers;
            Ok::<_, TransportError>(response)
        })
    }
}

/// Decorator that records every exchange passing through `inner`
pub struct RecordingTransport {
    inner: Arc<dyn Transport>,
    recorder: Arc<ExchangeRecorder>,
}

impl RecordingTransport {
    pub fn new(inner: Arc<dyn Transport>, recorder: Arc<ExchangeRecorder>) -> Self {
        Self { inner, recorder }
    }
}

impl Transport for RecordingTransport {
    fn send(&self, request: http::Request<Bytes>) -> TransportFuture<'_> {
        let in_flight = InFlight {
            handle: Some(self.recorder.on_request_start(&request)),
            recorder: Arc::clone(&self.recorder),
        };
        let response = self.inner.send(request);
        Box::pin(async move {
            let result = response.await;
            in_flight.finish(result.as_ref());
            result
        })
    }
}

/// Finalizes the record exactly once, as cancelled if the future is dropped early.
struct InFlight {
    recorder: Arc<ExchangeRecorder>,
    handle: Option<RecordHandle>,
}

impl InFlight {
    fn finish(mut self, outcome: Result<&http::Response<Bytes>, &TransportError>) {
        if let Some(handle) = self.handle.take() {
            self.recorder.on_response_complete(&handle, outcome);
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.recorder
                .on_response_complete(&handle, Err(&TransportError::Cancelled));
        }
    }
}
