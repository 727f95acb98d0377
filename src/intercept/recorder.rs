//! Builds exchange records from observed traffic

use super::transport::TransportError;
use crate::format;
use crate::models::{
    headers_to_map, BodyRole, ExchangeRecord, ExchangeState, HttpMethod, RequestOptions,
};
use crate::storage::{BodyStore, LogStore};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Completion token returned by [`ExchangeRecorder::on_request_start`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHandle {
    id: String,
}

impl RecordHandle {
    pub fn id(&self) -> &str {
        &self.id
    }
}

pub struct ExchangeRecorder {
    store: Arc<LogStore>,
    bodies: Arc<BodyStore>,
    abandon_after: Duration,
}

impl ExchangeRecorder {
    pub fn new(store: Arc<LogStore>, bodies: Arc<BodyStore>, abandon_after: Duration) -> Self {
        Self {
            store,
            bodies,
            abandon_after,
        }
    }

    pub fn store(&self) -> &Arc<LogStore> {
        &self.store
    }

    /// Record a new outgoing request and append it to the log.
    pub fn on_request_start(&self, request: &http::Request<Bytes>) -> RecordHandle {
        let options = request
            .extensions()
            .get::<RequestOptions>()
            .copied()
            .unwrap_or_default();
        let mut record = ExchangeRecord::new(
            HttpMethod::from(request.method()),
            &request.uri().to_string(),
            headers_to_map(request.headers()),
            options,
        );
        if !request.body().is_empty() {
            let handle = self.bodies.save(BodyRole::Request, request.body().clone());
            record.request_body = Some(handle);
        }

        tracing::debug!(
            "Capturing {} {} as {}",
            record.request_method,
            record.request_url,
            record.id
        );
        let handle = RecordHandle {
            id: record.id.clone(),
        };
        for evicted in self.store.append(record) {
            for body in [&evicted.request_body, &evicted.response_body].into_iter().flatten() {
                self.bodies.forget(body);
            }
        }
        handle
    }

    /// Finalize the record behind `handle`. Only the first call has any effect.
    pub fn on_response_complete(
        &self,
        handle: &RecordHandle,
        outcome: Result<&http::Response<Bytes>, &TransportError>,
    ) {
        match self.store.get(&handle.id) {
            Some(record) if record.is_pending() => {}
            Some(_) => {
                tracing::debug!("Ignoring repeated completion for {}", handle.id);
                return;
            }
            None => {
                tracing::debug!("Completion for evicted exchange {}", handle.id);
                return;
            }
        }

        let response_body = match outcome {
            Ok(response) if !response.body().is_empty() => {
                Some(self.bodies.save(BodyRole::Response, response.body().clone()))
            }
            _ => None,
        };

        let now = Utc::now();
        let updated = self.store.update_if_pending(&handle.id, move |record| {
            record.response_date = Some(now.max(record.request_date));
            match outcome {
                Ok(response) => {
                    record.response_status_code = Some(response.status().as_u16());
                    record.response_headers = headers_to_map(response.headers());
                    record.response_body = response_body;
                    record.state = ExchangeState::Completed;
                }
                Err(err) => {
                    record.state = ExchangeState::Failed {
                        reason: err.to_string(),
                    };
                }
            }
        });

        match updated {
            Some(record) => self.bodies.append_transcript(format::transcript_line(&record)),
            None => tracing::debug!("Exchange {} finalized concurrently", handle.id),
        }
    }

    /// Move pending records past their horizon to `Abandoned`.
    pub fn abandon_stale(&self) -> usize {
        let abandoned = self.store.abandon_stale(Utc::now(), self.abandon_after);
        for record in &abandoned {
            tracing::debug!("Exchange {} abandoned without a response", record.id);
            self.bodies.append_transcript(format::transcript_line(record));
        }
        abandoned.len()
    }
}
