//! On-disk payload storage
//!
//! Bodies are queued to a single background writer so the capture path never
//! waits on disk. Until a queued write lands, `load` serves the bytes from memory.

use crate::models::{body_file_name, transcript_file_name, BodyHandle, BodyRole};
use anyhow::Context;
use bytes::Bytes;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

pub const DEFAULT_TRANSCRIPT_MAX_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum BodyStoreError {
    #[error("body {file_name} was never written: {reason}")]
    WriteFailed { file_name: String, reason: String },
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

enum WriteJob {
    Body { file_name: String, bytes: Bytes },
    Transcript { line: String },
    Flush(oneshot::Sender<()>),
}

pub struct BodyStore {
    directory: PathBuf,
    jobs: mpsc::UnboundedSender<WriteJob>,
    pending: Arc<DashMap<String, Bytes>>,
    failed: Arc<DashMap<String, String>>,
}

impl BodyStore {
    /// Create the directory if needed and start the writer task.
    /// Must be called from within a tokio runtime.
    pub fn open(directory: impl Into<PathBuf>, transcript_max_bytes: u64) -> anyhow::Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("creating body directory {:?}", directory))?;
        let runtime = tokio::runtime::Handle::try_current()
            .context("body store must be opened inside a tokio runtime")?;

        let (jobs, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(DashMap::new());
        let failed = Arc::new(DashMap::new());
        let writer = BodyWriter {
            directory: directory.clone(),
            pending: Arc::clone(&pending),
            failed: Arc::clone(&failed),
            transcript: None,
            transcript_max_bytes: transcript_max_bytes.max(1),
        };
        runtime.spawn(writer.run(rx));

        Ok(Self {
            directory,
            jobs,
            pending,
            failed,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Queue `bytes` for writing and return its handle immediately.
    pub fn save(&self, role: BodyRole, bytes: Bytes) -> BodyHandle {
        let file_name = body_file_name(role);
        let size = bytes.len() as u64;
        self.pending.insert(file_name.clone(), bytes.clone());
        let job = WriteJob::Body {
            file_name: file_name.clone(),
            bytes,
        };
        if self.jobs.send(job).is_err() {
            tracing::warn!("Body writer stopped, {} will not be persisted", file_name);
            self.failed
                .insert(file_name.clone(), "writer stopped".to_string());
            self.pending.remove(&file_name);
        }
        BodyHandle {
            file_name,
            directory: self.directory.clone(),
            size,
        }
    }

    /// Read a body back. `Ok(None)` means the file is gone (swept or wiped).
    pub async fn load(&self, handle: &BodyHandle) -> Result<Option<Bytes>, BodyStoreError> {
        let queued = self
            .pending
            .get(&handle.file_name)
            .map(|entry| entry.value().clone());
        if let Some(bytes) = queued {
            return Ok(Some(bytes));
        }
        let failure = self
            .failed
            .get(&handle.file_name)
            .map(|entry| entry.value().clone());
        if let Some(reason) = failure {
            return Err(BodyStoreError::WriteFailed {
                file_name: handle.file_name.clone(),
                reason,
            });
        }

        let path = handle.path();
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(BodyStoreError::Read { path, source }),
        }
    }

    /// Drop any remembered write failure for `handle`. Called once nothing refers to it.
    pub fn forget(&self, handle: &BodyHandle) {
        self.failed.remove(&handle.file_name);
    }

    /// Drop every remembered write failure.
    pub fn forget_failures(&self) {
        self.failed.clear();
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// Append one line to the session transcript.
    pub fn append_transcript(&self, line: String) {
        let _ = self.jobs.send(WriteJob::Transcript { line });
    }

    /// Wait until every write queued so far has been attempted.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.jobs.send(WriteJob::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

struct TranscriptFile {
    file_name: String,
    file: tokio::fs::File,
    written: u64,
}

struct BodyWriter {
    directory: PathBuf,
    pending: Arc<DashMap<String, Bytes>>,
    failed: Arc<DashMap<String, String>>,
    transcript: Option<TranscriptFile>,
    transcript_max_bytes: u64,
}

impl BodyWriter {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<WriteJob>) {
        while let Some(job) = rx.recv().await {
            match job {
                WriteJob::Body { file_name, bytes } => {
                    let path = self.directory.join(&file_name);
                    if let Err(err) = tokio::fs::write(&path, &bytes).await {
                        tracing::error!("Failed to persist body {}: {}", file_name, err);
                        self.failed.insert(file_name.clone(), err.to_string());
                    }
                    self.pending.remove(&file_name);
                }
                WriteJob::Transcript { line } => {
                    if let Err(err) = self.append_transcript(&line).await {
                        tracing::warn!("Failed to append to transcript: {}", err);
                        self.transcript = None;
                    }
                }
                WriteJob::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        tracing::debug!("Body writer stopped");
    }

    async fn append_transcript(&mut self, line: &str) -> std::io::Result<()> {
        let needs_roll = match &self.transcript {
            None => true,
            Some(current) => {
                current.written >= self.transcript_max_bytes
                    || !tokio::fs::try_exists(self.directory.join(&current.file_name))
                        .await
                        .unwrap_or(false)
            }
        };
        if needs_roll {
            let file_name = transcript_file_name();
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.directory.join(&file_name))
                .await?;
            tracing::debug!("Transcript rolled to {}", file_name);
            self.transcript = Some(TranscriptFile {
                file_name,
                file,
                written: 0,
            });
        }

        if let Some(current) = self.transcript.as_mut() {
            let mut buf = Vec::with_capacity(line.len() + 1);
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
            current.file.write_all(&buf).await?;
            current.file.flush().await?;
            current.written += buf.len() as u64;
        }
        Ok(())
    }
}
