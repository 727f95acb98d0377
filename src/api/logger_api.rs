//! Network logger service
//!
//! [`NetworkLogger`] owns the log, the body store and the installer. Hosts create
//! one at startup, call [`NetworkLogger::install`], and query it from their UI.

use super::config::LoggerConfig;
use crate::format;
use crate::intercept::{ExchangeRecorder, InterceptionInstaller, SessionConstructor};
use crate::models::{
    header_value, BodyHandle, BodyView, ContentTypeClass, ExchangeDetail, ExchangeRecord,
    ExchangeSummary, StatusColor,
};
use crate::storage::{
    export_har_to_path, BodyStore, LoadedExchange, LogEvent, LogSnapshot, LogStore,
    RetentionSweeper, SweepReport,
};
use anyhow::Context;
use bytes::Bytes;
use chrono::Utc;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::level_filters::LevelFilter;

/// Install the global tracing subscriber.
///
/// Debug builds log to stderr. Release builds write a daily rolling file under
/// `log_dir`. An already installed subscriber is left in place.
#[allow(unused_variables)]
pub fn init_logging(log_dir: Option<&Path>) -> anyhow::Result<()> {
    let level = resolve_log_level();

    #[cfg(debug_assertions)]
    {
        let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
    }

    #[cfg(not(debug_assertions))]
    {
        let log_dir = log_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| std::path::PathBuf::from("logs"));
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("creating log directory {}", log_dir.display()))?;
        let file_appender = tracing_appender::rolling::daily(&log_dir, "netlog_core");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Logging lasts until process exit.
        std::mem::forget(guard);
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(non_blocking)
            .try_init();
    }

    tracing::info!("Network logger core v{}", crate::VERSION);
    Ok(())
}

fn resolve_log_level() -> LevelFilter {
    match std::env::var("RUST_LOG") {
        Ok(val) => match val.to_lowercase().as_str() {
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            "info" => LevelFilter::INFO,
            "warn" | "warning" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            "off" => LevelFilter::OFF,
            _ => LevelFilter::INFO,
        },
        Err(_) => LevelFilter::INFO,
    }
}

pub struct NetworkLogger {
    config: LoggerConfig,
    store: Arc<LogStore>,
    bodies: Arc<BodyStore>,
    recorder: Arc<ExchangeRecorder>,
    installer: InterceptionInstaller,
    sweeper: RetentionSweeper,
    startup_sweep: Mutex<Option<JoinHandle<SweepReport>>>,
}

impl NetworkLogger {
    /// Open storage under `config.storage_path` and start sweeping expired artifacts
    /// on the blocking pool. Capture starts only after [`install`](Self::install).
    /// Needs a tokio runtime.
    pub fn new(
        config: LoggerConfig,
        surface: Arc<dyn SessionConstructor>,
    ) -> anyhow::Result<Self> {
        config.validate().context("invalid logger configuration")?;

        let bodies = Arc::new(
            BodyStore::open(&config.storage_path, config.transcript_max_bytes)
                .context("opening body store")?,
        );
        let store = Arc::new(LogStore::new(config.max_entries));
        let recorder = Arc::new(ExchangeRecorder::new(
            Arc::clone(&store),
            Arc::clone(&bodies),
            config.abandon_after,
        ));
        let installer = InterceptionInstaller::new(
            surface,
            Arc::clone(&recorder),
            config.opt_out_marker.clone(),
        );
        let sweeper = RetentionSweeper::new(&config.storage_path, config.retention_days);

        let startup_sweep = {
            let sweeper = sweeper.clone();
            tokio::spawn(async move { sweeper.sweep().await })
        };
        tracing::info!(
            "Network logger ready at {} (max_entries={})",
            config.storage_path.display(),
            config.max_entries
        );

        Ok(Self {
            config,
            store,
            bodies,
            recorder,
            installer,
            sweeper,
            startup_sweep: Mutex::new(Some(startup_sweep)),
        })
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<LogStore> {
        &self.store
    }

    pub fn recorder(&self) -> &Arc<ExchangeRecorder> {
        &self.recorder
    }

    pub fn install(&self) {
        self.installer.install();
    }

    pub fn uninstall(&self) {
        self.installer.uninstall();
    }

    pub fn is_installed(&self) -> bool {
        self.installer.is_installed()
    }

    pub fn snapshot(&self) -> LogSnapshot {
        self.store.all()
    }

    /// History rows, newest first. An empty term matches everything; otherwise
    /// the term is matched case-insensitively against URL, method and status.
    pub fn query(&self, search_term: &str) -> Vec<ExchangeSummary> {
        let term = search_term.trim().to_lowercase();
        let now = Utc::now();
        self.store
            .all()
            .iter()
            .rev()
            .filter(|record| term.is_empty() || matches_term(record, &term))
            .map(|record| ExchangeSummary {
                id: record.id.clone(),
                method: record.request_method.clone(),
                url: record.request_url.clone(),
                status_code: record.response_status_code,
                color: StatusColor::for_record(record),
                relative_time: format::relative_time(record.request_date, now),
            })
            .collect()
    }

    /// The record behind `id` with both bodies loaded from disk
    pub async fn detail(&self, id: &str) -> Option<ExchangeDetail> {
        let record = self.store.get(id)?;
        let request_class = header_value(&record.request_headers, "content-type")
            .map(ContentTypeClass::from_content_type)
            .unwrap_or(ContentTypeClass::Other);
        let content_type_class = record.content_type_class();

        let request_body = self
            .body_view(record.request_body.as_ref(), request_class)
            .await;
        let response_body = self
            .body_view(record.response_body.as_ref(), content_type_class)
            .await;

        Some(ExchangeDetail {
            record: ExchangeRecord::clone(&record),
            content_type_class,
            request_body,
            response_body,
        })
    }

    /// `curl` reconstruction of the request behind `id`
    pub async fn export(&self, id: &str) -> Option<String> {
        let record = self.store.get(id)?;
        let body = self.load_quietly(record.request_body.as_ref()).await;
        Some(format::curl_command(&record, body.as_deref()))
    }

    /// Write the current log as a HAR file. Returns the number of entries.
    pub async fn export_har(&self, path: impl AsRef<Path>) -> anyhow::Result<usize> {
        let snapshot = self.store.all();
        let mut loaded = Vec::with_capacity(snapshot.len());
        for record in snapshot.iter() {
            loaded.push(LoadedExchange {
                record: record.as_ref(),
                request_body: self.load_quietly(record.request_body.as_ref()).await,
                response_body: self.load_quietly(record.response_body.as_ref()).await,
            });
        }
        let path = path.as_ref();
        let count = export_har_to_path(&loaded, path)
            .await
            .with_context(|| format!("exporting HAR to {}", path.display()))?;
        tracing::info!("Exported {} exchanges to {}", count, path.display());
        Ok(count)
    }

    /// Forget every record. Body files stay until retention removes them.
    pub fn clear(&self) {
        self.store.clear();
        self.bodies.forget_failures();
        tracing::info!("Network log cleared");
    }

    /// Delete every logger artifact on disk now, after pending writes land.
    pub async fn wipe_bodies(&self) -> SweepReport {
        self.bodies.flush().await;
        self.finish_startup_sweep().await;
        let report = self.sweeper.delete_all().await;
        self.bodies.forget_failures();
        report
    }

    pub async fn sweep(&self) -> SweepReport {
        self.finish_startup_sweep().await;
        self.sweeper.sweep().await
    }

    /// Wait for the sweep started by [`new`](Self::new). Returns `None` once it has
    /// already been awaited.
    pub async fn finish_startup_sweep(&self) -> Option<SweepReport> {
        let pending = self
            .startup_sweep
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match pending?.await {
            Ok(report) => {
                tracing::debug!("Startup sweep removed {} artifacts", report.deleted);
                Some(report)
            }
            Err(err) => {
                tracing::error!("Startup sweep task failed: {}", err);
                None
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.store.subscribe()
    }

    /// Wait until every queued body and transcript write has been attempted.
    pub async fn flush(&self) {
        self.bodies.flush().await;
    }

    /// Start the background task that abandons stale records and sweeps old artifacts.
    pub fn spawn_maintenance(&self) -> MaintenanceHandle {
        let recorder = Arc::clone(&self.recorder);
        let sweeper = self.sweeper.clone();
        let abandon_every = self.config.maintenance_interval;
        let sweep_every = self.config.sweep_interval;
        let (shutdown_tx, mut shutdown) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut abandon_tick = tokio::time::interval(abandon_every);
            let mut sweep_tick = tokio::time::interval(sweep_every);
            // Both intervals fire immediately; `new` already started a sweep.
            sweep_tick.tick().await;
            tracing::debug!("Logger maintenance task running");

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        tracing::debug!("Logger maintenance task shutting down");
                        break;
                    }
                    _ = abandon_tick.tick() => {
                        let abandoned = recorder.abandon_stale();
                        if abandoned > 0 {
                            tracing::info!("Marked {} exchanges as abandoned", abandoned);
                        }
                    }
                    _ = sweep_tick.tick() => {
                        let report = sweeper.sweep().await;
                        if report.errors > 0 {
                            tracing::warn!("Retention sweep hit {} errors", report.errors);
                        }
                    }
                }
            }
        });

        MaintenanceHandle {
            task,
            shutdown: Some(shutdown_tx),
        }
    }

    async fn body_view(&self, handle: Option<&BodyHandle>, class: ContentTypeClass) -> BodyView {
        let Some(handle) = handle else {
            return BodyView::Empty;
        };
        match self.bodies.load(handle).await {
            Ok(Some(bytes)) => BodyView::Loaded {
                display: format::display_body(&bytes, class),
                bytes: bytes.to_vec(),
            },
            Ok(None) => BodyView::NotFound,
            Err(err) => {
                tracing::warn!("Unreadable body {}: {}", handle.file_name, err);
                BodyView::Unreadable {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn load_quietly(&self, handle: Option<&BodyHandle>) -> Option<Bytes> {
        let handle = handle?;
        match self.bodies.load(handle).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!("Skipping body {}: {}", handle.file_name, err);
                None
            }
        }
    }
}

impl Drop for NetworkLogger {
    fn drop(&mut self) {
        self.installer.uninstall();
    }
}

fn matches_term(record: &ExchangeRecord, term: &str) -> bool {
    record.request_url.to_lowercase().contains(term)
        || record.request_method.as_str().eq_ignore_ascii_case(term)
        || record
            .response_status_code
            .map(|code| code.to_string() == term)
            .unwrap_or(false)
}

/// Running maintenance task. Dropping the handle leaves the task running.
pub struct MaintenanceHandle {
    task: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MaintenanceHandle {
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(err) = (&mut self.task).await {
            tracing::warn!("Logger maintenance task ended abnormally: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::testing::{get, StaticTransport};
    use crate::intercept::{SessionConfig, SessionFactory};
    use crate::models::{ExchangeState, HttpMethod};
    use std::time::Duration;
    use tempfile::TempDir;

    fn logger(dir: &TempDir, body: &'static str) -> (NetworkLogger, Arc<SessionFactory>) {
        let factory = Arc::new(SessionFactory::new(StaticTransport::json(200, body)));
        let logger = NetworkLogger::new(
            LoggerConfig::with_storage_path(dir.path()),
            factory.clone(),
        )
        .unwrap();
        logger.install();
        (logger, factory)
    }

    #[tokio::test]
    async fn get_request_shows_up_in_query_and_detail() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, factory) = logger(&dir, r#"{"id":1,"title":"hello"}"#);

        let response = factory
            .standard_session(SessionConfig::default())
            .send(get("https://api.example.com/posts/1"))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let rows = logger.query("");
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.method, HttpMethod::Get);
        assert_eq!(row.url, "https://api.example.com/posts/1");
        assert_eq!(row.status_code, Some(200));
        assert_eq!(row.color, StatusColor::Green);
        assert_eq!(row.relative_time, "just now");

        let detail = logger.detail(&row.id).await.unwrap();
        assert_eq!(detail.record.state, ExchangeState::Completed);
        assert_eq!(detail.content_type_class, ContentTypeClass::Json);
        assert_eq!(detail.request_body, BodyView::Empty);
        match detail.response_body {
            BodyView::Loaded { bytes, display } => {
                assert_eq!(bytes, br#"{"id":1,"title":"hello"}"#.to_vec());
                assert_eq!(display, "{\n  \"id\": 1,\n  \"title\": \"hello\"\n}");
            }
            other => panic!("expected loaded body, got {:?}", other),
        }

        let curl = logger.export(&row.id).await.unwrap();
        assert!(curl.starts_with("curl -X GET 'https://api.example.com/posts/1'"));
    }

    #[tokio::test]
    async fn extension_method_survives_capture_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, factory) = logger(&dir, "<multistatus/>");
        let request = http::Request::builder()
            .method("PROPFIND")
            .uri("https://dav.example.com/x")
            .body(Bytes::new())
            .unwrap();
        factory
            .standard_session(SessionConfig::default())
            .send(request)
            .await
            .unwrap();

        let rows = logger.query("propfind");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].method, HttpMethod::Other("PROPFIND".to_string()));

        let curl = logger.export(&rows[0].id).await.unwrap();
        assert_eq!(curl, "curl -X PROPFIND 'https://dav.example.com/x'");

        let out = dir.path().join("dav.har");
        logger.export_har(&out).await.unwrap();
        let har: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(har["log"]["entries"][0]["request"]["method"], "PROPFIND");
    }

    #[tokio::test]
    async fn query_filters_and_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, factory) = logger(&dir, "{}");
        let session = factory.standard_session(SessionConfig::default());
        for path in ["users", "posts", "users/2"] {
            session
                .send(get(&format!("https://api.example.com/{}", path)))
                .await
                .unwrap();
        }

        let urls: Vec<String> = logger.query("USERS").into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://api.example.com/users/2".to_string(),
                "https://api.example.com/users".to_string(),
            ]
        );
        assert_eq!(logger.query("200").len(), 3);
        assert_eq!(logger.query("get").len(), 3);
        assert!(logger.query("nothing-matches").is_empty());
        assert!(logger.detail("missing").await.is_none());
        assert!(logger.export("missing").await.is_none());
    }

    #[tokio::test]
    async fn wiped_bodies_read_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, factory) = logger(&dir, r#"{"ok":true}"#);
        factory
            .ephemeral_session(SessionConfig::default())
            .send(get("https://api.example.com/ping"))
            .await
            .unwrap();
        let id = logger.query("")[0].id.clone();

        let report = logger.wipe_bodies().await;
        assert!(report.deleted >= 1);

        let detail = logger.detail(&id).await.unwrap();
        assert_eq!(detail.response_body, BodyView::NotFound);
        assert_eq!(detail.record.response_status_code, Some(200));
    }

    #[tokio::test]
    async fn clear_empties_log_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, factory) = logger(&dir, "{}");
        let mut events = logger.subscribe();
        factory
            .default_session()
            .send(get("https://api.example.com/"))
            .await
            .unwrap();

        logger.clear();
        assert!(logger.query("").is_empty());

        let mut saw_cleared = false;
        while let Ok(event) = events.try_recv() {
            saw_cleared |= event == LogEvent::Cleared;
        }
        assert!(saw_cleared);
    }

    #[tokio::test]
    async fn export_har_writes_current_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, factory) = logger(&dir, r#"{"n":1}"#);
        let session = factory.standard_session(SessionConfig::default());
        session.send(get("https://api.example.com/a")).await.unwrap();
        session.send(get("https://api.example.com/b")).await.unwrap();

        let out = dir.path().join("export.har");
        assert_eq!(logger.export_har(&out).await.unwrap(), 2);

        let har: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        let entries = har["log"]["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["request"]["url"], "https://api.example.com/a");
        assert_eq!(entries[0]["response"]["content"]["text"], r#"{"n":1}"#);
    }

    #[tokio::test]
    async fn startup_sweep_runs_off_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let expired = dir.path().join("logger_response_body_1_old");
        let foreign = dir.path().join("notes.txt");
        for path in [&expired, &foreign] {
            std::fs::write(path, b"x").unwrap();
            std::fs::File::options()
                .write(true)
                .open(path)
                .unwrap()
                .set_modified(std::time::SystemTime::now() - Duration::from_secs(10 * 86_400))
                .unwrap();
        }

        let (logger, _factory) = logger(&dir, "{}");
        let report = logger.finish_startup_sweep().await.unwrap();
        assert_eq!(report.deleted, 1);
        assert!(!expired.exists());
        assert!(foreign.exists());
        assert!(logger.finish_startup_sweep().await.is_none());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(SessionFactory::new(StaticTransport::json(200, "{}")));
        let mut config = LoggerConfig::with_storage_path(dir.path());
        config.max_entries = 0;
        assert!(NetworkLogger::new(config, factory).is_err());
    }

    #[tokio::test]
    async fn maintenance_abandons_stale_requests() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(SessionFactory::new(StaticTransport::json(200, "{}")));
        let mut config = LoggerConfig::with_storage_path(dir.path());
        config.abandon_after = Duration::from_millis(1);
        config.maintenance_interval = Duration::from_millis(10);
        let logger = NetworkLogger::new(config, factory).unwrap();

        let handle = logger.recorder().on_request_start(&get("https://api.example.com/hang"));
        tokio::time::sleep(Duration::from_millis(5)).await;

        let maintenance = logger.spawn_maintenance();
        tokio::time::sleep(Duration::from_millis(50)).await;
        maintenance.stop().await;

        let record = logger.store().get(handle.id()).unwrap();
        assert_eq!(record.state, ExchangeState::Abandoned);
    }
}
