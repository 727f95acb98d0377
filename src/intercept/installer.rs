//! Hooks capture into the host's session construction

use super::recorder::ExchangeRecorder;
use super::session::{EntryPoint, SessionConfig, SessionConstructor, SessionHook};
use super::transport::{RecordingTransport, Transport};
use std::sync::{Arc, Mutex, MutexGuard};

/// Sessions whose identifier contains this marker are never recorded
pub const DEFAULT_OPT_OUT_MARKER: &str = "logger_bypass";

struct CaptureHook {
    recorder: Arc<ExchangeRecorder>,
    opt_out_marker: String,
}

impl CaptureHook {
    fn opted_out(&self, config: &SessionConfig) -> bool {
        !self.opt_out_marker.is_empty()
            && config
                .identifier
                .as_deref()
                .map(|id| id.contains(&self.opt_out_marker))
                .unwrap_or(false)
    }
}

impl SessionHook for CaptureHook {
    fn wrap(&self, config: &SessionConfig, transport: Arc<dyn Transport>) -> Arc<dyn Transport> {
        if self.opted_out(config) {
            tracing::debug!(
                "Session {:?} opted out of capture",
                config.identifier.as_deref().unwrap_or_default()
            );
            return transport;
        }
        Arc::new(RecordingTransport::new(transport, Arc::clone(&self.recorder)))
    }
}

pub struct InterceptionInstaller {
    surface: Arc<dyn SessionConstructor>,
    hook: Arc<CaptureHook>,
    /// `Some` while installed, holding the entry points actually hooked
    patched: Mutex<Option<Vec<EntryPoint>>>,
}

impl InterceptionInstaller {
    pub fn new(
        surface: Arc<dyn SessionConstructor>,
        recorder: Arc<ExchangeRecorder>,
        opt_out_marker: impl Into<String>,
    ) -> Self {
        Self {
            surface,
            hook: Arc::new(CaptureHook {
                recorder,
                opt_out_marker: opt_out_marker.into(),
            }),
            patched: Mutex::new(None),
        }
    }

    /// Hook every entry point the surface accepts. Calling it again is a no-op.
    pub fn install(&self) {
        let mut patched = self.lock_patched();
        if patched.is_some() {
            tracing::debug!("Network capture already installed");
            return;
        }

        let hook: Arc<dyn SessionHook> = self.hook.clone();
        let mut hooked = Vec::with_capacity(EntryPoint::ALL.len());
        for entry_point in EntryPoint::ALL {
            match self.surface.register_hook(entry_point, Arc::clone(&hook)) {
                Ok(()) => hooked.push(entry_point),
                Err(err) => tracing::warn!("Skipping session entry point: {}", err),
            }
        }
        tracing::info!(
            "Network capture installed on {}/{} session entry points",
            hooked.len(),
            EntryPoint::ALL.len()
        );
        *patched = Some(hooked);
    }

    /// Remove the hooks. Sessions created earlier keep their transport.
    pub fn uninstall(&self) {
        let mut patched = self.lock_patched();
        match patched.take() {
            Some(hooked) => {
                for entry_point in hooked {
                    self.surface.unregister_hook(entry_point);
                }
                tracing::info!("Network capture uninstalled");
            }
            None => tracing::debug!("Network capture not installed, nothing to remove"),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.lock_patched().is_some()
    }

    pub fn patched_entry_points(&self) -> Vec<EntryPoint> {
        self.lock_patched().clone().unwrap_or_default()
    }

    fn lock_patched(&self) -> MutexGuard<'_, Option<Vec<EntryPoint>>> {
        self.patched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
