//! Session construction surface
//!
//! Hosts build their networking sessions through a [`SessionConstructor`]. Each
//! construction entry point can carry one [`SessionHook`] that decorates the
//! transport of sessions created afterwards.

use super::transport::{Transport, TransportResult};
use crate::models::{CachePolicy, RequestOptions};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

/// The ways a host can construct a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryPoint {
    Standard,
    Ephemeral,
    Background,
    DefaultConstructor,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 4] = [
        EntryPoint::Standard,
        EntryPoint::Ephemeral,
        EntryPoint::Background,
        EntryPoint::DefaultConstructor,
    ];
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstallError {
    #[error("entry point {0:?} cannot be hooked on this platform")]
    Unsupported(EntryPoint),
}

/// Settings a session is created with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Caller-supplied identifier, required for background sessions
    pub identifier: Option<String>,
    pub timeout: Option<Duration>,
    pub cache_policy: CachePolicy,
}

impl SessionConfig {
    pub fn with_identifier(identifier: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            ..Default::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }
}

pub trait SessionHook: Send + Sync {
    /// Return the transport the new session should use.
    fn wrap(&self, config: &SessionConfig, transport: Arc<dyn Transport>) -> Arc<dyn Transport>;
}

pub trait SessionConstructor: Send + Sync {
    fn register_hook(
        &self,
        entry_point: EntryPoint,
        hook: Arc<dyn SessionHook>,
    ) -> Result<(), InstallError>;

    fn unregister_hook(&self, entry_point: EntryPoint);
}

/// Session constructor around a shared base transport
pub struct SessionFactory {
    base: Arc<dyn Transport>,
    supported: Vec<EntryPoint>,
    hooks: RwLock<HashMap<EntryPoint, Arc<dyn SessionHook>>>,
}

impl SessionFactory {
    pub fn new(base: Arc<dyn Transport>) -> Self {
        Self::with_supported_entry_points(base, &EntryPoint::ALL)
    }

    /// Factory on a platform where only `supported` entry points accept hooks.
    pub fn with_supported_entry_points(
        base: Arc<dyn Transport>,
        supported: &[EntryPoint],
    ) -> Self {
        Self {
            base,
            supported: supported.to_vec(),
            hooks: RwLock::new(HashMap::new()),
        }
    }

    pub fn standard_session(&self, config: SessionConfig) -> Session {
        self.construct(EntryPoint::Standard, config)
    }

    pub fn ephemeral_session(&self, config: SessionConfig) -> Session {
        self.construct(EntryPoint::Ephemeral, config)
    }

    pub fn background_session(
        &self,
        identifier: impl Into<String>,
        config: SessionConfig,
    ) -> Session {
        let config = SessionConfig {
            identifier: Some(identifier.into()),
            ..config
        };
        self.construct(EntryPoint::Background, config)
    }

    pub fn default_session(&self) -> Session {
        self.construct(EntryPoint::DefaultConstructor, SessionConfig::default())
    }

    fn construct(&self, entry_point: EntryPoint, config: SessionConfig) -> Session {
        let hook = match self.hooks.read() {
            Ok(hooks) => hooks.get(&entry_point).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&entry_point).cloned(),
        };
        let transport = match hook {
            Some(hook) => hook.wrap(&config, Arc::clone(&self.base)),
            None => Arc::clone(&self.base),
        };
        Session {
            entry_point,
            config,
            transport,
        }
    }
}

impl SessionConstructor for SessionFactory {
    fn register_hook(
        &self,
        entry_point: EntryPoint,
        hook: Arc<dyn SessionHook>,
    ) -> Result<(), InstallError> {
        if !self.supported.contains(&entry_point) {
            return Err(InstallError::Unsupported(entry_point));
        }
        let mut hooks = self
            .hooks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        hooks.insert(entry_point, hook);
        Ok(())
    }

    fn unregister_hook(&self, entry_point: EntryPoint) {
        let mut hooks = self
            .hooks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        hooks.remove(&entry_point);
    }
}

/// A constructed session; its transport is fixed at creation time.
#[derive(Clone)]
pub struct Session {
    entry_point: EntryPoint,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
}

impl Session {
    pub fn entry_point(&self) -> EntryPoint {
        self.entry_point
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Send a request, stamping the session defaults onto it when it has none.
    pub async fn send(&self, mut request: http::Request<Bytes>) -> TransportResult {
        if request.extensions().get::<RequestOptions>().is_none() {
            request.extensions_mut().insert(RequestOptions {
                timeout: self.config.timeout,
                cache_policy: self.config.cache_policy,
            });
        }
        self.transport.send(request).await
    }
}
