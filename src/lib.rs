pub mod api;
pub mod config;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod storage;
pub mod sync;
pub mod update;

use crate::config::ShellConfig;
use crate::errors::AppResult;
use crate::messaging::{FrameEndpoint, FrameTransport, ListenerHandle, Messenger, OriginCell, OriginHandshake, TrustedOrigin};
use crate::models::FrameRole;
use crate::storage::LocalStore;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::Duration;

/// Per-instance wiring shared by every bridge component: configuration, the
/// trusted-origin cell, the messenger and the local store.
pub struct ShellContext {
    config: ShellConfig,
    local_origin: String,
    origin: OriginCell,
    messenger: Messenger,
    store: Arc<LocalStore>,
    handshake: Mutex<Option<ListenerHandle>>,
}

impl ShellContext {
    pub fn new(config: ShellConfig, endpoint: FrameEndpoint, trusted: TrustedOrigin) -> AppResult<Self> {
        let store = match config.state_db_path.as_deref() {
            Some(path) => LocalStore::open(path)?,
            None => LocalStore::open_in_memory()?,
        };
        let origin = OriginCell::new(trusted);
        let messenger = Messenger::new(
            FrameTransport::new(Some(endpoint.peer)),
            origin.clone(),
            endpoint.inbound,
            Duration::from_millis(config.request_timeout_ms),
        );
        tracing::info!(
            role = config.role.as_str(),
            local_origin = %endpoint.origin,
            "shell context created"
        );
        Ok(Self {
            config,
            local_origin: endpoint.origin,
            origin,
            messenger,
            store: Arc::new(store),
            handshake: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn role(&self) -> FrameRole {
        self.config.role
    }

    pub fn local_origin(&self) -> &str {
        &self.local_origin
    }

    pub fn origin(&self) -> &OriginCell {
        &self.origin
    }

    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    pub fn store(&self) -> Arc<LocalStore> {
        self.store.clone()
    }

    /// Starts the inbound pump and the role's side of the origin handshake.
    /// Must run inside a tokio runtime. Returns `false` if already started.
    pub fn start(&self) -> bool {
        let mut handshake = self.handshake.lock().unwrap_or_else(PoisonError::into_inner);
        if handshake.is_some() || self.messenger.is_registered() {
            return false;
        }
        *handshake = match self.config.role {
            FrameRole::Host => OriginHandshake::start(&self.messenger, &self.local_origin),
            FrameRole::Embedded => Some(OriginHandshake::answer_probes(&self.messenger, &self.local_origin)),
        };
        self.messenger.register()
    }

    pub fn shutdown(&self) {
        if let Some(handle) = self.handshake.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = handle.dispose();
        }
        self.messenger.unregister();
        tracing::info!(role = self.config.role.as_str(), "shell context stopped");
    }
}
