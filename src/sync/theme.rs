use crate::api::PreferencesApi;
use crate::errors::AppResult;
use crate::messaging::envelope::{MessageType, ThemePayload};
use crate::messaging::{ListenerHandle, Messenger};
use crate::models::{ColorMode, FrameRole};
use crate::storage::LocalStore;
use crate::sync::dom::DocumentRoot;
use std::sync::{Arc, Mutex, PoisonError};

const THEME_ATTRIBUTE: &str = "data-theme";
const COLOR_SCHEME_ATTRIBUTE: &str = "color-scheme";
const CLASS_ATTRIBUTE: &str = "class";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeChange {
    Unchanged,
    Applied { writes: usize },
}

/// Writes only the attributes that differ from `mode`. Returns the number
/// of writes performed.
pub fn apply_to_document(document: &dyn DocumentRoot, mode: ColorMode) -> usize {
    let class = format!("theme-{}", mode.as_str());
    let wanted = [
        (THEME_ATTRIBUTE, mode.as_str()),
        (COLOR_SCHEME_ATTRIBUTE, mode.as_str()),
        (CLASS_ATTRIBUTE, class.as_str()),
    ];
    let mut writes = 0;
    for (name, value) in wanted {
        if document.attribute(name).as_deref() != Some(value) {
            document.set_attribute(name, value);
            writes += 1;
        }
    }
    writes
}

/// Keeps the color mode of both frames in step. Local changes are applied,
/// persisted and broadcast; changes received from the peer are only applied.
pub struct ThemeSync<P: PreferencesApi> {
    messenger: Messenger,
    document: Arc<dyn DocumentRoot>,
    preferences: Arc<P>,
    store: Option<Arc<LocalStore>>,
    role: FrameRole,
    current: Arc<Mutex<Option<ColorMode>>>,
    handles: Mutex<Vec<ListenerHandle>>,
}

impl<P: PreferencesApi> ThemeSync<P> {
    pub fn new(
        messenger: Messenger,
        document: Arc<dyn DocumentRoot>,
        preferences: Arc<P>,
        store: Option<Arc<LocalStore>>,
        role: FrameRole,
    ) -> Self {
        let current = Arc::new(Mutex::new(None));
        let mut handles = Vec::new();
        for r#type in [MessageType::ChangeTheme, MessageType::ThemeChanged] {
            let document = document.clone();
            let current = current.clone();
            handles.push(messenger.add_listener(r#type, move |inbound| {
                let payload: ThemePayload = inbound.envelope.payload_as()?;
                let mode = payload.color_mode();
                let writes = apply_to_document(document.as_ref(), mode);
                *current.lock().unwrap_or_else(PoisonError::into_inner) = Some(mode);
                tracing::debug!(mode = mode.as_str(), writes, "applied theme from peer");
                Ok(())
            }));
        }

        Self {
            messenger,
            document,
            preferences,
            store,
            role,
            current,
            handles: Mutex::new(handles),
        }
    }

    pub fn current(&self) -> Option<ColorMode> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn outgoing_type(&self) -> MessageType {
        match self.role {
            FrameRole::Host => MessageType::ChangeTheme,
            FrameRole::Embedded => MessageType::ThemeChanged,
        }
    }

    /// Applies the locally stored preference without broadcasting it.
    pub fn restore(&self) -> AppResult<Option<ColorMode>> {
        let Some(store) = self.store.as_ref() else {
            return Ok(None);
        };
        let Some(mode) = store.color_mode()? else {
            return Ok(None);
        };
        apply_to_document(self.document.as_ref(), mode);
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(mode);
        Ok(Some(mode))
    }

    /// User-initiated change. Persistence failures are logged; the change
    /// still applies and broadcasts.
    pub async fn change_theme(&self, raw_mode: &str) -> ThemeChange {
        let mode = ColorMode::normalize(raw_mode);
        let writes = apply_to_document(self.document.as_ref(), mode);
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(mode);
        if previous == Some(mode) && writes == 0 {
            return ThemeChange::Unchanged;
        }

        if let Some(store) = self.store.as_ref() {
            if let Err(error) = store.set_color_mode(mode) {
                tracing::warn!(error = %error, "failed to store color mode locally");
            }
        }
        if let Err(error) = self.preferences.save_theme(mode).await {
            tracing::warn!(error = %error, mode = mode.as_str(), "failed to persist theme preference");
        }

        match serde_json::to_value(ThemePayload {
            mode: mode.as_str().to_string(),
        }) {
            Ok(payload) => self.messenger.send_message(self.outgoing_type(), payload),
            Err(error) => tracing::warn!(error = %error, "theme broadcast skipped"),
        }
        ThemeChange::Applied { writes }
    }

    pub async fn toggle(&self) -> ThemeChange {
        let next = self.current().unwrap_or(ColorMode::Light).toggled();
        self.change_theme(next.as_str()).await
    }

    pub fn teardown(&self) {
        for handle in self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            let _ = handle.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_to_document, ThemeChange, ThemeSync};
    use crate::api::PreferencesApi;
    use crate::errors::{AppError, AppResult};
    use crate::messaging::{ChannelWindow, FrameTransport, Messenger, OriginCell, RawFrameEvent, TrustedOrigin};
    use crate::models::{ColorMode, FrameRole};
    use crate::storage::LocalStore;
    use crate::sync::dom::{DocumentRoot, MemoryDocument};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;
    use tokio::time::Duration;

    #[derive(Default)]
    struct RecordingPreferences {
        saved: Mutex<Vec<ColorMode>>,
        fail: bool,
    }

    impl PreferencesApi for RecordingPreferences {
        async fn save_theme(&self, mode: ColorMode) -> AppResult<()> {
            self.saved.lock().expect("saved").push(mode);
            if self.fail {
                return Err(AppError::Network("offline".to_string()));
            }
            Ok(())
        }
    }

    struct Fixture {
        sync: ThemeSync<RecordingPreferences>,
        document: Arc<MemoryDocument>,
        preferences: Arc<RecordingPreferences>,
        messenger: Messenger,
        peer_inbound: mpsc::UnboundedReceiver<RawFrameEvent>,
    }

    fn fixture(role: FrameRole, fail: bool) -> Fixture {
        let (local, peer) = ChannelWindow::pair("http://localhost:80", "http://localhost:3000");
        let (_sender, inbound) = mpsc::unbounded_channel();
        let messenger = Messenger::new(
            FrameTransport::new(Some(local.peer.clone())),
            OriginCell::new(TrustedOrigin::Wildcard),
            inbound,
            Duration::from_secs(1),
        );
        let document = Arc::new(MemoryDocument::new());
        let preferences = Arc::new(RecordingPreferences {
            fail,
            ..RecordingPreferences::default()
        });
        let store = Arc::new(LocalStore::open_in_memory().expect("store"));
        let sync = ThemeSync::new(messenger.clone(), document.clone(), preferences.clone(), Some(store), role);
        Fixture {
            sync,
            document,
            preferences,
            messenger,
            peer_inbound: peer.inbound,
        }
    }

    fn drain_types(inbound: &mut mpsc::UnboundedReceiver<RawFrameEvent>) -> Vec<String> {
        let mut types = Vec::new();
        while let Ok(event) = inbound.try_recv() {
            if let Some(data) = event.data {
                types.push(data["type"].as_str().unwrap_or_default().to_string());
            }
        }
        types
    }

    #[test]
    fn applying_the_same_mode_twice_writes_nothing() {
        let document = MemoryDocument::new();
        assert_eq!(apply_to_document(&document, ColorMode::Dark), 3);
        assert_eq!(apply_to_document(&document, ColorMode::Dark), 0);
        assert_eq!(document.attribute_writes(), 3);
    }

    #[tokio::test]
    async fn local_change_applies_persists_and_broadcasts_once() {
        let mut fx = fixture(FrameRole::Host, false);

        assert_eq!(fx.sync.change_theme("dark").await, ThemeChange::Applied { writes: 3 });
        assert_eq!(fx.sync.change_theme("DARK").await, ThemeChange::Unchanged);

        assert_eq!(fx.document.attribute_writes(), 3);
        assert_eq!(*fx.preferences.saved.lock().expect("saved"), vec![ColorMode::Dark]);
        assert_eq!(drain_types(&mut fx.peer_inbound), vec!["CHANGE_THEME"]);
    }

    #[tokio::test]
    async fn embedded_frame_broadcasts_grafana_event() {
        let mut fx = fixture(FrameRole::Embedded, false);
        fx.sync.toggle().await;
        assert_eq!(fx.sync.current(), Some(ColorMode::Dark));
        assert_eq!(drain_types(&mut fx.peer_inbound), vec!["grafana.theme.changed"]);
    }

    #[tokio::test]
    async fn persistence_failure_still_broadcasts() {
        let mut fx = fixture(FrameRole::Host, true);
        fx.sync.change_theme("dark").await;
        assert_eq!(drain_types(&mut fx.peer_inbound), vec!["CHANGE_THEME"]);
    }

    #[tokio::test]
    async fn received_theme_is_applied_without_echo() {
        let mut fx = fixture(FrameRole::Host, false);
        fx.messenger.receive(RawFrameEvent {
            origin: "http://localhost:3000".to_string(),
            data: Some(serde_json::json!({ "type": "grafana.theme.changed", "payload": { "mode": "dark" } })),
        });

        assert_eq!(fx.sync.current(), Some(ColorMode::Dark));
        assert_eq!(fx.document.attribute("data-theme").as_deref(), Some("dark"));
        assert!(fx.preferences.saved.lock().expect("saved").is_empty());
        assert!(drain_types(&mut fx.peer_inbound).is_empty());

        // the observer then reports the same mode locally; nothing goes out
        assert_eq!(fx.sync.change_theme("dark").await, ThemeChange::Unchanged);
        assert!(drain_types(&mut fx.peer_inbound).is_empty());
    }

    #[tokio::test]
    async fn teardown_stops_listening() {
        let fx = fixture(FrameRole::Host, false);
        assert_eq!(fx.messenger.listener_count(), 2);
        fx.sync.teardown();
        assert_eq!(fx.messenger.listener_count(), 0);
        assert_eq!(fx.sync.restore().expect("restore"), None);
    }
}
