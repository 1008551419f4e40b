use crate::messaging::envelope::{MessageType, TitlePayload};
use crate::messaging::{ListenerHandle, Messenger};
use crate::sync::dom::DocumentRoot;
use std::sync::{Arc, Mutex, PoisonError};

pub struct TitleSync {
    messenger: Messenger,
    last_title: Arc<Mutex<Option<String>>>,
    handle: Mutex<Option<ListenerHandle>>,
}

impl TitleSync {
    pub fn new(messenger: Messenger, document: Arc<dyn DocumentRoot>) -> Self {
        let last_title = Arc::new(Mutex::new(None));
        let listener_title = last_title.clone();
        let handle = messenger.add_listener(MessageType::DocumentTitleChange, move |inbound| {
            let payload: TitlePayload = inbound.envelope.payload_as()?;
            *listener_title.lock().unwrap_or_else(PoisonError::into_inner) = Some(payload.title.clone());
            if document.title() != payload.title {
                document.set_title(&payload.title);
            }
            Ok(())
        });
        Self {
            messenger,
            last_title,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Called for every observed title mutation; only new titles go out.
    pub fn on_title_change(&self, title: &str) -> bool {
        {
            let mut last = self.last_title.lock().unwrap_or_else(PoisonError::into_inner);
            if last.as_deref() == Some(title) {
                return false;
            }
            *last = Some(title.to_string());
        }
        match serde_json::to_value(TitlePayload {
            title: title.to_string(),
        }) {
            Ok(payload) => {
                self.messenger.send_message(MessageType::DocumentTitleChange, payload);
                true
            }
            Err(error) => {
                tracing::warn!(error = %error, "title change not forwarded");
                false
            }
        }
    }

    pub fn teardown(&self) {
        if let Some(handle) = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = handle.dispose();
        }
    }
}
