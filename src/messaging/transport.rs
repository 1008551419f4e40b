use crate::errors::{AppError, AppResult};
use crate::messaging::envelope::{Envelope, MessageType};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A `message` event as the receiving window observes it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrameEvent {
    pub origin: String,
    pub data: Option<serde_json::Value>,
}

/// The window on the other side of the frame boundary.
pub trait FrameWindow: Send + Sync {
    fn post_message(&self, data: serde_json::Value, target_origin: &str) -> AppResult<()>;
}

/// In-process window: posting delivers a [`RawFrameEvent`] to the peer's
/// inbound queue, stamped with the sender's origin.
#[derive(Debug, Clone)]
pub struct ChannelWindow {
    sender: mpsc::UnboundedSender<RawFrameEvent>,
    sender_origin: String,
    receiver_origin: String,
}

/// One side of a wired frame pair.
pub struct FrameEndpoint {
    pub origin: String,
    pub peer: Arc<dyn FrameWindow>,
    pub inbound: mpsc::UnboundedReceiver<RawFrameEvent>,
}

impl ChannelWindow {
    pub fn new(
        sender: mpsc::UnboundedSender<RawFrameEvent>,
        sender_origin: impl Into<String>,
        receiver_origin: impl Into<String>,
    ) -> Self {
        Self {
            sender,
            sender_origin: sender_origin.into(),
            receiver_origin: receiver_origin.into(),
        }
    }

    pub fn pair(host_origin: &str, embedded_origin: &str) -> (FrameEndpoint, FrameEndpoint) {
        let (to_host, host_inbound) = mpsc::unbounded_channel();
        let (to_embedded, embedded_inbound) = mpsc::unbounded_channel();
        let host = FrameEndpoint {
            origin: host_origin.to_string(),
            peer: Arc::new(ChannelWindow::new(to_embedded, host_origin, embedded_origin)),
            inbound: host_inbound,
        };
        let embedded = FrameEndpoint {
            origin: embedded_origin.to_string(),
            peer: Arc::new(ChannelWindow::new(to_host, embedded_origin, host_origin)),
            inbound: embedded_inbound,
        };
        (host, embedded)
    }
}

impl FrameWindow for ChannelWindow {
    fn post_message(&self, data: serde_json::Value, target_origin: &str) -> AppResult<()> {
        if target_origin != "*" && target_origin != self.receiver_origin {
            return Err(AppError::Transport(format!(
                "target origin {} does not match recipient {}",
                target_origin, self.receiver_origin
            )));
        }
        self.sender
            .send(RawFrameEvent {
                origin: self.sender_origin.clone(),
                data: Some(data),
            })
            .map_err(|_| AppError::Transport("peer window is closed".to_string()))
    }
}

#[derive(Clone, Default)]
pub struct FrameTransport {
    target: Option<Arc<dyn FrameWindow>>,
}

impl FrameTransport {
    pub fn new(target: Option<Arc<dyn FrameWindow>>) -> Self {
        Self { target }
    }

    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    /// Posts the envelope. Never fails: a missing window or a rejected post
    /// is logged and the message is dropped.
    pub fn send(&self, envelope: &Envelope, target_origin: &str) {
        let Some(target) = self.target.as_ref() else {
            tracing::warn!(message_type = %envelope.r#type, "no target window, message dropped");
            return;
        };
        let data = match serde_json::to_value(envelope) {
            Ok(data) => data,
            Err(error) => {
                tracing::warn!(message_type = %envelope.r#type, error = %error, "envelope serialization failed");
                return;
            }
        };
        if let Err(error) = target.post_message(data, target_origin) {
            tracing::warn!(
                message_type = %envelope.r#type,
                target_origin,
                error = %error,
                "postMessage failed"
            );
        }
    }

    /// Unwraps an inbound event. Events without data or with an unknown
    /// `type` yield `None`; payload shape is left to listeners.
    pub fn receive(event: &RawFrameEvent) -> Option<Envelope> {
        let data = event.data.as_ref()?.as_object()?;
        let raw_type = data.get("type")?.as_str()?;
        let Some(r#type) = MessageType::from_wire(raw_type) else {
            tracing::debug!(origin = %event.origin, message_type = raw_type, "unrecognized message type");
            return None;
        };
        let id = match data.get("id") {
            Some(serde_json::Value::String(id)) => Some(id.clone()),
            Some(serde_json::Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        let payload = data.get("payload").cloned().unwrap_or(serde_json::Value::Null);
        Some(Envelope { id, r#type, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::{ChannelWindow, FrameTransport, RawFrameEvent};
    use crate::messaging::envelope::{Envelope, MessageType};

    fn event(data: serde_json::Value) -> RawFrameEvent {
        RawFrameEvent {
            origin: "http://localhost:3000".to_string(),
            data: Some(data),
        }
    }

    #[test]
    fn receive_ignores_missing_or_unknown_types() {
        let empty = RawFrameEvent {
            origin: "http://localhost".to_string(),
            data: None,
        };
        assert!(FrameTransport::receive(&empty).is_none());
        assert!(FrameTransport::receive(&event(serde_json::json!("text"))).is_none());
        assert!(FrameTransport::receive(&event(serde_json::json!({ "payload": 1 }))).is_none());
        assert!(FrameTransport::receive(&event(serde_json::json!({ "type": "webpackOk" }))).is_none());
    }

    #[test]
    fn receive_passes_malformed_payload_through() {
        let envelope = FrameTransport::receive(&event(serde_json::json!({
            "id": "abc",
            "type": "NAVIGATE_TO",
            "payload": { "unexpected": true }
        })))
        .expect("recognized type");
        assert_eq!(envelope.id.as_deref(), Some("abc"));
        assert_eq!(envelope.r#type, MessageType::NavigateTo);
        assert!(envelope.decode().is_err());
    }

    #[test]
    fn send_without_window_is_a_noop() {
        let transport = FrameTransport::new(None);
        transport.send(&Envelope::new(MessageType::GrafanaReady, serde_json::Value::Null), "*");
        assert!(!transport.has_target());
    }

    #[tokio::test]
    async fn channel_window_enforces_target_origin() {
        let (host, mut embedded) = ChannelWindow::pair("http://host:80", "http://grafana:3000");
        let transport = FrameTransport::new(Some(host.peer.clone()));
        let envelope = Envelope::new(MessageType::MessengerReady, serde_json::Value::Null);

        transport.send(&envelope, "http://elsewhere:1");
        assert!(embedded.inbound.try_recv().is_err());

        transport.send(&envelope, "http://grafana:3000");
        let delivered = embedded.inbound.recv().await.expect("delivered");
        assert_eq!(delivered.origin, "http://host:80");
        assert_eq!(FrameTransport::receive(&delivered), Some(envelope));
    }
}
