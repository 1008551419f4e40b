use crate::messaging::envelope::{Envelope, HandshakePayload, MessageType};
use crate::messaging::messenger::{ListenerHandle, Messenger};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustedOrigin {
    /// Any origin; only used on development hosts.
    Wildcard,
    Concrete(String),
}

impl TrustedOrigin {
    /// Value passed as `targetOrigin` when posting.
    pub fn as_target(&self) -> &str {
        match self {
            Self::Wildcard => "*",
            Self::Concrete(origin) => origin.as_str(),
        }
    }

    pub fn permits(&self, origin: &str) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Concrete(trusted) => trusted == origin,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }
}

/// Shared trusted-origin reference. Moves from wildcard to a concrete origin
/// at most once and never back.
#[derive(Debug, Clone)]
pub struct OriginCell {
    value: Arc<RwLock<TrustedOrigin>>,
}

impl OriginCell {
    pub fn new(initial: TrustedOrigin) -> Self {
        Self {
            value: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn get(&self) -> TrustedOrigin {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Locks the cell to `origin`. Returns `false` if it was already concrete.
    pub fn lock_to(&self, origin: &str) -> bool {
        let mut value = self.value.write().unwrap_or_else(PoisonError::into_inner);
        if !value.is_wildcard() {
            return false;
        }
        *value = TrustedOrigin::Concrete(origin.to_string());
        true
    }
}

pub fn is_dev_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.eq_ignore_ascii_case("localhost") || host.parse::<IpAddr>().is_ok()
}

fn origin_of(url: &Url) -> Option<String> {
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

pub struct OriginHandshake;

impl OriginHandshake {
    /// Initial trusted origin for a frame loaded at `location`.
    pub fn resolve(location: &Url, referrer: Option<&str>) -> TrustedOrigin {
        if location.host_str().is_some_and(is_dev_host) {
            return TrustedOrigin::Wildcard;
        }
        let from_referrer = referrer
            .filter(|raw| !raw.trim().is_empty())
            .and_then(|raw| Url::parse(raw).ok())
            .and_then(|url| origin_of(&url));
        match from_referrer.or_else(|| origin_of(location)) {
            Some(origin) => TrustedOrigin::Concrete(origin),
            None => {
                tracing::warn!(location = %location, "location has no usable origin; staying permissive");
                TrustedOrigin::Wildcard
            }
        }
    }

    /// Probes the peer while the cell is still wildcard. The first
    /// acknowledgement locks the cell to the acknowledging origin and removes
    /// the listener; later acknowledgements are ignored.
    pub fn start(messenger: &Messenger, local_origin: &str) -> Option<ListenerHandle> {
        if !messenger.origin().get().is_wildcard() {
            return None;
        }

        let slot: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));
        let cell = messenger.origin().clone();
        let listener_slot = slot.clone();
        let handle = messenger.add_listener(MessageType::OriginHandshakeAck, move |inbound| {
            if cell.lock_to(&inbound.origin) {
                tracing::info!(origin = %inbound.origin, "trusted origin locked");
            }
            if let Some(handle) = listener_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            {
                let _ = handle.dispose();
            }
            Ok(())
        });
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());

        let payload = HandshakePayload {
            origin: local_origin.to_string(),
        };
        match serde_json::to_value(payload) {
            Ok(payload) => messenger.send_message(MessageType::OriginHandshake, payload),
            Err(error) => tracing::warn!(error = %error, "handshake probe not sent"),
        }
        Some(handle)
    }

    /// Acknowledges probes from the peer with this frame's origin.
    pub fn answer_probes(messenger: &Messenger, local_origin: &str) -> ListenerHandle {
        let responder = messenger.clone();
        let local_origin = local_origin.to_string();
        messenger.add_listener(MessageType::OriginHandshake, move |inbound| {
            let probe: HandshakePayload = inbound.envelope.payload_as()?;
            tracing::debug!(peer = %probe.origin, "answering origin handshake");
            let ack = serde_json::to_value(HandshakePayload {
                origin: local_origin.clone(),
            })?;
            let envelope = Envelope::new(MessageType::OriginHandshakeAck, ack);
            let envelope = match inbound.envelope.id.clone() {
                Some(id) => envelope.with_id(id),
                None => envelope,
            };
            responder.send_to(&envelope, &inbound.origin);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{is_dev_host, OriginCell, OriginHandshake, TrustedOrigin};
    use crate::messaging::envelope::MessageType;
    use crate::messaging::messenger::Messenger;
    use crate::messaging::transport::{ChannelWindow, FrameTransport, RawFrameEvent};
    use tokio::sync::mpsc;
    use tokio::time::Duration;
    use url::Url;

    #[test]
    fn dev_hosts_are_recognized() {
        assert!(is_dev_host("localhost"));
        assert!(is_dev_host("127.0.0.1"));
        assert!(is_dev_host("[::1]"));
        assert!(is_dev_host("192.168.1.20"));
        assert!(!is_dev_host("pmm.example.com"));
        assert!(!is_dev_host("host.docker.internal"));
    }

    #[test]
    fn production_origin_prefers_referrer() {
        let location = Url::parse("https://pmm.example.com/graph/d/abc").expect("url");
        assert_eq!(
            OriginHandshake::resolve(&location, Some("https://shell.example.com/pmm-ui/home")),
            TrustedOrigin::Concrete("https://shell.example.com".to_string())
        );
        assert_eq!(
            OriginHandshake::resolve(&location, Some("")),
            TrustedOrigin::Concrete("https://pmm.example.com".to_string())
        );
        let dev = Url::parse("http://localhost:5173/pmm-ui").expect("url");
        assert_eq!(OriginHandshake::resolve(&dev, None), TrustedOrigin::Wildcard);
    }

    #[test]
    fn cell_only_locks_once() {
        let cell = OriginCell::new(TrustedOrigin::Wildcard);
        assert!(cell.lock_to("http://a:1"));
        assert!(!cell.lock_to("http://b:2"));
        assert_eq!(cell.get().as_target(), "http://a:1");
    }

    #[tokio::test]
    async fn first_ack_locks_and_later_acks_are_ignored() {
        let (host, mut embedded) = ChannelWindow::pair("http://localhost:5173", "http://host.docker.internal:3000");
        let (_sender, inbound) = mpsc::unbounded_channel();
        let messenger = Messenger::new(
            FrameTransport::new(Some(host.peer.clone())),
            OriginCell::new(TrustedOrigin::Wildcard),
            inbound,
            Duration::from_secs(1),
        );

        let handle = OriginHandshake::start(&messenger, "http://localhost:5173");
        assert!(handle.is_some());
        let probe = embedded.inbound.recv().await.expect("probe");
        assert_eq!(probe.data.as_ref().expect("data")["type"], "ORIGIN_HANDSHAKE");

        let ack = |origin: &str| RawFrameEvent {
            origin: origin.to_string(),
            data: Some(serde_json::json!({ "type": "ORIGIN_HANDSHAKE_ACK", "payload": { "origin": origin } })),
        };
        messenger.receive(ack("http://host.docker.internal:3000"));
        messenger.receive(ack("http://evil.example:3000"));

        assert_eq!(
            messenger.origin().get(),
            TrustedOrigin::Concrete("http://host.docker.internal:3000".to_string())
        );
        assert_eq!(messenger.listener_count(), 0);
        assert!(OriginHandshake::start(&messenger, "http://localhost:5173").is_none());

        messenger.send_message(MessageType::NavigateTo, serde_json::json!({ "to": "/graph/d/home" }));
        let sent = embedded.inbound.try_recv().expect("delivered to locked origin");
        assert_eq!(sent.data.as_ref().expect("data")["type"], "NAVIGATE_TO");

        // a window at the rejected origin never sees traffic sharing this cell
        let (evil_host, mut evil) = ChannelWindow::pair("http://localhost:5173", "http://evil.example:3000");
        let (_evil_sender, evil_inbound) = mpsc::unbounded_channel();
        let towards_evil = Messenger::new(
            FrameTransport::new(Some(evil_host.peer.clone())),
            messenger.origin().clone(),
            evil_inbound,
            Duration::from_secs(1),
        );
        towards_evil.send_message(MessageType::NavigateTo, serde_json::json!({ "to": "/graph/d/home" }));
        assert!(evil.inbound.try_recv().is_err());
    }
}
