use crate::messaging::envelope::{LocationChangePayload, MessageType, NavigatePayload};
use crate::messaging::{ListenerHandle, Messenger};
use crate::models::{Location, NavigationAction};
use crate::sync::dom::History;
use std::sync::{Arc, Mutex, PoisonError};

/// Mirrors address-bar changes between frames. Remote locations are applied
/// with `replace` so the back stack does not grow.
pub struct LocationSync {
    messenger: Messenger,
    last_applied: Arc<Mutex<Option<Location>>>,
    handles: Mutex<Vec<ListenerHandle>>,
}

impl LocationSync {
    pub fn new(messenger: Messenger, history: Arc<dyn History>) -> Self {
        let last_applied = Arc::new(Mutex::new(None));

        let change_handle = {
            let history = history.clone();
            let last_applied = last_applied.clone();
            messenger.add_listener(MessageType::LocationChange, move |inbound| {
                let payload: LocationChangePayload = inbound.envelope.payload_as()?;
                if history.current() == payload.location {
                    return Ok(());
                }
                history.replace(&payload.location);
                *last_applied.lock().unwrap_or_else(PoisonError::into_inner) = Some(payload.location);
                Ok(())
            })
        };

        // pushed locations are reported back like any local navigation
        let navigate_handle = messenger.add_listener(MessageType::NavigateTo, move |inbound| {
            let payload: NavigatePayload = inbound.envelope.payload_as()?;
            tracing::debug!(to = %payload.to, "navigating on peer request");
            history.push(&Location::parse(&payload.to));
            Ok(())
        });

        Self {
            messenger,
            last_applied,
            handles: Mutex::new(vec![change_handle, navigate_handle]),
        }
    }

    /// Forwards a local history change. Returns `false` when the change is
    /// the local echo of a location the peer just sent.
    pub fn on_local_change(&self, location: &Location, action: NavigationAction) -> bool {
        {
            let mut last_applied = self.last_applied.lock().unwrap_or_else(PoisonError::into_inner);
            if last_applied.as_ref() == Some(location) {
                *last_applied = None;
                return false;
            }
        }

        let payload = LocationChangePayload {
            location: location.clone(),
            action,
        };
        match serde_json::to_value(payload) {
            Ok(payload) => {
                self.messenger.send_message(MessageType::LocationChange, payload);
                true
            }
            Err(error) => {
                tracing::warn!(error = %error, "location change not forwarded");
                false
            }
        }
    }

    /// Asks the peer frame to navigate.
    pub fn navigate_remote(&self, to: &str) {
        match serde_json::to_value(NavigatePayload { to: to.to_string() }) {
            Ok(payload) => self.messenger.send_message(MessageType::NavigateTo, payload),
            Err(error) => tracing::warn!(error = %error, "navigate request not sent"),
        }
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
    use super::LocationSync;
    use crate::messaging::{ChannelWindow, FrameTransport, Messenger, OriginCell, RawFrameEvent, TrustedOrigin};
    use crate::models::{Location, NavigationAction};
    use crate::sync::dom::{History, HistoryEntryKind, MemoryHistory};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio::time::Duration;

    const PEER: &str = "http://localhost:3000";

    fn setup() -> (LocationSync, Messenger, Arc<MemoryHistory>, mpsc::UnboundedReceiver<RawFrameEvent>) {
        let (local, peer) = ChannelWindow::pair("http://localhost:80", PEER);
        let (_sender, inbound) = mpsc::unbounded_channel();
        let messenger = Messenger::new(
            FrameTransport::new(Some(local.peer.clone())),
            OriginCell::new(TrustedOrigin::Wildcard),
            inbound,
            Duration::from_secs(1),
        );
        let history = Arc::new(MemoryHistory::new(Location::new("/graph/d/home")));
        let sync = LocationSync::new(messenger.clone(), history.clone());
        (sync, messenger, history, peer.inbound)
    }

    fn location_event(pathname: &str) -> RawFrameEvent {
        RawFrameEvent {
            origin: PEER.to_string(),
            data: Some(serde_json::json!({
                "type": "LOCATION_CHANGE",
                "payload": {
                    "location": { "pathname": pathname, "search": "?orgId=1", "hash": "" },
                    "action": "PUSH"
                }
            })),
        }
    }

    #[test]
    fn local_changes_are_forwarded_with_action() {
        let (sync, _messenger, _history, mut peer) = setup();
        let location = Location::parse("/graph/d/mysql-instance-summary?var-node=db1");
        assert!(sync.on_local_change(&location, NavigationAction::Push));

        let sent = peer.try_recv().expect("forwarded");
        let data = sent.data.expect("data");
        assert_eq!(data["type"], "LOCATION_CHANGE");
        assert_eq!(data["payload"]["action"], "PUSH");
        assert_eq!(data["payload"]["location"]["search"], "?var-node=db1");
    }

    #[test]
    fn remote_change_replaces_and_is_not_echoed() {
        let (sync, messenger, history, mut peer) = setup();
        messenger.receive(location_event("/graph/d/node-summary"));

        assert_eq!(history.len(), 1);
        assert_eq!(history.current().pathname, "/graph/d/node-summary");
        assert_eq!(history.operations()[0].0, HistoryEntryKind::Replace);

        let echoed = history.current();
        assert!(!sync.on_local_change(&echoed, NavigationAction::Replace));
        assert!(peer.try_recv().is_err());

        // a later genuine navigation to the same place is forwarded again
        assert!(sync.on_local_change(&echoed, NavigationAction::Push));
        assert!(peer.try_recv().is_ok());
    }

    #[test]
    fn remote_change_to_current_location_is_ignored() {
        let (_sync, messenger, history, _peer) = setup();
        let mut event = location_event("/graph/d/home");
        if let Some(data) = event.data.as_mut() {
            data["payload"]["location"]["search"] = serde_json::json!("");
        }
        messenger.receive(event);
        assert!(history.operations().is_empty());
    }

    #[test]
    fn navigate_requests_push_onto_history() {
        let (sync, messenger, history, mut peer) = setup();
        messenger.receive(RawFrameEvent {
            origin: PEER.to_string(),
            data: Some(serde_json::json!({ "type": "NAVIGATE_TO", "payload": { "to": "/inventory/services" } })),
        });
        assert_eq!(history.len(), 2);
        assert_eq!(history.current().pathname, "/inventory/services");

        sync.navigate_remote("/graph/d/pmm-home");
        let data = peer.try_recv().expect("sent").data.expect("data");
        assert_eq!(data["payload"]["to"], "/graph/d/pmm-home");

        sync.teardown();
        assert_eq!(messenger.listener_count(), 0);
    }

    #[test]
    fn navigation_requested_by_peer_is_reported_back() {
        let (sync, messenger, history, mut peer) = setup();
        messenger.receive(RawFrameEvent {
            origin: PEER.to_string(),
            data: Some(serde_json::json!({ "type": "NAVIGATE_TO", "payload": { "to": "/graph/d/mysql-summary?orgId=1#top" } })),
        });
        assert_eq!(history.operations()[0].0, HistoryEntryKind::Push);

        assert!(sync.on_local_change(&history.current(), NavigationAction::Push));
        let data = peer.try_recv().expect("forwarded").data.expect("data");
        assert_eq!(data["type"], "LOCATION_CHANGE");
        assert_eq!(data["payload"]["action"], "PUSH");
        assert_eq!(data["payload"]["location"]["pathname"], "/graph/d/mysql-summary");
        assert_eq!(data["payload"]["location"]["search"], "?orgId=1");
        assert_eq!(data["payload"]["location"]["hash"], "#top");
    }
}
