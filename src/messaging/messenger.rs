use crate::errors::{AppError, AppResult};
use crate::messaging::envelope::{Envelope, MessageType};
use crate::messaging::origin::OriginCell;
use crate::messaging::transport::{FrameTransport, RawFrameEvent};
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use uuid::Uuid;

/// A recognized message together with the origin it arrived from.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub origin: String,
    pub envelope: Envelope,
}

pub type ListenerFn = Arc<dyn Fn(&Inbound) -> AppResult<()> + Send + Sync>;

struct Registration {
    r#type: MessageType,
    callback: ListenerFn,
}

struct PendingRequest {
    result_type: MessageType,
    responder: oneshot::Sender<AppResult<serde_json::Value>>,
}

struct Pump {
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

struct Inner {
    transport: FrameTransport,
    origin: OriginCell,
    listeners: Mutex<BTreeMap<u64, Registration>>,
    next_listener_id: AtomicU64,
    pending: Mutex<HashMap<String, PendingRequest>>,
    inbound: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<RawFrameEvent>>>,
    pump: Mutex<Option<Pump>>,
    peer_ready: AtomicBool,
    request_timeout: Duration,
}

/// Listener bookkeeping, dispatch and request/response correlation for one
/// side of a frame pair. Cloning shares the same registry.
#[derive(Clone)]
pub struct Messenger {
    inner: Arc<Inner>,
}

/// Removes a single listener registration.
#[must_use = "dropping the handle keeps the listener registered"]
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    id: u64,
    inner: Weak<Inner>,
}

impl ListenerHandle {
    pub fn dispose(self) -> bool {
        match self.inner.upgrade() {
            Some(inner) => lock(&inner.listeners).remove(&self.id).is_some(),
            None => false,
        }
    }
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("origin", &self.origin.get())
            .field("listeners", &lock(&self.listeners).len())
            .field("pending", &lock(&self.pending).len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Messenger {
    pub fn new(
        transport: FrameTransport,
        origin: OriginCell,
        inbound: mpsc::UnboundedReceiver<RawFrameEvent>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                origin,
                listeners: Mutex::new(BTreeMap::new()),
                next_listener_id: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
                inbound: Arc::new(tokio::sync::Mutex::new(inbound)),
                pump: Mutex::new(None),
                peer_ready: AtomicBool::new(false),
                request_timeout,
            }),
        }
    }

    pub fn origin(&self) -> &OriginCell {
        &self.inner.origin
    }

    pub fn is_registered(&self) -> bool {
        lock(&self.inner.pump).is_some()
    }

    pub fn is_peer_ready(&self) -> bool {
        self.inner.peer_ready.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    pub fn add_listener<F>(&self, r#type: MessageType, on_message: F) -> ListenerHandle
    where
        F: Fn(&Inbound) -> AppResult<()> + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.listeners).insert(
            id,
            Registration {
                r#type,
                callback: Arc::new(on_message),
            },
        );
        ListenerHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Starts pumping inbound events and announces readiness to the peer.
    /// Returns `false` when already registered.
    pub fn register(&self) -> bool {
        {
            let mut pump = lock(&self.inner.pump);
            if pump.is_some() {
                return false;
            }

            let stop = Arc::new(Notify::new());
            let task_stop = stop.clone();
            let inbound = self.inner.inbound.clone();
            let weak = Arc::downgrade(&self.inner);
            let task = tokio::spawn(async move {
                let mut inbound = inbound.lock().await;
                loop {
                    tokio::select! {
                        _ = task_stop.notified() => break,
                        event = inbound.recv() => {
                            let Some(event) = event else { break };
                            let Some(inner) = weak.upgrade() else { break };
                            Messenger { inner }.receive(event);
                        }
                    }
                }
            });
            *pump = Some(Pump { stop, task });
        }

        tracing::debug!("messenger registered");
        self.send_message(MessageType::MessengerReady, serde_json::Value::Null);
        true
    }

    /// Detaches the inbound pump, drops every listener and fails every
    /// pending request.
    pub fn unregister(&self) {
        if let Some(pump) = lock(&self.inner.pump).take() {
            pump.stop.notify_one();
            drop(pump.task);
        }
        lock(&self.inner.listeners).clear();
        let pending = std::mem::take(&mut *lock(&self.inner.pending));
        for (id, request) in pending {
            let _ = request.responder.send(Err(AppError::Transport(format!(
                "messenger unregistered before reply to {}",
                id
            ))));
        }
        self.inner.peer_ready.store(false, Ordering::SeqCst);
        tracing::debug!("messenger unregistered");
    }

    pub fn send(&self, envelope: &Envelope) {
        let target = self.inner.origin.get();
        self.inner.transport.send(envelope, target.as_target());
    }

    /// Posts to an explicit origin, bypassing the trusted-origin cell.
    pub fn send_to(&self, envelope: &Envelope, target_origin: &str) {
        self.inner.transport.send(envelope, target_origin);
    }

    pub fn send_message(&self, r#type: MessageType, payload: serde_json::Value) {
        self.send(&Envelope::new(r#type, payload));
    }

    pub async fn send_message_with_result(
        &self,
        r#type: MessageType,
        payload: serde_json::Value,
    ) -> AppResult<serde_json::Value> {
        self.send_message_with_result_within(r#type, payload, self.inner.request_timeout)
            .await
    }

    /// Sends a correlated request and waits for the paired result type with
    /// the same id. Exactly one outcome is produced; the pending entry is
    /// gone on every return path.
    pub async fn send_message_with_result_within(
        &self,
        r#type: MessageType,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> AppResult<serde_json::Value> {
        let result_type = r#type.result_type().ok_or_else(|| {
            AppError::Protocol(format!("{} has no paired result type", r#type))
        })?;
        let id = Uuid::new_v4().to_string();
        let (responder, receiver) = oneshot::channel();
        lock(&self.inner.pending).insert(
            id.clone(),
            PendingRequest {
                result_type,
                responder,
            },
        );

        self.send(&Envelope::new(r#type, payload).with_id(id.clone()));

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                lock(&self.inner.pending).remove(&id);
                Err(AppError::Transport(format!("request {} was abandoned", id)))
            }
            Err(_) => {
                lock(&self.inner.pending).remove(&id);
                tracing::debug!(message_type = %r#type, id = %id, "request timed out");
                Err(AppError::Timeout(format!(
                    "no {} for {} within {} ms",
                    result_type,
                    id,
                    timeout.as_millis()
                )))
            }
        }
    }

    /// Answers a correlated request, targeting the origin it came from.
    pub fn reply(&self, request: &Inbound, payload: serde_json::Value) -> AppResult<()> {
        let result_type = request.envelope.r#type.result_type().ok_or_else(|| {
            AppError::Protocol(format!("{} cannot be replied to", request.envelope.r#type))
        })?;
        let id = request.envelope.id.clone().ok_or_else(|| {
            AppError::Protocol(format!("{} request carries no id", request.envelope.r#type))
        })?;
        self.send_to(&Envelope::new(result_type, payload).with_id(id), &request.origin);
        Ok(())
    }

    /// Handles one raw inbound event: origin filter, correlation, dispatch.
    pub fn receive(&self, event: RawFrameEvent) {
        let Some(envelope) = FrameTransport::receive(&event) else {
            return;
        };
        if !self.inner.origin.get().permits(&event.origin) {
            tracing::debug!(
                origin = %event.origin,
                message_type = %envelope.r#type,
                "message from untrusted origin dropped"
            );
            return;
        }
        if matches!(
            envelope.r#type,
            MessageType::MessengerReady | MessageType::GrafanaReady
        ) {
            self.inner.peer_ready.store(true, Ordering::SeqCst);
        }

        if let Some(id) = envelope.id.as_deref() {
            self.resolve_pending(id, &envelope);
        }

        self.dispatch(&Inbound {
            origin: event.origin,
            envelope,
        });
    }

    fn resolve_pending(&self, id: &str, envelope: &Envelope) {
        let request = {
            let mut pending = lock(&self.inner.pending);
            match pending.get(id) {
                Some(request) if request.result_type == envelope.r#type => pending.remove(id),
                _ => None,
            }
        };
        if let Some(request) = request {
            let _ = request.responder.send(Ok(envelope.payload.clone()));
        }
    }

    fn dispatch(&self, inbound: &Inbound) {
        let matching = lock(&self.inner.listeners)
            .iter()
            .filter(|(_, registration)| registration.r#type == inbound.envelope.r#type)
            .map(|(id, registration)| (*id, registration.callback.clone()))
            .collect::<Vec<_>>();

        for (id, callback) in matching {
            if !lock(&self.inner.listeners).contains_key(&id) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| callback(inbound))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::warn!(
                        listener_id = id,
                        message_type = %inbound.envelope.r#type,
                        error = %error,
                        "listener failed"
                    );
                }
                Err(_) => {
                    tracing::error!(
                        listener_id = id,
                        message_type = %inbound.envelope.r#type,
                        "listener panicked"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for Messenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}
