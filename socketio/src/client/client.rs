use std::{
    collections::BTreeSet,
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use engineio_client::{
    Client as EngineClient, CloseReason, Error as EngineError, Event as EngineEvent, ListenerId,
    Listeners, Subscription,
};
use futures_util::StreamExt;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use super::Namespace;
use crate::{
    callback::{self, Callback, Handlers, Invocation},
    error::Result,
    event::{ErrorArgs, EventArgs, Received},
    json::{split_json_array, unquote},
    packet::{normalize_namespace, DEFAULT_NAMESPACE},
    Error, Event, Packet, PacketType, Payload,
};

/// A socket.io client. It wraps one engine.io [`EngineClient`] session and
/// multiplexes namespaces and named events over it.
///
/// Handlers and listeners run synchronously on the engine's receive task, so
/// a slow handler holds up the packets behind it.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    engine: EngineClient,
    engine_listener: ListenerId,
    default_namespace: Option<String>,
    connect_timeout: Duration,
    handlers: Handlers,
    listeners: Arc<Listeners<Event>>,
    connected: RwLock<BTreeSet<String>>,
    disposed: AtomicBool,
}

impl Client {
    pub(crate) fn new(
        engine: EngineClient,
        default_namespace: Option<String>,
        connect_timeout: Duration,
    ) -> Self {
        let inner = Arc::new_cyclic(|this: &Weak<Inner>| {
            let weak = this.clone();
            let engine_listener = engine.on_event(move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_engine_event(event);
                }
            });

            Inner {
                engine,
                engine_listener,
                default_namespace,
                connect_timeout,
                handlers: Handlers::default(),
                listeners: Arc::new(Listeners::new()),
                connected: RwLock::new(BTreeSet::new()),
                disposed: AtomicBool::new(false),
            }
        });

        Client { inner }
    }

    /// Opens the engine.io session if needed and joins `namespaces` plus the
    /// default namespace. Fails with [`Error::ServerError`] if the server
    /// answers the handshake with an error packet.
    pub async fn connect(
        &self,
        url: Url,
        namespaces: &[&str],
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.ensure_not_disposed()?;

        if !self.inner.engine.is_opened() {
            let mut events = self.subscribe();
            self.inner
                .engine
                .open(url, cancel)
                .await
                .map_err(from_engine_error)?;

            // the server joins the client to `/` by itself
            let outcome = events
                .wait_for(cancel, |event| match event {
                    Event::Connected { .. } => Some(Ok(())),
                    Event::ErrorReceived(args) => Some(Err(server_error(&args))),
                    _ => None,
                })
                .await;
            match outcome {
                Some(result) => result?,
                None => return Err(Error::Cancelled()),
            }
            debug!(sid = ?self.inner.engine.sid(), "socket.io connected");
        }

        let mut requested: Vec<&str> = namespaces.to_vec();
        if let Some(nsp) = &self.inner.default_namespace {
            requested.push(nsp.as_str());
        }
        self.connect_to_namespaces(&requested, cancel).await
    }

    pub async fn connect_with_timeout(
        &self,
        url: Url,
        namespaces: &[&str],
        timeout: Duration,
    ) -> Result<()> {
        let cancel = CancellationToken::new();
        tokio::time::timeout(timeout, self.connect(url, namespaces, &cancel))
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    /// Sends a connect packet for every namespace not joined yet and waits
    /// until the server acknowledged all of them.
    pub async fn connect_to_namespaces(
        &self,
        namespaces: &[&str],
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.ensure_not_disposed()?;
        if !self.inner.engine.is_opened() {
            return Err(Error::IllegalActionBeforeOpen());
        }

        // subscribed first, so an acknowledgement is either seen below or
        // already recorded as connected
        let mut events = self.subscribe();
        let mut pending: Vec<String> = Vec::new();
        for nsp in namespaces.iter().map(|nsp| normalize_namespace(nsp)) {
            if nsp != DEFAULT_NAMESPACE && !pending.contains(&nsp) && !self.is_connected_to(&nsp) {
                pending.push(nsp);
            }
        }
        if pending.is_empty() {
            return Ok(());
        }

        for nsp in &pending {
            self.send_packet(Packet::new(PacketType::Connect, nsp.as_str(), ""))
                .await?;
        }

        let waiting = async {
            while let Some(event) = events.next().await {
                match event {
                    Event::Connected { nsp } => pending.retain(|pending| *pending != nsp),
                    Event::ErrorReceived(args) if pending.contains(&args.nsp) => {
                        return Err(server_error(&args));
                    }
                    _ => (),
                }
                if pending.is_empty() {
                    return Ok(());
                }
            }
            Err(Error::Cancelled())
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled()),
            result = waiting => result,
        }
    }

    pub async fn connect_to_namespace(&self, nsp: &str, cancel: &CancellationToken) -> Result<()> {
        self.connect_to_namespaces(&[nsp], cancel).await
    }

    /// Leaves the default namespace and `/`, then closes the engine.io
    /// session. Disconnecting a closed client is harmless.
    pub async fn disconnect(&self, cancel: &CancellationToken) -> Result<()> {
        self.ensure_not_disposed()?;

        if let Some(nsp) = &self.inner.default_namespace {
            if nsp != DEFAULT_NAMESPACE {
                self.send_if_open(Packet::new(PacketType::Disconnect, nsp.as_str(), ""))
                    .await?;
            }
        }
        self.send_if_open(Packet::new(PacketType::Disconnect, DEFAULT_NAMESPACE, ""))
            .await?;

        self.inner
            .engine
            .close(cancel)
            .await
            .map_err(from_engine_error)?;
        self.inner.connected.write().clear();
        Ok(())
    }

    /// Emits `event` to the default namespace. A text payload is sent as a
    /// quoted string, a json payload as it is.
    pub async fn emit<P: Into<Payload>>(&self, event: &str, payload: P) -> Result<()> {
        self.emit_to(event, payload.into(), None).await
    }

    pub async fn emit_json<T: Serialize>(&self, event: &str, value: &T) -> Result<()> {
        self.emit(event, serde_json::to_value(value)?).await
    }

    /// Sends `message`, a json array of event name and argument, as an event
    /// packet to `nsp` or the default namespace.
    pub async fn send_event(&self, message: &str, nsp: Option<&str>) -> Result<()> {
        let nsp = match nsp {
            Some(nsp) => normalize_namespace(nsp),
            None => self.default_namespace().unwrap_or(DEFAULT_NAMESPACE).to_owned(),
        };
        self.send_packet(Packet::new(PacketType::Event, nsp, message))
            .await
    }

    pub(crate) async fn emit_to(&self, event: &str, payload: Payload, nsp: Option<&str>) -> Result<()> {
        self.send_event(&payload.event_data(event), nsp).await
    }

    /// Registers a handler for `event` on `/` that receives the event's
    /// argument deserialized into `T`. Use `Option<T>` to accept events
    /// without an argument.
    pub fn on<T, F>(&self, event: &str, handler: F) -> &Self
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.register(event, DEFAULT_NAMESPACE, callback::typed(handler))
    }

    /// Like [`Client::on`], also passing the argument's unquoted text.
    pub fn on_with_text<T, F>(&self, event: &str, handler: F) -> &Self
    where
        T: DeserializeOwned,
        F: Fn(T, &str) + Send + Sync + 'static,
    {
        self.register(event, DEFAULT_NAMESPACE, callback::typed_with_text(handler))
    }

    pub fn on_text<F>(&self, event: &str, handler: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.register(event, DEFAULT_NAMESPACE, callback::text(handler))
    }

    pub fn on_signal<F>(&self, event: &str, handler: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register(event, DEFAULT_NAMESPACE, callback::signal(handler))
    }

    pub(crate) fn register(&self, event: &str, nsp: &str, callback: Callback) -> &Self {
        trace!(event, nsp, "registering handler");
        self.inner.handlers.add(event, nsp, callback);
        self
    }

    /// A handle to register handlers and emit events on another namespace.
    pub fn of(&self, nsp: &str) -> Namespace {
        Namespace::new(self.clone(), normalize_namespace(nsp))
    }

    /// Runs `func` and waits for the next event or error packet. Packets
    /// arriving while `func` runs are not missed. Returns `None` when
    /// `cancel` fires first.
    pub async fn wait_event_or_error<F, Fut>(
        &self,
        func: F,
        cancel: &CancellationToken,
    ) -> Result<Option<Received>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.ensure_not_disposed()?;
        let mut events = self.subscribe();
        func().await?;

        Ok(events
            .wait_for(cancel, |event| match event {
                Event::EventReceived(args) => Some(Received::Event(args)),
                Event::ErrorReceived(args) => Some(Received::Error(args)),
                _ => None,
            })
            .await)
    }

    /// Resolves with `true` once `nsp` is joined, `false` when `cancel` fires
    /// first.
    pub async fn wait_for_connected(&self, nsp: &str, cancel: &CancellationToken) -> Result<bool> {
        self.ensure_not_disposed()?;
        let nsp = normalize_namespace(nsp);
        let mut events = self.subscribe();
        if self.is_connected_to(&nsp) {
            return Ok(true);
        }

        Ok(events
            .wait_for(cancel, |event| match event {
                Event::Connected { nsp: connected } if connected == nsp => Some(()),
                _ => None,
            })
            .await
            .is_some())
    }

    pub fn on_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    pub fn subscribe(&self) -> Subscription<Event> {
        self.inner.listeners.subscribe()
    }

    /// The namespaces the server acknowledged, sorted.
    pub fn connected_namespaces(&self) -> Vec<String> {
        self.inner.connected.read().iter().cloned().collect()
    }

    pub fn is_connected_to(&self, nsp: &str) -> bool {
        self.inner
            .connected
            .read()
            .contains(&normalize_namespace(nsp))
    }

    pub fn default_namespace(&self) -> Option<&str> {
        self.inner.default_namespace.as_deref()
    }

    pub fn connect_timeout(&self) -> Duration {
        self.inner.connect_timeout
    }

    /// The underlying engine.io session.
    pub fn engine(&self) -> &EngineClient {
        &self.inner.engine
    }

    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.engine.dispose().await;
        self.inner.connected.write().clear();
        debug!("socket.io client disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    async fn send_packet(&self, packet: Packet) -> Result<()> {
        self.ensure_not_disposed()?;
        trace!(?packet, "sending socket.io packet");
        self.inner.engine.send_message(packet.encode()).await?;
        Ok(())
    }

    async fn send_if_open(&self, packet: Packet) -> Result<()> {
        match self.send_packet(packet).await {
            Err(Error::EngineIo(EngineError::IllegalActionBeforeOpen())) => Ok(()),
            result => result,
        }
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed());
        }
        Ok(())
    }
}

impl Inner {
    fn on_engine_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::MessageReceived(message) => {
                if let Err(err) = self.handle_message(message) {
                    warn!(%err, %message, "dropping socket.io packet");
                    self.listeners.emit(&Event::Error(Arc::new(err)));
                }
            }
            EngineEvent::Closed(reason) => {
                self.connected.write().clear();
                self.listeners.emit(&Event::Disconnected(reason.clone()));
            }
            EngineEvent::Error(err) => self.listeners.emit(&Event::EngineError(err.clone())),
            _ => (),
        }
    }

    fn handle_message(&self, message: &str) -> Result<()> {
        // engine.io control frames carry no socket.io packet
        if message.is_empty() {
            return Ok(());
        }

        let packet = Packet::decode(message)?;
        trace!(?packet, "received socket.io packet");

        match packet.ptype {
            PacketType::Connect => {
                self.connected.write().insert(packet.nsp.clone());
                self.listeners.emit(&Event::Connected { nsp: packet.nsp });
            }
            PacketType::Disconnect => {
                self.connected.write().remove(&packet.nsp);
                self.listeners.emit(&Event::Disconnected(CloseReason::new(
                    "Received disconnect message from server",
                )));
            }
            PacketType::Event => self.handle_event(packet),
            PacketType::Error => {
                let args = ErrorArgs {
                    value: packet.data.trim_matches('"').to_owned(),
                    nsp: packet.nsp,
                };
                self.listeners.emit(&Event::ErrorReceived(args));
            }
        }
        Ok(())
    }

    /// Dispatches an event packet to its handlers. The packet is reported
    /// as received even when its data is not an event array.
    fn handle_event(&self, packet: Packet) {
        let is_handled = match self.dispatch(&packet) {
            Ok(is_handled) => is_handled,
            Err(err) => {
                warn!(%err, data = %packet.data, "malformed event packet");
                self.listeners.emit(&Event::Error(Arc::new(err)));
                false
            }
        };

        let args = EventArgs {
            value: packet.data,
            nsp: packet.nsp,
            is_handled,
        };
        self.listeners.emit(&Event::EventReceived(args.clone()));
        if args.is_handled {
            self.listeners.emit(&Event::HandledEventReceived(args));
        } else {
            self.listeners.emit(&Event::UnhandledEventReceived(args));
        }
    }

    fn dispatch(&self, packet: &Packet) -> Result<bool> {
        let elements = split_json_array(&packet.data)?;
        let (event, raw) = match elements.as_slice() {
            [] => return Err(Error::InvalidJsonArray(packet.data.clone())),
            [name] => (unquote(name), None),
            [name, raw, ..] => (unquote(name), Some(*raw)),
        };

        let dispatch = self
            .handlers
            .dispatch(&packet.nsp, &Invocation { event, raw });
        for err in dispatch.errors {
            warn!(%err, event, "event handler failed");
            self.listeners.emit(&Event::Error(Arc::new(err)));
        }
        Ok(dispatch.is_handled)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.engine.remove_listener(self.engine_listener);
    }
}

/// Keeps cancellation and disposal distinguishable from transport failures.
fn from_engine_error(err: EngineError) -> Error {
    match err {
        EngineError::Cancelled() => Error::Cancelled(),
        EngineError::Disposed() => Error::Disposed(),
        err => Error::EngineIo(err),
    }
}

fn server_error(args: &ErrorArgs) -> Error {
    Error::ServerError(format!("Socket.IO returns error: {}", args.value))
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("engine", &self.inner.engine)
            .field("default_namespace", &self.inner.default_namespace)
            .field("connected", &*self.inner.connected.read())
            .field("handlers", &self.inner.handlers)
            .finish()
    }
}
