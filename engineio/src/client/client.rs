use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::{
    error::Result,
    event::{CloseReason, Event},
    handshake::to_websocket_url,
    heartbeat::Heartbeat,
    listeners::{ListenerId, Listeners, Subscription},
    packet::HandshakePacket,
    transports::{Data, Transport, TransportEvent},
    Error, Packet, PacketType,
};

const PING_DATA: &str = "ping";

/// An engine.io client session over a [`Transport`].
///
/// Inbound frames are decoded on the transport's receive task and reported
/// as [`Event`]s; listeners run synchronously on that task. While opened, a
/// heartbeat pings the server every `pingInterval` and reconnects the
/// transport if it dropped.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    framework: String,
    default_ping_interval: Duration,
    transport: Arc<dyn Transport>,
    transport_listener: ListenerId,
    listeners: Arc<Listeners<Event>>,
    state: RwLock<State>,
    heartbeat: Mutex<Option<Heartbeat>>,
    disposed: AtomicBool,
    this: Weak<Inner>,
}

#[derive(Default)]
struct State {
    opened: bool,
    handshake: Option<HandshakePacket>,
    url: Option<Url>,
}

impl Client {
    pub(crate) fn new(
        framework: String,
        default_ping_interval: Duration,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let inner = Arc::new_cyclic(|this: &Weak<Inner>| {
            let weak = this.clone();
            let transport_listener = transport.listeners().add(move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_transport_event(event);
                }
            });

            Inner {
                framework,
                default_ping_interval,
                transport,
                transport_listener,
                listeners: Arc::new(Listeners::new()),
                state: RwLock::new(State::default()),
                heartbeat: Mutex::new(None),
                disposed: AtomicBool::new(false),
                this: this.clone(),
            }
        });

        Client { inner }
    }

    /// Connects to `url` and waits for the server's handshake. Returns the
    /// current handshake right away if the session is already open.
    pub async fn open(&self, url: Url, cancel: &CancellationToken) -> Result<HandshakePacket> {
        self.ensure_not_disposed()?;

        let mut events = self.subscribe();
        if self.inner.transport.is_connected() {
            if let Some(handshake) = self.handshake() {
                return Ok(handshake);
            }
        }

        let address = to_websocket_url(&url, &self.inner.framework)?;
        self.inner.state.write().url = Some(url);

        let opening = async {
            self.inner.transport.connect(&address).await?;
            events
                .next_matching(|event| match event {
                    Event::Opened(handshake) => Some(Ok(handshake)),
                    Event::Closed(reason) => Some(Err(Error::ConnectionClosed(reason.reason))),
                    _ => None,
                })
                .await
                .unwrap_or_else(|| Err(Error::ConnectionClosed("no handshake".to_owned())))
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled()),
            result = opening => result,
        }
    }

    pub async fn open_with_timeout(&self, url: Url, timeout: Duration) -> Result<HandshakePacket> {
        let cancel = CancellationToken::new();
        tokio::time::timeout(timeout, self.open(url, &cancel))
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    /// Stops the heartbeat, sends a close packet and disconnects the
    /// transport. Closing an already closed client is harmless.
    pub async fn close(&self, cancel: &CancellationToken) -> Result<()> {
        self.ensure_not_disposed()?;

        let heartbeat = self.inner.heartbeat.lock().take();
        if let Some(heartbeat) = heartbeat {
            heartbeat.stop().await;
        }

        let closing = async {
            match self.send(Packet::empty(PacketType::Close)).await {
                Ok(()) | Err(Error::IllegalActionBeforeOpen()) => (),
                Err(err) => warn!(%err, "failed to send close packet"),
            }
            self.inner.transport.disconnect().await
        };
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled()),
            result = closing => result,
        };

        self.inner.state.write().opened = false;
        result
    }

    pub async fn send_message<T: Into<String>>(&self, message: T) -> Result<()> {
        self.ensure_not_disposed()?;
        self.send(Packet::new(PacketType::Message, message)).await
    }

    pub async fn send(&self, packet: Packet) -> Result<()> {
        self.ensure_not_disposed()?;
        trace!(ptype = ?packet.ptype, data = %packet.data, "sending packet");
        self.inner.transport.emit(Data::Text(packet.encode())).await
    }

    /// Stops the heartbeat and the transport. Every later call fails with
    /// [`Error::Disposed`]; disposing again does nothing.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let heartbeat = self.inner.heartbeat.lock().take();
        if let Some(heartbeat) = heartbeat {
            heartbeat.stop().await;
        }
        self.inner.transport.dispose().await;
        self.inner.state.write().opened = false;
        debug!("engine.io client disposed");
    }

    pub fn is_opened(&self) -> bool {
        self.inner.state.read().opened
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub fn handshake(&self) -> Option<HandshakePacket> {
        self.inner.state.read().handshake.clone()
    }

    pub fn sid(&self) -> Option<String> {
        self.inner
            .state
            .read()
            .handshake
            .as_ref()
            .map(|handshake| handshake.sid.clone())
    }

    /// The url passed to the last [`Client::open`].
    pub fn url(&self) -> Option<Url> {
        self.inner.state.read().url.clone()
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

    /// Resolves with the handshake once the session is open, or `None` when
    /// `cancel` fires first.
    pub async fn wait_for_opened(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<HandshakePacket>> {
        self.ensure_not_disposed()?;
        let mut events = self.subscribe();
        if self.is_opened() {
            if let Some(handshake) = self.handshake() {
                return Ok(Some(handshake));
            }
        }

        Ok(events
            .wait_for(cancel, |event| match event {
                Event::Opened(handshake) => Some(handshake),
                _ => None,
            })
            .await)
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed());
        }
        Ok(())
    }
}

impl Inner {
    fn on_transport_event(&self, event: &TransportEvent) {
        match event {
            TransportEvent::Connected => debug!("transport connected"),
            TransportEvent::Text(text) => {
                if let Err(err) = self.handle_frame(text) {
                    warn!(%err, frame = %text, "dropping engine.io frame");
                    self.listeners.emit(&Event::Error(Arc::new(err)));
                }
            }
            TransportEvent::Binary(data) => {
                trace!(len = data.len(), "ignoring binary frame");
            }
            TransportEvent::Disconnected(reason) => {
                self.state.write().opened = false;
                self.listeners.emit(&Event::Closed(reason.clone()));
            }
            TransportEvent::Error(err) => self.listeners.emit(&Event::Error(err.clone())),
        }
    }

    fn handle_frame(&self, text: &str) -> Result<()> {
        let packet = Packet::decode(text)?;
        trace!(ptype = ?packet.ptype, data = %packet.data, "received packet");

        let event = match packet.ptype {
            PacketType::Open => {
                let handshake = HandshakePacket::try_from(&packet)?;
                {
                    let mut state = self.state.write();
                    state.opened = true;
                    state.handshake = Some(handshake.clone());
                }

                let period = handshake
                    .ping_interval()
                    .unwrap_or(self.default_ping_interval);
                self.start_heartbeat(period);
                debug!(sid = %handshake.sid, ?period, "engine.io session opened");

                Event::Opened(handshake)
            }
            PacketType::Close => {
                self.state.write().opened = false;
                Event::Closed(CloseReason::new("Received close message from server"))
            }
            PacketType::Ping => Event::PingReceived(packet.data),
            PacketType::Pong => Event::PongReceived(packet.data),
            PacketType::Message => Event::MessageReceived(packet.data),
            PacketType::Upgrade => Event::Upgraded(packet.data),
            PacketType::Noop => Event::NoopReceived(packet.data),
        };

        self.listeners.emit(&event);
        Ok(())
    }

    fn start_heartbeat(&self, period: Duration) {
        let this = self.this.clone();
        let heartbeat = Heartbeat::start(period, move || this.upgrade().map(Inner::heartbeat_tick));
        // the replaced heartbeat cancels itself on drop
        self.heartbeat.lock().replace(heartbeat);
    }

    async fn heartbeat_tick(self: Arc<Self>) {
        match self.ping().await {
            Ok(()) => self.listeners.emit(&Event::PingSent(PING_DATA.to_owned())),
            Err(Error::Cancelled()) => trace!("heartbeat cancelled"),
            Err(err) => {
                warn!(%err, "heartbeat failed");
                self.listeners.emit(&Event::Error(Arc::new(err)));
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        if !self.transport.is_connected() {
            if let Some(url) = self.transport.last_url() {
                debug!(%url, "transport is disconnected, reconnecting");
                self.transport.connect(&url).await?;
            }
        }

        let packet = Packet::new(PacketType::Ping, PING_DATA);
        self.transport.emit(Data::Text(packet.encode())).await
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.transport.listeners().remove(self.transport_listener);
        self.transport.shutdown();
        self.heartbeat.get_mut().take();
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Client")
            .field("framework", &self.inner.framework)
            .field("opened", &state.opened)
            .field("handshake", &state.handshake)
            .field("url", &state.url)
            .field("transport", &self.inner.transport)
            .finish()
    }
}
