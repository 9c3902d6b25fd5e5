use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use http::HeaderMap;
use parking_lot::RwLock;
use tokio::{net::TcpStream, sync::Mutex, task::JoinHandle};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use tungstenite::{
    client::IntoClientRequest,
    protocol::{frame::coding::CloseCode, CloseFrame},
    Message,
};
use url::Url;

use crate::{
    error::Result,
    event::CloseReason,
    listeners::Listeners,
    transports::{Data, Transport, TransportEvent},
    Error,
};

type WebsocketSender = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WebsocketReceiver = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// How long `disconnect` waits for the server to answer our close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// A [`Transport`] over a single websocket connection, with one receive task
/// per connection. A failed receive reconnects once to the last url.
#[derive(Clone, Debug)]
pub struct WebsocketTransport {
    inner: Arc<Inner>,
}

struct Inner {
    headers: Option<HeaderMap>,
    sender: Mutex<Option<WebsocketSender>>,
    // held across the whole connect, so the heartbeat and the receive task
    // never open two sockets at once
    connect_lock: Mutex<()>,
    connected: AtomicBool,
    // bumped for every established socket, only changed under `sender`
    generation: AtomicU64,
    last_url: RwLock<Option<Url>>,
    receive_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    listeners: Arc<Listeners<TransportEvent>>,
}

impl WebsocketTransport {
    pub fn new(headers: Option<HeaderMap>) -> Self {
        WebsocketTransport {
            inner: Arc::new(Inner {
                headers,
                sender: Mutex::new(None),
                connect_lock: Mutex::new(()),
                connected: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                last_url: RwLock::new(None),
                receive_task: parking_lot::Mutex::new(None),
                cancel: CancellationToken::new(),
                listeners: Arc::new(Listeners::new()),
            }),
        }
    }
}

impl Default for WebsocketTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Inner {
    /// Opens a socket and installs its sink. Returns the receiving half and
    /// the generation of the new connection.
    async fn establish(&self, url: &Url) -> Result<(WebsocketReceiver, u64)> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled());
        }

        let mut req = url.as_str().into_client_request()?;
        if let Some(map) = &self.headers {
            req.headers_mut().extend(map.clone());
        }

        debug!(%url, "connecting websocket");
        let (stream, _) = connect_async(req).await?;
        let (sender, receiver) = stream.split();

        let generation = {
            let mut slot = self.sender.lock().await;
            *slot = Some(sender);
            self.connected.store(true, Ordering::SeqCst);
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.listeners.emit(&TransportEvent::Connected);

        Ok((receiver, generation))
    }

    /// Marks the connection of `generation` as gone. Returns `false` and
    /// leaves the state alone if a newer connection replaced it.
    async fn release(&self, generation: u64) -> bool {
        let mut slot = self.sender.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        self.connected.store(false, Ordering::SeqCst);
        slot.take();
        true
    }

    /// Returns `None` if another task restored the connection meanwhile, in
    /// which case the caller's receiver is stale.
    async fn reconnect(&self) -> Result<Option<(WebsocketReceiver, u64)>> {
        let _guard = self.connect_lock.lock().await;
        if self.connected.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let url = self
            .last_url
            .read()
            .clone()
            .ok_or(Error::IllegalActionBeforeOpen())?;
        self.establish(&url).await.map(Some)
    }

    async fn receive_loop(self: Arc<Self>, mut receiver: WebsocketReceiver, mut generation: u64) {
        let mut reason = CloseReason::new("Connection closed");

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => {
                    reason = CloseReason::new("Transport disposed");
                    break;
                }
                next = receiver.next() => next,
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    trace!(%text, "received text frame");
                    self.listeners.emit(&TransportEvent::Text(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    trace!(len = data.len(), "received binary frame");
                    self.listeners.emit(&TransportEvent::Binary(Bytes::from(data)));
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        reason = CloseReason::from(frame);
                    }
                    break;
                }
                // ping and pong frames are answered by tungstenite
                Some(Ok(_)) => (),
                Some(Err(err)) => {
                    warn!(%err, "websocket receive failed, reconnecting");
                    if !self.release(generation).await {
                        return;
                    }
                    self.listeners
                        .emit(&TransportEvent::Error(Arc::new(Error::from(err))));

                    match self.reconnect().await {
                        Ok(Some(next)) => (receiver, generation) = next,
                        Ok(None) => return,
                        Err(err) => {
                            warn!(%err, "websocket reconnect failed");
                            self.listeners.emit(&TransportEvent::Error(Arc::new(err)));
                            reason = CloseReason::new("Reconnect failed");
                            break;
                        }
                    }
                }
                None => break,
            }
        }

        if !self.release(generation).await {
            trace!(generation, "stale receive loop stopped");
            return;
        }
        debug!(reason = %reason.reason, code = ?reason.code, "websocket disconnected");
        self.listeners.emit(&TransportEvent::Disconnected(reason));
    }
}

#[async_trait]
impl Transport for WebsocketTransport {
    async fn connect(&self, url: &Url) -> Result<()> {
        let _guard = self.inner.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        *self.inner.last_url.write() = Some(url.clone());
        let (receiver, generation) = self.inner.establish(url).await?;

        let handle = tokio::spawn(self.inner.clone().receive_loop(receiver, generation));
        if let Some(stale) = self.inner.receive_task.lock().replace(handle) {
            stale.abort();
        }

        Ok(())
    }

    async fn emit(&self, data: Data) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::IllegalActionBeforeOpen());
        }

        let mut sender = self.inner.sender.lock().await;
        let sender = sender.as_mut().ok_or(Error::IllegalActionBeforeOpen())?;
        trace!(?data, "sending frame");
        sender.send(Message::from(data)).await?;

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }

        if let Some(sender) = self.inner.sender.lock().await.as_mut() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "Closed by client".into(),
            };
            if let Err(err) = sender.send(Message::Close(Some(frame))).await {
                warn!(%err, "failed to send close frame");
            }
        }

        let handle = self.inner.receive_task.lock().take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await.is_err() {
                warn!("server did not answer the close frame, dropping the connection");
                handle.abort();
                self.inner.connected.store(false, Ordering::SeqCst);
                self.inner.sender.lock().await.take();
                self.inner
                    .listeners
                    .emit(&TransportEvent::Disconnected(CloseReason::new(
                        "Closed by client",
                    )));
            }
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn last_url(&self) -> Option<Url> {
        self.inner.last_url.read().clone()
    }

    fn listeners(&self) -> Arc<Listeners<TransportEvent>> {
        self.inner.listeners.clone()
    }

    async fn dispose(&self) {
        self.inner.cancel.cancel();

        let handle = self.inner.receive_task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        if let Some(mut sender) = self.inner.sender.lock().await.take() {
            let _ = sender.close().await;
        }
        self.inner.connected.store(false, Ordering::SeqCst);
    }

    fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebsocketTransport")
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .field("last_url", &*self.last_url.read())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::MockServer;

    #[tokio::test]
    async fn test_connect_emit_disconnect() -> Result<()> {
        let mut server = MockServer::start().await;
        let transport = WebsocketTransport::default();
        let mut events = transport.listeners().subscribe();

        assert!(matches!(
            transport.emit(Data::Text("4hello".to_owned())).await,
            Err(Error::IllegalActionBeforeOpen())
        ));

        transport.connect(&server.url()).await?;
        assert!(transport.is_connected());
        assert_eq!(transport.last_url(), Some(server.url()));
        assert!(matches!(events.recv().await, Some(TransportEvent::Connected)));

        // connecting twice is a no-op
        transport.connect(&server.url()).await?;

        server.send("4from server");
        let received = events
            .next_matching(|event| match event {
                TransportEvent::Text(text) => Some(text),
                _ => None,
            })
            .await;
        assert_eq!(received.as_deref(), Some("4from server"));

        transport.emit(Data::Text("4from client".to_owned())).await?;
        assert_eq!(server.recv().await.as_deref(), Some("4from client"));

        transport.disconnect().await?;
        assert!(!transport.is_connected());
        let reason = events
            .next_matching(|event| match event {
                TransportEvent::Disconnected(reason) => Some(reason),
                _ => None,
            })
            .await;
        assert!(reason.is_some());

        // disconnecting twice is a no-op
        transport.disconnect().await?;
        transport.dispose().await;
        transport.dispose().await;
        assert!(matches!(
            transport.connect(&server.url()).await,
            Err(Error::Cancelled())
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_server_close_reports_reason() -> Result<()> {
        let server = MockServer::start().await;
        let transport = WebsocketTransport::default();
        let mut events = transport.listeners().subscribe();

        transport.connect(&server.url()).await?;
        server.close();

        let reason = events
            .next_matching(|event| match event {
                TransportEvent::Disconnected(reason) => Some(reason),
                _ => None,
            })
            .await;
        assert_eq!(reason.and_then(|reason| reason.code), Some(1000));
        assert!(!transport.is_connected());
        Ok(())
    }

    #[tokio::test]
    async fn test_reconnects_after_receive_failure() -> Result<()> {
        let mut server = MockServer::start().await;
        let transport = WebsocketTransport::default();
        let mut events = transport.listeners().subscribe();

        transport.connect(&server.url()).await?;
        assert!(server.request_uri().await.is_some());
        assert!(matches!(events.recv().await, Some(TransportEvent::Connected)));

        server.abort();
        assert!(matches!(events.recv().await, Some(TransportEvent::Error(_))));
        assert!(matches!(events.recv().await, Some(TransportEvent::Connected)));
        assert_eq!(server.request_uri().await.as_deref(), Some("/"));
        assert!(transport.is_connected());

        // the new connection keeps receiving and sending
        server.send("4after reconnect");
        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Text(text)) if text == "4after reconnect"
        ));
        transport.emit(Data::Text("4still here".to_owned())).await?;
        assert_eq!(server.recv().await.as_deref(), Some("4still here"));

        transport.disconnect().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_connection_leaves_current_alone() -> Result<()> {
        let mut server = MockServer::start().await;
        let transport = WebsocketTransport::default();
        transport.connect(&server.url()).await?;
        let current = transport.inner.generation.load(Ordering::SeqCst);

        // a loop of an older connection finishing late
        assert!(!transport.inner.release(current - 1).await);
        assert!(transport.is_connected());
        transport.emit(Data::Text("4alive".to_owned())).await?;
        assert_eq!(server.recv().await.as_deref(), Some("4alive"));

        assert!(transport.inner.release(current).await);
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.emit(Data::Text("4gone".to_owned())).await,
            Err(Error::IllegalActionBeforeOpen())
        ));

        transport.dispose().await;
        Ok(())
    }
}
