//! An engine.io (protocol revision 3) client over websockets.
//!
//! The [`Client`] opens a session with [`Client::open`], keeps it alive
//! with a ping heartbeat and reports everything the server sends as
//! [`Event`]s. It is the transport the `socketio-client` crate builds on.

pub mod client;
pub mod error;
pub mod event;
pub mod handshake;
pub(crate) mod heartbeat;
pub mod listeners;
pub mod packet;
pub mod transports;

pub use client::{Client, ClientBuilder};
pub use error::Error;
pub(crate) use error::Result;
pub use event::{CloseReason, Event};
pub use handshake::to_websocket_url;
pub use listeners::{ListenerId, Listeners, Subscription};
pub use packet::{HandshakePacket, Packet, PacketType};
pub use transports::{websocket::WebsocketTransport, Data, Transport, TransportEvent};

pub const ENGINE_IO_VERSION: i32 = 3;

#[cfg(test)]
pub(crate) mod test {
    use std::{net::SocketAddr, sync::Arc, time::Duration};

    use futures_util::{SinkExt, StreamExt};
    use tokio::{
        net::TcpListener,
        sync::{
            mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
            Mutex,
        },
    };
    use tokio_tungstenite::accept_hdr_async;
    use tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    };
    use tracing_subscriber::EnvFilter;
    use url::Url;

    pub(crate) const SID: &str = "lvRP3AYFhuQr-7iVB5T9";

    pub(crate) fn handshake_frame(ping_interval: u64) -> String {
        format!(
            "0{{\"sid\":\"{}\",\"upgrades\":[],\"pingInterval\":{},\"pingTimeout\":60000}}",
            SID, ping_interval
        )
    }

    /// Logs to the test output, filtered by `RUST_LOG`.
    pub(crate) fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    enum Command {
        Send(Message),
        /// Drops the socket without a close frame.
        Abort,
    }

    /// A websocket server on a random local port. It serves one connection at
    /// a time, records each upgrade request's uri, sends `handshake` first if
    /// set, then forwards scripted frames and collects the client's text frames.
    pub(crate) struct MockServer {
        addr: SocketAddr,
        outgoing: UnboundedSender<Command>,
        incoming: UnboundedReceiver<String>,
        requests: UnboundedReceiver<String>,
    }

    impl MockServer {
        pub(crate) async fn start() -> Self {
            Self::serve(None).await
        }

        pub(crate) async fn with_handshake(handshake: String) -> Self {
            Self::serve(Some(handshake)).await
        }

        async fn serve(handshake: Option<String>) -> Self {
            init_tracing();
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();

            let (outgoing, outgoing_rx) = unbounded_channel::<Command>();
            let (incoming_tx, incoming) = unbounded_channel();
            let (requests_tx, requests) = unbounded_channel();
            let outgoing_rx = Arc::new(Mutex::new(outgoing_rx));

            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let requests_tx = requests_tx.clone();
                    let callback = move |req: &Request,
                                         resp: Response|
                          -> Result<Response, ErrorResponse> {
                        let _ = requests_tx.send(req.uri().to_string());
                        Ok(resp)
                    };
                    let ws = match accept_hdr_async(stream, callback).await {
                        Ok(ws) => ws,
                        Err(_) => continue,
                    };
                    let (mut sink, mut stream) = ws.split();

                    if let Some(frame) = &handshake {
                        if sink.send(Message::Text(frame.clone())).await.is_err() {
                            continue;
                        }
                    }

                    let mut outgoing = outgoing_rx.lock().await;
                    loop {
                        tokio::select! {
                            command = outgoing.recv() => match command {
                                Some(Command::Send(message)) => {
                                    if sink.send(message).await.is_err() {
                                        break;
                                    }
                                }
                                Some(Command::Abort) | None => break,
                            },
                            message = stream.next() => match message {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = incoming_tx.send(text);
                                }
                                Some(Ok(_)) => (),
                                Some(Err(_)) | None => break,
                            },
                        }
                    }
                }
            });

            MockServer {
                addr,
                outgoing,
                incoming,
                requests,
            }
        }

        pub(crate) fn url(&self) -> Url {
            Url::parse(&format!("ws://{}/", self.addr)).unwrap()
        }

        pub(crate) fn http_url(&self) -> Url {
            Url::parse(&format!("http://{}/", self.addr)).unwrap()
        }

        pub(crate) fn send(&self, text: &str) {
            self.outgoing
                .send(Command::Send(Message::Text(text.to_owned())))
                .unwrap();
        }

        pub(crate) fn close(&self) {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            };
            self.outgoing
                .send(Command::Send(Message::Close(Some(frame))))
                .unwrap();
        }

        /// Breaks the current connection the way a network failure would.
        pub(crate) fn abort(&self) {
            self.outgoing.send(Command::Abort).unwrap();
        }

        /// The next text frame sent by the client, `None` after five seconds.
        pub(crate) async fn recv(&mut self) -> Option<String> {
            tokio::time::timeout(Duration::from_secs(5), self.incoming.recv())
                .await
                .ok()
                .flatten()
        }

        pub(crate) async fn request_uri(&mut self) -> Option<String> {
            tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
                .await
                .ok()
                .flatten()
        }
    }
}
