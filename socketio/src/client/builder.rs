use std::{sync::Arc, time::Duration};

use engineio_client::{ClientBuilder as EngineClientBuilder, Transport};
use url::Url;

use super::Client;
use crate::{error::Result, packet::normalize_namespace};

/// The framework segment of the handshake url of a socket.io server.
pub const SOCKET_IO_FRAMEWORK: &str = "socket.io";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A builder for a socket.io [`Client`]. If no namespace is specified, only
/// the default namespace `/` is joined on connect.
///
/// # Example
/// ```no_run
/// use serde::Deserialize;
/// use socketio_client::ClientBuilder;
///
/// #[derive(Debug, Deserialize)]
/// struct ChatMessage {
///     username: String,
///     message: String,
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let socket = ClientBuilder::new()
///         .opening_header("accept-encoding", "application/json")
///         .connect("http://localhost:3000/")
///         .await
///         .expect("connection failed");
///
///     socket.on("new message", |message: ChatMessage| {
///         println!("{}: {}", message.username, message.message);
///     });
///
///     let result = socket.emit("new message", "Hello World").await;
///     assert!(result.is_ok());
/// }
/// ```
#[derive(Clone, Debug)]
pub struct ClientBuilder {
    namespace: Option<String>,
    engine: EngineClientBuilder,
    connect_timeout: Duration,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        ClientBuilder {
            namespace: None,
            engine: EngineClientBuilder::new().framework(SOCKET_IO_FRAMEWORK),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default namespace of the client, which is joined on connect
    /// and used by [`Client::emit`]. A missing leading `/` is added.
    pub fn namespace<T: AsRef<str>>(mut self, namespace: T) -> Self {
        self.namespace = Some(normalize_namespace(namespace.as_ref()));
        self
    }

    /// Sets a http header of the websocket upgrade request.
    pub fn opening_header<K: Into<String>, V: Into<String>>(mut self, key: K, val: V) -> Self {
        self.engine = self.engine.opening_header(key, val);
        self
    }

    /// Used when the server's handshake carries no `pingInterval`.
    pub fn default_ping_interval(mut self, interval: Duration) -> Self {
        self.engine = self.engine.default_ping_interval(interval);
        self
    }

    /// How long [`ClientBuilder::connect`] waits for the server.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.engine = self.engine.transport(transport);
        self
    }

    pub fn build(self) -> Result<Client> {
        let engine = self.engine.build()?;
        Ok(Client::new(engine, self.namespace, self.connect_timeout))
    }

    /// Builds the client and connects it to `address`, giving up after the
    /// connect timeout.
    pub async fn connect<T: AsRef<str>>(self, address: T) -> Result<Client> {
        let url = Url::parse(address.as_ref())?;
        let timeout = self.connect_timeout;
        let client = self.build()?;
        client.connect_with_timeout(url, &[], timeout).await?;
        Ok(client)
    }
}
