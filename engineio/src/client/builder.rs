use std::{sync::Arc, time::Duration};

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::{
    error::Result,
    handshake::DEFAULT_FRAMEWORK,
    transports::{websocket::WebsocketTransport, Transport},
};

use super::Client;

/// Used when the server's handshake does not carry a `pingInterval`.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(25000);

/// A builder for an engine.io [`Client`].
///
/// # Example
/// ```no_run
/// use engineio_client::ClientBuilder;
/// use tokio_util::sync::CancellationToken;
/// use url::Url;
///
/// #[tokio::main]
/// async fn main() {
///     let client = ClientBuilder::new()
///         .opening_header("authorization", "Bearer token")
///         .build()
///         .expect("invalid header");
///
///     let url = Url::parse("http://localhost:4200/").unwrap();
///     let handshake = client
///         .open(url, &CancellationToken::new())
///         .await
///         .expect("open failed");
///     println!("session {}", handshake.sid);
///
///     client.send_message("hello").await.expect("send failed");
/// }
/// ```
#[derive(Clone, Debug)]
pub struct ClientBuilder {
    framework: String,
    opening_headers: Vec<(String, String)>,
    default_ping_interval: Duration,
    transport: Option<Arc<dyn Transport>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        ClientBuilder {
            framework: DEFAULT_FRAMEWORK.to_owned(),
            opening_headers: Vec::new(),
            default_ping_interval: DEFAULT_PING_INTERVAL,
            transport: None,
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The path segment appended to the server url, `engine.io` unless the
    /// client is wrapped by another protocol such as `socket.io`.
    pub fn framework<T: Into<String>>(mut self, framework: T) -> Self {
        self.framework = framework.into();
        self
    }

    /// Adds a http header to the websocket upgrade request. Ignored when a
    /// custom transport is set.
    pub fn opening_header<K: Into<String>, V: Into<String>>(mut self, key: K, val: V) -> Self {
        self.opening_headers.push((key.into(), val.into()));
        self
    }

    pub fn default_ping_interval(mut self, interval: Duration) -> Self {
        self.default_ping_interval = interval;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Client> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(WebsocketTransport::new(header_map(&self.opening_headers)?)),
        };

        Ok(Client::new(
            self.framework,
            self.default_ping_interval,
            transport,
        ))
    }
}

fn header_map(headers: &[(String, String)]) -> Result<Option<HeaderMap>> {
    if headers.is_empty() {
        return Ok(None);
    }

    let mut map = HeaderMap::with_capacity(headers.len());
    for (key, val) in headers {
        map.append(HeaderName::from_bytes(key.as_bytes())?, HeaderValue::from_str(val)?);
    }
    Ok(Some(map))
}
