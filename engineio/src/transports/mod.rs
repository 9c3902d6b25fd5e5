use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use tungstenite::Message;
use url::Url;

use crate::{error::Result, event::CloseReason, listeners::Listeners, Error};

pub mod websocket;

/// The connection an engine.io client speaks over.
///
/// Inbound frames and connection state changes are reported through
/// [`Transport::listeners`], on the task that receives them.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Connects to `url`. Does nothing if already connected; concurrent
    /// calls are serialized.
    async fn connect(&self, url: &Url) -> Result<()>;

    async fn emit(&self, data: Data) -> Result<()>;

    /// Closes the connection gracefully. Does nothing if not connected.
    async fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// The url of the last call to [`Transport::connect`].
    fn last_url(&self) -> Option<Url>;

    fn listeners(&self) -> Arc<Listeners<TransportEvent>>;

    /// Stops receiving and releases the connection. Safe to call repeatedly.
    async fn dispose(&self);

    /// Synchronous counterpart of [`Transport::dispose`] for drop paths; it
    /// signals shutdown without waiting for it.
    fn shutdown(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Data {
    Text(String),
    Binary(Bytes),
}

impl From<Data> for Message {
    fn from(data: Data) -> Self {
        match data {
            Data::Text(text) => Message::Text(text),
            Data::Binary(data) => Message::Binary(data.to_vec()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    Text(String),
    Binary(Bytes),
    Disconnected(CloseReason),
    Error(Arc<Error>),
}
