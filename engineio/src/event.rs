use std::sync::Arc;

use tungstenite::protocol::CloseFrame;

use crate::{packet::HandshakePacket, Error};

/// Why a connection ended, with the websocket close code when there was one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub reason: String,
    pub code: Option<u16>,
}

impl CloseReason {
    pub fn new<T: Into<String>>(reason: T) -> Self {
        CloseReason {
            reason: reason.into(),
            code: None,
        }
    }
}

impl From<CloseFrame<'_>> for CloseReason {
    fn from(frame: CloseFrame<'_>) -> Self {
        CloseReason {
            reason: frame.reason.into_owned(),
            code: Some(frame.code.into()),
        }
    }
}

/// Everything an engine.io [`crate::Client`] reports to its listeners.
#[derive(Debug, Clone)]
pub enum Event {
    Opened(HandshakePacket),
    Closed(CloseReason),
    PingSent(String),
    PingReceived(String),
    PongReceived(String),
    MessageReceived(String),
    Upgraded(String),
    NoopReceived(String),
    Error(Arc<Error>),
}
