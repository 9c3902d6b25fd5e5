use std::sync::Arc;

use engineio_client::{CloseReason, Error as EngineError};

use crate::Error;

/// An event packet as it arrived, before and after handler dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventArgs {
    /// The raw json array, e.g. `["new message",{"message":"hi"}]`.
    pub value: String,
    pub nsp: String,
    /// Whether at least one handler was registered for the event.
    pub is_handled: bool,
}

/// An error packet, with the quotes around the server's message removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorArgs {
    pub value: String,
    pub nsp: String,
}

/// Everything a socket.io [`crate::Client`] reports to its listeners.
#[derive(Debug, Clone)]
pub enum Event {
    Connected { nsp: String },
    Disconnected(CloseReason),
    EventReceived(EventArgs),
    HandledEventReceived(EventArgs),
    UnhandledEventReceived(EventArgs),
    ErrorReceived(ErrorArgs),
    Error(Arc<Error>),
    EngineError(Arc<EngineError>),
}

/// The outcome of [`crate::Client::wait_event_or_error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Event(EventArgs),
    Error(ErrorArgs),
}
