use engineio_client::Error as EngineError;
use serde_json::Error as JsonError;
use std::time::Duration;
use thiserror::Error;
use url::ParseError as UrlParseError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),
    #[error("Incomplete packet")]
    IncompletePacket(),
    #[error("Not a json array: {0}")]
    InvalidJsonArray(String),
    #[error("Invalid json: {0}")]
    InvalidJson(#[from] JsonError),
    #[error("Payload of event `{event}` does not match the handler: {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: JsonError,
    },
    #[error("Event `{0}` arrived without a payload")]
    MissingPayload(String),
    #[error("Handler of event `{0}` panicked")]
    HandlerPanicked(String),
    #[error("{0}")]
    ServerError(String),
    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] UrlParseError),
    #[error("Engine.io error: {0}")]
    EngineIo(#[from] EngineError),
    #[error("Called an action before the connection was established")]
    IllegalActionBeforeOpen(),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Operation was cancelled")]
    Cancelled(),
    #[error("Client has been disposed")]
    Disposed(),
}

pub type Result<T> = std::result::Result<T, Error>;
