use http::header::{InvalidHeaderName, InvalidHeaderValue};
use serde_json::Error as JsonError;
use std::time::Duration;
use thiserror::Error;
use tungstenite::Error as WsError;
use url::ParseError as UrlParseError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),
    #[error("Incomplete packet")]
    IncompletePacket(),
    #[error("Invalid json: {0}")]
    InvalidJson(#[from] JsonError),
    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] UrlParseError),
    #[error("Scheme is not supported: {0}")]
    InvalidUrlScheme(String),
    #[error("Invalid header name")]
    InvalidHeaderName(#[from] InvalidHeaderName),
    #[error("Invalid header value")]
    InvalidHeaderValue(#[from] InvalidHeaderValue),
    #[error("Websocket Error: {0}")]
    WsError(#[from] WsError),
    #[error("Called an action before the connection was established")]
    IllegalActionBeforeOpen(),
    #[error("Connection closed before the handshake completed: {0}")]
    ConnectionClosed(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Operation was cancelled")]
    Cancelled(),
    #[error("Client has been disposed")]
    Disposed(),
}

pub(crate) type Result<T> = std::result::Result<T, Error>;
