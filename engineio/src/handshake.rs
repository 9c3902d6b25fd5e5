use std::fmt::Write;

use url::Url;

use crate::{Error, Result, ENGINE_IO_VERSION};

pub const DEFAULT_FRAMEWORK: &str = "engine.io";

/// Rewrites a user supplied server address into the websocket url of the
/// engine.io handshake, e.g. `https://host/path?arg` becomes
/// `wss://host/path/engine.io/?EIO=3&transport=websocket&arg`.
pub fn to_websocket_url(url: &Url, framework: &str) -> Result<Url> {
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(Error::InvalidUrlScheme(other.to_owned())),
    };
    let host = url
        .host_str()
        .ok_or(Error::InvalidUrl(url::ParseError::EmptyHost))?;

    let mut address = format!("{}://{}", scheme, host);
    if let Some(port) = url.port() {
        let _ = write!(address, ":{}", port);
    }
    let _ = write!(
        address,
        "{}/{}/?EIO={}&transport=websocket&{}",
        url.path().trim_end_matches('/'),
        framework.trim_matches('/'),
        ENGINE_IO_VERSION,
        url.query().unwrap_or_default(),
    );

    Ok(Url::parse(&address)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(url: &str, framework: &str) -> String {
        to_websocket_url(&Url::parse(url).unwrap(), framework)
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_scheme_mapping() {
        assert_eq!(
            rewrite("https://abc.com/", DEFAULT_FRAMEWORK),
            "wss://abc.com/engine.io/?EIO=3&transport=websocket&"
        );
        assert_eq!(
            rewrite("http://abc.com", DEFAULT_FRAMEWORK),
            "ws://abc.com/engine.io/?EIO=3&transport=websocket&"
        );
        assert_eq!(
            rewrite("wss://abc.com/", "socket.io"),
            "wss://abc.com/socket.io/?EIO=3&transport=websocket&"
        );
        assert_eq!(
            rewrite("ws://127.0.0.1:4200/", "socket.io"),
            "ws://127.0.0.1:4200/socket.io/?EIO=3&transport=websocket&"
        );
    }

    #[test]
    fn test_path_and_query() {
        assert_eq!(
            rewrite("https://abc.com/path?arg", DEFAULT_FRAMEWORK),
            "wss://abc.com/path/engine.io/?EIO=3&transport=websocket&arg"
        );
        assert_eq!(
            rewrite("https://abc.com/path/?token=1&x=y", "socket.io"),
            "wss://abc.com/path/socket.io/?EIO=3&transport=websocket&token=1&x=y"
        );
        // default ports are not spelled out
        assert_eq!(
            rewrite("https://abc.com:443/", DEFAULT_FRAMEWORK),
            "wss://abc.com/engine.io/?EIO=3&transport=websocket&"
        );
    }

    #[test]
    fn test_unsupported_scheme() {
        let url = Url::parse("ftp://abc.com/").unwrap();
        let err = to_websocket_url(&url, DEFAULT_FRAMEWORK).unwrap_err();
        assert!(matches!(err, Error::InvalidUrlScheme(scheme) if scheme == "ftp"));
    }
}
