use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::time::Duration;

use crate::{Error, Result};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PacketType {
    Open,
    Close,
    Ping,
    Pong,
    Message,
    Upgrade,
    Noop,
}

impl From<PacketType> for u8 {
    fn from(ptype: PacketType) -> Self {
        match ptype {
            PacketType::Open => b'0',
            PacketType::Close => b'1',
            PacketType::Ping => b'2',
            PacketType::Pong => b'3',
            PacketType::Message => b'4',
            PacketType::Upgrade => b'5',
            PacketType::Noop => b'6',
        }
    }
}

impl From<PacketType> for char {
    fn from(ptype: PacketType) -> Self {
        u8::from(ptype) as char
    }
}

impl TryFrom<u8> for PacketType {
    type Error = Error;
    /// Converts an ascii digit into the corresponding `PacketType`.
    fn try_from(b: u8) -> Result<PacketType> {
        match b {
            b'0' => Ok(PacketType::Open),
            b'1' => Ok(PacketType::Close),
            b'2' => Ok(PacketType::Ping),
            b'3' => Ok(PacketType::Pong),
            b'4' => Ok(PacketType::Message),
            b'5' => Ok(PacketType::Upgrade),
            b'6' => Ok(PacketType::Noop),
            _ => Err(Error::InvalidPacketType(b)),
        }
    }
}

/// A `Packet` sent via the `engine.io` protocol. On the wire it is the
/// single digit of its type followed by the whole value, with no escaping.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Packet {
    pub ptype: PacketType,
    pub data: String,
}

impl Packet {
    pub fn new<T: Into<String>>(ptype: PacketType, data: T) -> Self {
        Packet {
            ptype,
            data: data.into(),
        }
    }

    pub fn empty(ptype: PacketType) -> Self {
        Packet {
            ptype,
            data: String::new(),
        }
    }

    /// Decodes a single text frame.
    pub fn decode(message: &str) -> Result<Self> {
        let first = *message.as_bytes().first().ok_or(Error::IncompletePacket())?;
        let ptype = PacketType::try_from(first)?;

        // the prefix is an ascii digit, so slicing after it is on a char boundary
        Ok(Packet::new(ptype, &message[1..]))
    }

    pub fn encode(&self) -> String {
        let mut result = String::with_capacity(self.data.len() + 1);
        result.push(self.ptype.into());
        result.push_str(&self.data);
        result
    }
}

impl TryFrom<&str> for Packet {
    type Error = Error;
    fn try_from(message: &str) -> Result<Self> {
        Packet::decode(message)
    }
}

impl From<Packet> for String {
    fn from(packet: Packet) -> Self {
        packet.encode()
    }
}

/// Data which gets exchanged in a handshake as defined by the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HandshakePacket {
    #[serde(default)]
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

impl HandshakePacket {
    /// The advertised ping interval, `None` when the server sent none.
    pub fn ping_interval(&self) -> Option<Duration> {
        match self.ping_interval {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl TryFrom<&Packet> for HandshakePacket {
    type Error = Error;
    fn try_from(packet: &Packet) -> Result<HandshakePacket> {
        Ok(serde_json::from_str(&packet.data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN: &str = "0{\"sid\":\"lvRP3AYFhuQr-7iVB5T9\",\"upgrades\":[],\"pingInterval\":25000,\"pingTimeout\":60000}";

    fn assert_round_trip(message: &str, expected: Packet) {
        let packet = Packet::decode(message).unwrap();
        assert_eq!(packet, expected);
        assert_eq!(expected.encode(), message);
        assert_eq!(Packet::decode(&expected.encode()).unwrap(), expected);
        assert_eq!(String::from(packet), message);
    }

    #[test]
    fn test_packet_error() {
        assert!(matches!(
            Packet::decode("").unwrap_err(),
            Error::IncompletePacket()
        ));
        assert!(matches!(
            Packet::decode("9hello").unwrap_err(),
            Error::InvalidPacketType(b'9')
        ));
        assert!(Packet::decode("ähm").is_err());
    }

    #[test]
    fn test_fixtures() {
        assert_round_trip(
            OPEN,
            Packet::new(PacketType::Open, &OPEN[1..]),
        );
        assert_round_trip("1", Packet::empty(PacketType::Close));
        assert_round_trip("40", Packet::new(PacketType::Message, "0"));
        assert_round_trip(
            "42[\"login\",{\"numUsers\":5}]",
            Packet::new(PacketType::Message, "2[\"login\",{\"numUsers\":5}]"),
        );
        assert_round_trip(
            "42/my,[\"message\",{\"message\":\"hello\"}]",
            Packet::new(
                PacketType::Message,
                "2/my,[\"message\",{\"message\":\"hello\"}]",
            ),
        );
        assert_round_trip(
            "44\"Authentication error\"",
            Packet::new(PacketType::Message, "4\"Authentication error\""),
        );
    }

    #[test]
    fn test_lone_prefix() {
        assert_round_trip("2", Packet::empty(PacketType::Ping));
        assert_round_trip("2ping", Packet::new(PacketType::Ping, "ping"));
        assert_round_trip("4", Packet::empty(PacketType::Message));
        assert_round_trip("5websocket", Packet::new(PacketType::Upgrade, "websocket"));
        assert_round_trip("6", Packet::empty(PacketType::Noop));
    }

    #[test]
    fn test_packet_type_conversion() {
        for (digit, ptype) in [
            (b'0', PacketType::Open),
            (b'1', PacketType::Close),
            (b'2', PacketType::Ping),
            (b'3', PacketType::Pong),
            (b'4', PacketType::Message),
            (b'5', PacketType::Upgrade),
            (b'6', PacketType::Noop),
        ] {
            assert_eq!(PacketType::try_from(digit).unwrap(), ptype);
            assert_eq!(u8::from(ptype), digit);
        }

        let sut = PacketType::try_from(42);
        assert!(matches!(sut.unwrap_err(), Error::InvalidPacketType(42)));
    }

    #[test]
    fn test_handshake_packet() {
        let packet = Packet::decode(OPEN).unwrap();
        let handshake = HandshakePacket::try_from(&packet).unwrap();
        assert_eq!(
            handshake,
            HandshakePacket {
                sid: "lvRP3AYFhuQr-7iVB5T9".to_owned(),
                upgrades: vec![],
                ping_interval: 25000,
                ping_timeout: 60000,
            }
        );
        assert_eq!(handshake.ping_interval(), Some(Duration::from_secs(25)));

        assert!(HandshakePacket::try_from(&Packet::new(PacketType::Open, "test")).is_err());

        let sparse = HandshakePacket::try_from(&Packet::new(PacketType::Open, "{\"sid\":\"x\"}"))
            .unwrap();
        assert_eq!(sparse.sid, "x");
        assert_eq!(sparse.ping_interval(), None);
    }
}
