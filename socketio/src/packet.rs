use std::convert::TryFrom;

use tracing::trace;

use crate::{Error, Result};

pub(crate) const DEFAULT_NAMESPACE: &str = "/";

/// Namespaces carry a leading `/` everywhere in this crate, so `my` and
/// `/my` address the same one.
pub(crate) fn normalize_namespace(nsp: &str) -> String {
    if nsp.starts_with('/') {
        return nsp.to_owned();
    }
    let nsp = format!("/{}", nsp);
    trace!("Added `/` to the given namespace: {}", nsp);
    nsp
}

/// The socket.io packet types this client speaks. Acks and binary packets
/// are not supported.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PacketType {
    Connect,
    Disconnect,
    Event,
    Error,
}

impl From<PacketType> for u8 {
    fn from(ptype: PacketType) -> Self {
        match ptype {
            PacketType::Connect => b'0',
            PacketType::Disconnect => b'1',
            PacketType::Event => b'2',
            PacketType::Error => b'4',
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = Error;
    fn try_from(b: u8) -> Result<Self> {
        match b {
            b'0' => Ok(PacketType::Connect),
            b'1' => Ok(PacketType::Disconnect),
            b'2' => Ok(PacketType::Event),
            b'4' => Ok(PacketType::Error),
            _ => Err(Error::InvalidPacketType(b)),
        }
    }
}

/// A packet carried in the payload of an engine.io message:
/// `<type>[/<namespace>,]<data>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub ptype: PacketType,
    pub nsp: String,
    pub data: String,
}

impl Packet {
    pub fn new<N: Into<String>, D: Into<String>>(ptype: PacketType, nsp: N, data: D) -> Self {
        Packet {
            ptype,
            nsp: nsp.into(),
            data: data.into(),
        }
    }

    pub fn decode(message: &str) -> Result<Self> {
        let first = *message.as_bytes().first().ok_or(Error::IncompletePacket())?;
        let ptype = PacketType::try_from(first)?;
        let rest = &message[1..];

        if !rest.starts_with('/') {
            return Ok(Packet::new(ptype, DEFAULT_NAMESPACE, rest));
        }

        let (nsp, data) = match rest.find(',') {
            Some(comma) => (&rest[..comma], &rest[comma + 1..]),
            None => (rest, ""),
        };
        Ok(Packet::new(ptype, nsp, data))
    }

    pub fn encode(&self) -> String {
        let mut result = String::with_capacity(self.nsp.len() + self.data.len() + 2);
        result.push(u8::from(self.ptype) as char);

        if self.nsp != DEFAULT_NAMESPACE {
            result.push('/');
            result.push_str(self.nsp.trim_start_matches('/'));
            if !self.data.is_empty() {
                result.push(',');
            }
        }

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
