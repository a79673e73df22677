//! Ethernet frame model and codec.
//!
//! Frames are marshalled without the trailing FCS (the NIC appends it), with
//! payloads zero-padded to the 60-byte minimum a raw socket must hand the
//! driver.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::flood::FrameRequest;

/// Destination + source + EtherType.
pub const HEADER_LEN: usize = 14;
/// Smallest frame the wire accepts, excluding the 4-byte FCS.
pub const MIN_FRAME_LEN: usize = 60;
/// Largest payload for a standard (non-jumbo) frame.
pub const MAX_PAYLOAD_LEN: usize = 1500;

/// EtherType used to mark generated test traffic unless configured otherwise.
pub const DEFAULT_ETHER_TYPE: u16 = 0xbeef;

/// First octet of every generated source address: locally administered, unicast.
const SOURCE_PREFIX: u8 = 0xbe;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload of {len} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("buffer of {len} bytes is too short for an Ethernet header")]
    Truncated { len: usize },

    #[error("invalid MAC address: {0}")]
    InvalidMac(String),
}

// ---------------------------------------------------------------------------
// MacAddr
// ---------------------------------------------------------------------------

/// A 48-bit link-layer hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl std::str::FromStr for MacAddr {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.trim().split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| CodecError::InvalidMac(s.to_string()))?;
            if part.len() != 2 {
                return Err(CodecError::InvalidMac(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| CodecError::InvalidMac(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(CodecError::InvalidMac(s.to_string()));
        }
        Ok(MacAddr(octets))
    }
}

/// Derive the synthetic source address for frame `index` of a run seeded
/// with `seed`.
///
/// The index occupies the low four octets, so distinct indices always yield
/// distinct addresses for a given seed.
pub fn derive_source(seed: u8, index: u32) -> MacAddr {
    let i = index.to_be_bytes();
    MacAddr([SOURCE_PREFIX, seed, i[0], i[1], i[2], i[3]])
}

// ---------------------------------------------------------------------------
// EthernetFrame
// ---------------------------------------------------------------------------

/// An Ethernet II frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFrame {
    pub destination: MacAddr,
    pub source: MacAddr,
    pub ether_type: u16,
    pub payload: Bytes,
}

impl EthernetFrame {
    /// Length of the marshalled frame, including minimum-size padding.
    pub fn wire_len(&self) -> usize {
        (HEADER_LEN + self.payload.len()).max(MIN_FRAME_LEN)
    }

    /// Serialize to wire format.
    pub fn marshal(&self) -> Result<Bytes, CodecError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(CodecError::PayloadTooLarge {
                len: self.payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        let len = self.wire_len();
        let mut buf = BytesMut::with_capacity(len);
        buf.put_slice(&self.destination.0);
        buf.put_slice(&self.source.0);
        buf.put_u16(self.ether_type);
        buf.put_slice(&self.payload);
        buf.resize(len, 0);
        Ok(buf.freeze())
    }

    /// Parse a frame from wire format. Padding is kept as part of the payload.
    pub fn parse(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < HEADER_LEN {
            return Err(CodecError::Truncated { len: buf.len() });
        }
        let mut destination = [0u8; 6];
        let mut source = [0u8; 6];
        destination.copy_from_slice(&buf[0..6]);
        source.copy_from_slice(&buf[6..12]);
        Ok(Self {
            destination: MacAddr(destination),
            source: MacAddr(source),
            ether_type: u16::from_be_bytes([buf[12], buf[13]]),
            payload: Bytes::copy_from_slice(&buf[HEADER_LEN..]),
        })
    }
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// Turns a [`FrameRequest`] into the bytes a worker writes to the socket.
pub trait FrameCodec: Send + Sync {
    fn encode(&self, request: &FrameRequest) -> Result<Bytes, CodecError>;
}

/// Broadcast Ethernet frames with a fixed EtherType and a zeroed payload.
#[derive(Debug, Clone)]
pub struct EthernetCodec {
    ether_type: u16,
    payload: Bytes,
}

impl EthernetCodec {
    pub fn new(ether_type: u16, payload_len: usize) -> Self {
        Self {
            ether_type,
            payload: Bytes::from(vec![0u8; payload_len]),
        }
    }

    /// Build the frame for `request` without serializing it.
    pub fn frame_for(&self, request: &FrameRequest) -> EthernetFrame {
        EthernetFrame {
            destination: MacAddr::BROADCAST,
            source: derive_source(request.seed, request.index),
            ether_type: self.ether_type,
            // Bytes clones share the buffer.
            payload: self.payload.clone(),
        }
    }
}

impl Default for EthernetCodec {
    fn default() -> Self {
        Self::new(DEFAULT_ETHER_TYPE, 0)
    }
}

impl FrameCodec for EthernetCodec {
    fn encode(&self, request: &FrameRequest) -> Result<Bytes, CodecError> {
        self.frame_for(request).marshal()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
