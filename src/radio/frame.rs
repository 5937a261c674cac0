//! # On-Air Frame Codec
//!
//! Fixed 4-byte header followed by up to 15 payload bytes:
//!
//! ```text
//! [SRC][DEST][TYPE][SEQ][PAYLOAD 0..=15]
//! ```
//!
//! There is no checksum at this layer; the radio's link-layer CRC covers it.

use crate::error::{Result, UwbBridgeError};

/// Header size in bytes
pub const FRAME_HEADER_LEN: usize = 4;

/// Maximum payload size in bytes
pub const FRAME_MAX_PAYLOAD: usize = 15;

/// Maximum frame size on air
pub const FRAME_MAX_LEN: usize = FRAME_HEADER_LEN + FRAME_MAX_PAYLOAD;

/// Broadcast destination
pub const BROADCAST: u8 = 0xFF;

/// Alternate broadcast destination
pub const BROADCAST_ZERO: u8 = 0x00;

/// Returns `true` if `address` is one of the two broadcast addresses
pub fn is_broadcast(address: u8) -> bool {
    address == BROADCAST || address == BROADCAST_ZERO
}

/// Frame type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    RangePoll = 0,
    RangeResponse = 1,
    RangeFinal = 2,
    RangeTransfer = 3,
    RangeReport = 5,
    RangeRequest = 6,
    DataRelay = 42,
    Ping = 254,
    Pong = 255,
}

impl TryFrom<u8> for FrameType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(FrameType::RangePoll),
            1 => Ok(FrameType::RangeResponse),
            2 => Ok(FrameType::RangeFinal),
            3 => Ok(FrameType::RangeTransfer),
            5 => Ok(FrameType::RangeReport),
            6 => Ok(FrameType::RangeRequest),
            42 => Ok(FrameType::DataRelay),
            254 => Ok(FrameType::Ping),
            255 => Ok(FrameType::Pong),
            other => Err(other),
        }
    }
}

/// A radio frame
///
/// `frame_type` is kept raw so that unknown tags survive decoding and can be
/// reported by the router.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub src: u8,
    pub dest: u8,
    pub frame_type: u8,
    pub seq: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame
    ///
    /// # Errors
    ///
    /// Returns error if the payload exceeds 15 bytes
    pub fn new(src: u8, dest: u8, frame_type: FrameType, seq: u8, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > FRAME_MAX_PAYLOAD {
            return Err(UwbBridgeError::Frame(format!(
                "Payload size {} exceeds maximum {}",
                payload.len(),
                FRAME_MAX_PAYLOAD
            )));
        }

        Ok(Self {
            src,
            dest,
            frame_type: frame_type as u8,
            seq,
            payload,
        })
    }

    /// Known type, or `None` for an unrecognised tag
    pub fn kind(&self) -> Option<FrameType> {
        FrameType::try_from(self.frame_type).ok()
    }

    /// Wire length (header + payload)
    pub fn wire_len(&self) -> usize {
        FRAME_HEADER_LEN + self.payload.len()
    }

    /// Encode to wire bytes, header first
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        out.extend_from_slice(&[self.src, self.dest, self.frame_type, self.seq]);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode wire bytes
    ///
    /// Bytes past the maximum frame length are ignored.
    ///
    /// # Errors
    ///
    /// Returns error if fewer than 4 header bytes are supplied
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FRAME_HEADER_LEN {
            return Err(UwbBridgeError::Frame(format!(
                "Frame too short: {} bytes",
                bytes.len()
            )));
        }

        let end = bytes.len().min(FRAME_MAX_LEN);
        Ok(Self {
            src: bytes[0],
            dest: bytes[1],
            frame_type: bytes[2],
            seq: bytes[3],
            payload: bytes[FRAME_HEADER_LEN..end].to_vec(),
        })
    }
}
