//! # PPRZ Protocol Constants and Types
//!
//! Core definitions for the PPRZ serial telemetry framing.
//!
//! ```text
//! [0x99][LEN][SENDER][MSG_ID][...PAYLOAD...][CKA][CKB]
//! ```
//!
//! `LEN` counts every byte of the packet, STX and checksums included.

use crate::error::{Result, UwbBridgeError};

/// Start-of-packet marker
pub const PPRZ_STX: u8 = 0x99;

/// STX + LEN + CKA + CKB
pub const PPRZ_FRAMING_BYTES: usize = 4;

/// Buffered byte count needed before a packet header is inspected.
/// A declared `LEN` at or below this value is rejected as too short.
pub const PPRZ_MIN_HEADER: usize = 5;

/// Largest packet representable by the single `LEN` byte
pub const PPRZ_MAX_PACKET_LEN: usize = 255;

/// Largest message payload (after sender and message id)
pub const PPRZ_MAX_PAYLOAD_SIZE: usize = PPRZ_MAX_PACKET_LEN - PPRZ_FRAMING_BYTES - 2;

/// Message id reserved for UWB range reports
pub const PPRZ_MSG_ID_RANGE_REPORT: u8 = 254;

/// Range report payload size: src(1) + dest(1) + range f64(8)
pub const PPRZ_RANGE_REPORT_PAYLOAD_SIZE: usize = 10;

/// A ranging result as emitted on the telemetry link
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeReport {
    /// Initiator of the ranging exchange
    pub src: u8,

    /// Responder of the ranging exchange
    pub dest: u8,

    /// Distance in meters
    pub range: f64,
}

/// Decoded PPRZ packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PprzPacket {
    /// Sender id (first data byte)
    pub sender_id: u8,

    /// Message id (second data byte)
    pub message_id: u8,

    /// Message-specific payload
    pub payload: Vec<u8>,
}

impl PprzPacket {
    /// Create a new PPRZ packet
    ///
    /// # Errors
    ///
    /// Returns error if the payload would not fit in a 255-byte packet
    pub fn new(sender_id: u8, message_id: u8, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > PPRZ_MAX_PAYLOAD_SIZE {
            return Err(UwbBridgeError::Pprz(format!(
                "Payload size {} exceeds maximum {}",
                payload.len(),
                PPRZ_MAX_PAYLOAD_SIZE
            )));
        }

        Ok(Self {
            sender_id,
            message_id,
            payload,
        })
    }

    /// Total wire length (the `LEN` byte)
    pub fn length(&self) -> u8 {
        (PPRZ_FRAMING_BYTES + 2 + self.payload.len()) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_constants() {
        assert_eq!(PPRZ_STX, 0x99);
        assert_eq!(PPRZ_FRAMING_BYTES, 4);
        assert_eq!(PPRZ_MAX_PAYLOAD_SIZE, 249);
    }

    #[test]
    fn test_packet_length() {
        let packet = PprzPacket::new(1, PPRZ_MSG_ID_RANGE_REPORT, vec![0u8; 10]).unwrap();
        assert_eq!(packet.length(), 16);
    }

    #[test]
    fn test_packet_payload_too_large() {
        let result = PprzPacket::new(1, 2, vec![0u8; PPRZ_MAX_PAYLOAD_SIZE + 1]);
        assert!(result.is_err());
    }

    #[test]
    fn test_packet_max_payload() {
        let packet = PprzPacket::new(1, 2, vec![0u8; PPRZ_MAX_PAYLOAD_SIZE]).unwrap();
        assert_eq!(packet.length(), 255);
    }
}
