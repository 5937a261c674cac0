//! # PPRZ Packet Encoder
//!
//! Builds checksummed PPRZ packets for the UART telemetry link.

use bytes::{BufMut, BytesMut};

use super::checksum::pprz_checksum;
use super::protocol::*;
use crate::error::Result;

/// Encode a complete PPRZ packet
///
/// # Arguments
///
/// * `packet` - Sender, message id and payload
///
/// # Returns
///
/// * `Vec<u8>` - `[STX][LEN][SENDER][MSG_ID][PAYLOAD..][CKA][CKB]`
///
/// # Examples
///
/// ```
/// use uwb_bridge::pprz::encoder::encode_packet;
/// use uwb_bridge::pprz::protocol::PprzPacket;
///
/// let packet = PprzPacket::new(1, 2, vec![0x10, 0x20, 0x30]).unwrap();
/// let bytes = encode_packet(&packet);
/// assert_eq!(bytes, [0x99, 0x09, 0x01, 0x02, 0x10, 0x20, 0x30, 0x6C, 0xE3]);
/// ```
pub fn encode_packet(packet: &PprzPacket) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(packet.length() as usize);
    buf.put_u8(PPRZ_STX);
    buf.put_u8(packet.length());
    buf.put_u8(packet.sender_id);
    buf.put_u8(packet.message_id);
    buf.put_slice(&packet.payload);

    // Checksum covers LEN through the last data byte
    let (cka, ckb) = pprz_checksum(&buf[1..]);
    buf.put_u8(cka);
    buf.put_u8(ckb);

    buf.to_vec()
}

/// Encode a message from its parts
///
/// # Errors
///
/// Returns error if the payload does not fit in a single packet
pub fn encode_message(sender_id: u8, message_id: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let packet = PprzPacket::new(sender_id, message_id, payload.to_vec())?;
    Ok(encode_packet(&packet))
}

/// Encode the range report payload (10 bytes)
///
/// Layout: `src(1) dest(1) range(f64, little-endian)`
pub fn encode_range_report_payload(report: &RangeReport) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(PPRZ_RANGE_REPORT_PAYLOAD_SIZE);
    buf.put_u8(report.src);
    buf.put_u8(report.dest);
    buf.put_f64_le(report.range);
    buf.to_vec()
}

/// Encode a range report telemetry packet sent by `sender_id`
pub fn encode_range_report(sender_id: u8, report: &RangeReport) -> Vec<u8> {
    encode_packet(&PprzPacket {
        sender_id,
        message_id: PPRZ_MSG_ID_RANGE_REPORT,
        payload: encode_range_report_payload(report),
    })
}
