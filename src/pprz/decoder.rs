//! # PPRZ Packet Decoder
//!
//! Extracts checksum-validated packets from a ring buffer and decodes them.
//!
//! The scanner never consumes more than it validates. A call either returns a
//! whole packet, drops exactly one byte after a framing failure, drops
//! leading garbage up to the next STX, or leaves the buffer untouched while
//! waiting for more input.

use bytes::Buf;
use tracing::trace;

use super::checksum::{pprz_checksum, pprz_checksum_iter};
use super::protocol::*;
use crate::buffer::RingConsumer;
use crate::error::{Result, UwbBridgeError};

/// Ring buffer packet scanner
///
/// Holds no parsing state between calls, only diagnostic counters.
#[derive(Debug, Default)]
pub struct PprzScanner {
    resyncs: u64,
    discarded: u64,
    packets: u64,
}

impl PprzScanner {
    /// Create a scanner with zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to extract the next valid packet from `buffer`
    ///
    /// Returns the raw packet bytes (STX through CKB) or `None`.
    pub fn next_packet(&mut self, buffer: &mut RingConsumer) -> Option<Vec<u8>> {
        // Skip to the next STX
        while let Some(byte) = buffer.peek(0) {
            if byte == PPRZ_STX {
                break;
            }
            buffer.discard(1);
            self.discarded += 1;
        }

        if buffer.len() < PPRZ_MIN_HEADER {
            return None;
        }

        let len = buffer.peek(1)? as usize;
        if len <= PPRZ_MIN_HEADER {
            trace!("PPRZ length {} too short, resyncing", len);
            self.resync(buffer);
            return None;
        }

        if len > buffer.len() {
            return None;
        }

        let (cka, ckb) = pprz_checksum_iter((1..len - 2).filter_map(|i| buffer.peek(i)));
        if buffer.peek(len - 2) != Some(cka) || buffer.peek(len - 1) != Some(ckb) {
            trace!("PPRZ checksum mismatch on {}-byte packet, resyncing", len);
            self.resync(buffer);
            return None;
        }

        let packet = buffer.take(len)?;
        self.packets += 1;
        Some(packet)
    }

    /// Number of times a leading STX was dropped after a framing failure
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Number of non-STX bytes skipped
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Number of packets extracted
    pub fn packets(&self) -> u64 {
        self.packets
    }

    fn resync(&mut self, buffer: &mut RingConsumer) {
        buffer.discard(1);
        self.resyncs += 1;
    }
}

/// Decode a complete PPRZ packet
///
/// # Errors
///
/// Returns error if:
/// - Packet is too short
/// - STX is incorrect
/// - `LEN` disagrees with the slice length
/// - Checksum fails
pub fn decode_packet(bytes: &[u8]) -> Result<PprzPacket> {
    if bytes.len() < PPRZ_FRAMING_BYTES + 2 {
        return Err(UwbBridgeError::Pprz("Packet too short".to_string()));
    }

    if bytes[0] != PPRZ_STX {
        return Err(UwbBridgeError::Pprz(format!(
            "Invalid start byte: 0x{:02X}",
            bytes[0]
        )));
    }

    let len = bytes[1] as usize;
    if len != bytes.len() {
        return Err(UwbBridgeError::Pprz(format!(
            "Length mismatch: header says {} bytes, got {}",
            len,
            bytes.len()
        )));
    }

    let (cka, ckb) = pprz_checksum(&bytes[1..len - 2]);
    if (cka, ckb) != (bytes[len - 2], bytes[len - 1]) {
        return Err(UwbBridgeError::Pprz(format!(
            "Checksum mismatch: expected {:02X}{:02X}, got {:02X}{:02X}",
            cka,
            ckb,
            bytes[len - 2],
            bytes[len - 1]
        )));
    }

    Ok(PprzPacket {
        sender_id: bytes[2],
        message_id: bytes[3],
        payload: bytes[4..len - 2].to_vec(),
    })
}

/// Decode a range report payload
pub fn decode_range_report(payload: &[u8]) -> Result<RangeReport> {
    if payload.len() < PPRZ_RANGE_REPORT_PAYLOAD_SIZE {
        return Err(UwbBridgeError::Pprz(format!(
            "Range report payload too short: {} bytes",
            payload.len()
        )));
    }

    let mut buf = payload;
    Ok(RangeReport {
        src: buf.get_u8(),
        dest: buf.get_u8(),
        range: buf.get_f64_le(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ring_buffer;
    use crate::pprz::encoder::{encode_message, encode_range_report};

    fn valid_packet() -> Vec<u8> {
        vec![0x99, 0x09, 0x01, 0x02, 0x10, 0x20, 0x30, 0x6C, 0xE3]
    }

    #[test]
    fn test_range_report_round_trip_through_stream() {
        let report = RangeReport { src: 12, dest: 40, range: 3.141_592_653_589_793 };
        let bytes = encode_range_report(12, &report);

        let (mut tx, mut rx) = ring_buffer(64);
        tx.push_slice(&[0x00, 0x42]); // line noise before the packet
        tx.push_slice(&bytes);

        let mut scanner = PprzScanner::new();
        let raw = scanner.next_packet(&mut rx).expect("packet");
        assert_eq!(raw, bytes);
        assert_eq!(scanner.discarded(), 2);

        let packet = decode_packet(&raw).unwrap();
        assert_eq!(packet.sender_id, 12);
        assert_eq!(packet.message_id, PPRZ_MSG_ID_RANGE_REPORT);
        assert_eq!(decode_range_report(&packet.payload).unwrap(), report);
    }

    #[test]
    fn test_corrupted_packet_then_valid_packet() {
        let mut corrupted = valid_packet();
        corrupted[8] ^= 0xFF; // flip CKB
        let valid = encode_message(5, 6, &[0x01, 0x02, 0x03, 0x04]).unwrap();

        let (mut tx, mut rx) = ring_buffer(64);
        tx.push_slice(&corrupted);
        tx.push_slice(&valid);
        let total = rx.len();

        let mut scanner = PprzScanner::new();

        // First call rejects the corrupted packet by dropping its STX only
        assert_eq!(scanner.next_packet(&mut rx), None);
        assert_eq!(rx.len(), total - 1);
        assert_eq!(scanner.resyncs(), 1);

        // Second call skips the rest of the corrupted packet and extracts the valid one
        assert_eq!(scanner.next_packet(&mut rx), Some(valid));
        assert_eq!(scanner.discarded() as usize, corrupted.len() - 1);

        assert_eq!(scanner.next_packet(&mut rx), None);
        assert_eq!(scanner.packets(), 1);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_partial_packet_is_stable() {
        let bytes = encode_range_report(1, &RangeReport { src: 1, dest: 2, range: 7.0 });

        let (mut tx, mut rx) = ring_buffer(64);
        tx.push_slice(&bytes[..10]);

        let mut scanner = PprzScanner::new();
        for _ in 0..5 {
            assert_eq!(scanner.next_packet(&mut rx), None);
            assert_eq!(rx.len(), 10);
        }

        // Completing the packet makes it available
        tx.push_slice(&bytes[10..]);
        assert_eq!(scanner.next_packet(&mut rx), Some(bytes));
        assert_eq!(scanner.resyncs(), 0);
    }

    #[test]
    fn test_short_header_waits() {
        let (mut tx, mut rx) = ring_buffer(16);
        tx.push_slice(&[0x99, 0x09, 0x01, 0x02]);

        let mut scanner = PprzScanner::new();
        assert_eq!(scanner.next_packet(&mut rx), None);
        assert_eq!(rx.len(), 4);
    }

    #[test]
    fn test_length_too_small_forces_resync() {
        let (mut tx, mut rx) = ring_buffer(16);
        tx.push_slice(&[0x99, 0x05, 0x01, 0x02, 0x03, 0x04]);

        let mut scanner = PprzScanner::new();
        assert_eq!(scanner.next_packet(&mut rx), None);
        assert_eq!(rx.len(), 5);
        assert_eq!(scanner.resyncs(), 1);
    }

    #[test]
    fn test_garbage_only_empties_buffer() {
        let (mut tx, mut rx) = ring_buffer(16);
        tx.push_slice(&[0x01, 0x02, 0x03]);

        let mut scanner = PprzScanner::new();
        assert_eq!(scanner.next_packet(&mut rx), None);
        assert!(rx.is_empty());
        assert_eq!(scanner.discarded(), 3);
    }

    #[test]
    fn test_back_to_back_packets() {
        let a = encode_message(1, 10, &[1, 2, 3]).unwrap();
        let b = encode_message(2, 11, &[4, 5]).unwrap();

        let (mut tx, mut rx) = ring_buffer(64);
        tx.push_slice(&a);
        tx.push_slice(&b);

        let mut scanner = PprzScanner::new();
        assert_eq!(scanner.next_packet(&mut rx), Some(a));
        assert_eq!(scanner.next_packet(&mut rx), Some(b));
        assert_eq!(scanner.next_packet(&mut rx), None);
    }

    #[test]
    fn test_decode_packet_errors() {
        assert!(decode_packet(&[0x99, 0x06]).is_err());

        let mut bad_stx = valid_packet();
        bad_stx[0] = 0x98;
        assert!(decode_packet(&bad_stx).is_err());

        let mut bad_len = valid_packet();
        bad_len[1] = 0x0A;
        assert!(decode_packet(&bad_len).is_err());

        let mut bad_ck = valid_packet();
        bad_ck[7] ^= 0x01;
        assert!(decode_packet(&bad_ck).is_err());
    }

    #[test]
    fn test_decode_range_report_too_short() {
        assert!(decode_range_report(&[1, 2, 3]).is_err());
    }
}
