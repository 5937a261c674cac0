//! # Radio Time
//!
//! 40-bit hardware timestamps of the UWB transceiver.
//!
//! The counter runs at 499.2 MHz × 128 (63.8976 GHz) and wraps at 2^40,
//! roughly every 17.2 seconds.

/// Largest representable timestamp value
pub const TIME_MAX: u64 = 0xFF_FFFF_FFFF;

/// Counter frequency in ticks per second
pub const COUNTER_FREQUENCY_HZ: f64 = 499.2e6 * 128.0;

/// Wire size of a raw timestamp field
pub const TIMESTAMP_LEN: usize = 5;

/// An instant of the radio's system clock
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp, or `None` if `value` does not fit in 40 bits
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Timestamp(value))
        } else {
            None
        }
    }

    /// Creates a timestamp, discarding bits above bit 39
    pub fn wrapping(value: u64) -> Self {
        Timestamp(value & TIME_MAX)
    }

    /// Raw 40-bit counter value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Ticks elapsed from `earlier` to `self`
    ///
    /// Assumes `self` is the later instant; a numerically smaller value means
    /// the counter wrapped in between.
    ///
    /// ```
    /// use uwb_bridge::radio::time::{Timestamp, TIME_MAX};
    ///
    /// let start = Timestamp::new(TIME_MAX + 1 - 10).unwrap();
    /// let end = Timestamp::new(5).unwrap();
    /// assert_eq!(end.ticks_since(start), 15);
    /// ```
    pub fn ticks_since(&self, earlier: Timestamp) -> u64 {
        if self.0 >= earlier.0 {
            self.0 - earlier.0
        } else {
            self.0 + (TIME_MAX + 1 - earlier.0)
        }
    }

    /// Little-endian 5-byte wire representation
    pub fn to_bytes(&self) -> [u8; TIMESTAMP_LEN] {
        let mut out = [0u8; TIMESTAMP_LEN];
        out.copy_from_slice(&self.0.to_le_bytes()[..TIMESTAMP_LEN]);
        out
    }

    /// Parse a 5-byte little-endian field
    pub fn from_bytes(bytes: [u8; TIMESTAMP_LEN]) -> Self {
        let mut raw = [0u8; 8];
        raw[..TIMESTAMP_LEN].copy_from_slice(&bytes);
        Timestamp(u64::from_le_bytes(raw))
    }
}
