//! # Double-Sided Two-Way Ranging
//!
//! Clock-offset-cancelling time-of-flight estimate from two round trips:
//!
//! ```text
//! tProp = (tRound1·tRound2 − tReply1·tReply2) / (tRound1 + tReply1 + tRound2 + tReply2)
//! ```

use crate::error::{Result, UwbBridgeError};
use crate::radio::time::COUNTER_FREQUENCY_HZ;

/// Speed of light in m/s
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// The four intervals of a DS-TWR exchange, in counter ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTimes {
    /// Initiator: poll TX → response RX
    pub round1: u64,
    /// Responder: poll RX → response TX
    pub reply1: u64,
    /// Responder: response TX → final RX
    pub round2: u64,
    /// Initiator: response RX → final TX
    pub reply2: u64,
}

impl RoundTimes {
    /// One-way propagation time in counter ticks
    ///
    /// Negative results are possible when the captures come from mismatched
    /// exchanges and are returned as is.
    ///
    /// # Errors
    ///
    /// Returns error if the four intervals sum to zero
    pub fn propagation_ticks(&self) -> Result<f64> {
        // Products of 40-bit values need more than 64 bits
        let numerator = self.round1 as i128 * self.round2 as i128
            - self.reply1 as i128 * self.reply2 as i128;
        let denominator =
            self.round1 as i128 + self.reply1 as i128 + self.round2 as i128 + self.reply2 as i128;

        if denominator <= 0 {
            return Err(UwbBridgeError::Ranging(format!(
                "degenerate denominator {} for {:?}",
                denominator, self
            )));
        }

        Ok(numerator as f64 / denominator as f64)
    }

    /// Calibrated distance in meters
    pub fn distance_m(&self, calibration_offset_m: f64) -> Result<f64> {
        Ok(ticks_to_meters(self.propagation_ticks()?) - calibration_offset_m)
    }
}

/// Convert counter ticks of flight time to meters
pub fn ticks_to_meters(ticks: f64) -> f64 {
    SPEED_OF_LIGHT * ticks / COUNTER_FREQUENCY_HZ
}
