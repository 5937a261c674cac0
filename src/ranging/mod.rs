//! # Ranging Module
//!
//! Four-message double-sided two-way ranging (DS-TWR):
//!
//! 1. initiator → responder `RANGE_POLL`
//! 2. responder → initiator `RANGE_RESPONSE`
//! 3. initiator → responder `RANGE_FINAL`
//! 4. responder → initiator `RANGE_TRANSFER` (responder timestamps)
//! 5. initiator → responder `RANGE_REPORT` (distance, overheard by everyone)

pub mod session;
pub mod twr;

pub use session::{DsTwrTimestamps, RangingSession};
pub use twr::RoundTimes;
