//! # Telemetry Module
//!
//! Local record of range results.
//!
//! This module handles:
//! - Formatting delivered range reports as JSONL (JSON Lines)
//! - Writing to rotating log files
//! - Managing file rotation (max N records per file)
//! - Retaining only last M files
//!
//! The PPRZ `RANGE_REPORT` packet sent to the autopilot is built by
//! [`crate::pprz::encoder`]; this module only keeps the on-disk copy.

pub mod range_log;

pub use range_log::RangeLogger;
