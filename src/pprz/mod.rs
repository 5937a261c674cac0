//! # PPRZ Protocol Module
//!
//! Implementation of the PPRZ serial telemetry framing tunneled over the
//! radio mesh.
//!
//! This module handles:
//! - Packet encoding with CKA/CKB checksums
//! - Ring buffer scanning with single-byte resync on framing errors
//! - Range report telemetry messages

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod checksum;
