//! # Radio Module
//!
//! Everything between the mesh logic and the UWB transceiver.
//!
//! This module handles:
//! - 40-bit hardware timestamps and wraparound arithmetic
//! - On-air frame encoding and decoding
//! - The radio HAL boundary and its event queue
//! - Serialised access to the radio and ranging state
//! - A UDP stand-in transceiver for host testing

pub mod coordinator;
pub mod frame;
pub mod hal;
pub mod time;
pub mod udp;

pub use coordinator::{RadioCoordinator, RadioSession};
pub use frame::{Frame, FrameType};
pub use hal::{EventReceiver, EventSender, RadioEvent, RadioHal, RadioSettings};
pub use time::Timestamp;
