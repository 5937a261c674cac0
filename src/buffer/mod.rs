//! # Buffer Module
//!
//! Byte queues decoupling interrupt-style producers (UART reader, radio
//! worker) from the main service loop.

pub mod ring;

pub use ring::{ring_buffer, RingConsumer, RingProducer, RING_CAPACITY};
