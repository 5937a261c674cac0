//! # UWB Bridge Library
//!
//! UWB ranging mesh node with a transparent PPRZ telemetry relay.
//!
//! Nodes measure their distance to a ranging anchor with double-sided
//! two-way ranging (DS-TWR) and tunnel the autopilot's PPRZ serial stream
//! across the radio link, so that UART-attached peers exchange packets
//! through the mesh as if wired together.

pub mod buffer;
pub mod config;
pub mod error;
pub mod node;
pub mod pprz;
pub mod radio;
pub mod ranging;
pub mod router;
pub mod serial;
pub mod telemetry;
