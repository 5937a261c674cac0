//! Radio HAL abstraction
//!
//! The transceiver driver is a black box behind [`RadioHal`]. Interrupts are
//! not delivered as callbacks: the driver posts [`RadioEvent`]s onto a channel
//! drained by the single radio worker.

use tokio::sync::mpsc;

use super::time::Timestamp;
use crate::error::Result;

/// Events raised by the transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent {
    /// A transmission finished; the TX timestamp is latched
    TxComplete,
    /// A frame was received; data and RX timestamp are latched
    FrameReceived,
}

/// Producer side of the radio event queue
pub type EventSender = mpsc::UnboundedSender<RadioEvent>;

/// Consumer side of the radio event queue
pub type EventReceiver = mpsc::UnboundedReceiver<RadioEvent>;

/// PHY parameters passed through to the driver unchanged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioSettings {
    pub channel: u8,
    pub preamble_code: u8,
    pub mode: String,
}

/// Operations the core needs from the transceiver driver
#[cfg_attr(test, mockall::automock)]
pub trait RadioHal: Send {
    /// Hardware reset
    fn reset(&mut self) -> Result<()>;

    /// Apply channel, preamble and mode
    fn configure(&mut self, settings: &RadioSettings) -> Result<()>;

    /// Start transmitting `data`; completion is signalled by [`RadioEvent::TxComplete`]
    fn transmit(&mut self, data: &[u8]) -> Result<()>;

    /// Enable the receiver for one frame
    fn arm_receive(&mut self) -> Result<()>;

    /// Copy the last received frame into `buf`, returning its length
    fn read_received(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Timestamp latched at the last transmission
    fn tx_timestamp(&mut self) -> Result<Timestamp>;

    /// Timestamp latched at the last reception
    fn rx_timestamp(&mut self) -> Result<Timestamp>;
}
