//! # Radio Access Coordinator
//!
//! [`RadioSession`] owns the transceiver and the ranging captures.
//! [`RadioCoordinator`] is the shared handle through which the radio worker
//! and the main loop reach it; every access goes through one mutex.
//!
//! Receive discipline: a transmission re-arms the receiver from
//! [`RadioSession::on_tx_complete`], so a handler that replied must not be
//! required to re-arm. A handler that did not reply calls
//! [`RadioSession::arm_receive`] itself.
//!
//! Transmit discipline: ranging captures are read from the driver when a
//! TX-complete arrives, so a second frame handed over before then would take
//! them. The worker's replies always go out; main-loop senders check
//! [`RadioSession::is_transmitting`] first and retry later.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use super::frame::{Frame, FrameType, FRAME_MAX_LEN};
use super::hal::{RadioHal, RadioSettings};
use super::time::Timestamp;
use crate::error::Result;
use crate::ranging::RangingSession;

/// The radio resource and everything that must be accessed under its lock
pub struct RadioSession<H> {
    hal: H,
    local_address: u8,
    seq: u8,
    /// Transmissions whose TX-complete has not been handled yet
    tx_pending: u8,
    ranging: RangingSession,
}

impl<H: RadioHal> RadioSession<H> {
    /// Wrap a driver for the node at `local_address`
    pub fn new(hal: H, local_address: u8) -> Self {
        Self {
            hal,
            local_address,
            seq: 0,
            tx_pending: 0,
            ranging: RangingSession::new(),
        }
    }

    /// Reset and configure the transceiver, then start listening
    ///
    /// # Errors
    ///
    /// Any driver failure here leaves the radio unconfigured; callers must
    /// not continue with it.
    pub fn initialise(&mut self, settings: &RadioSettings) -> Result<()> {
        self.hal.reset()?;
        self.hal.configure(settings)?;
        self.ranging.reset();
        self.tx_pending = 0;
        self.hal.arm_receive()?;

        info!(
            "Radio ready: node {} on channel {} (preamble {}, mode {})",
            self.local_address, settings.channel, settings.preamble_code, settings.mode
        );
        Ok(())
    }

    pub fn local_address(&self) -> u8 {
        self.local_address
    }

    /// Sequence number the next frame will carry
    pub fn next_seq(&self) -> u8 {
        self.seq
    }

    /// A frame has been handed to the driver and its TX-complete is pending
    pub fn is_transmitting(&self) -> bool {
        self.tx_pending > 0
    }

    pub fn ranging(&self) -> &RangingSession {
        &self.ranging
    }

    pub fn ranging_mut(&mut self) -> &mut RangingSession {
        &mut self.ranging
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    /// Build, number and transmit a frame from this node
    pub fn send(&mut self, dest: u8, kind: FrameType, payload: Vec<u8>) -> Result<Frame> {
        let frame = Frame::new(self.local_address, dest, kind, self.seq, payload)?;
        self.hal.transmit(&frame.encode())?;
        self.seq = self.seq.wrapping_add(1);
        self.tx_pending = self.tx_pending.saturating_add(1);

        debug!(
            "TX {:?} seq={} -> {} ({} bytes)",
            kind,
            frame.seq,
            dest,
            frame.wire_len()
        );
        self.ranging.record_sent(frame.clone());
        Ok(frame)
    }

    /// Start a new ranging exchange towards `responder`
    pub fn begin_ranging(&mut self, responder: u8) -> Result<Frame> {
        self.ranging.reset();
        self.send(responder, FrameType::RangePoll, Vec::new())
    }

    pub fn arm_receive(&mut self) -> Result<()> {
        self.hal.arm_receive()
    }

    /// Handle a TX-complete event: latch ranging timestamps, then re-arm
    pub fn on_tx_complete(&mut self) -> Result<()> {
        self.tx_pending = self.tx_pending.saturating_sub(1);
        let captured = self.ranging.capture_tx_complete(&mut self.hal);
        let armed = self.hal.arm_receive();
        captured.and(armed)
    }

    /// Fetch and decode the frame latched by the driver
    pub fn receive_frame(&mut self) -> Result<Frame> {
        let mut buf = [0u8; FRAME_MAX_LEN];
        let len = self.hal.read_received(&mut buf)?;
        let frame = Frame::decode(&buf[..len.min(FRAME_MAX_LEN)])?;

        debug!(
            "RX type={} seq={} {} -> {} ({} payload bytes)",
            frame.frame_type,
            frame.seq,
            frame.src,
            frame.dest,
            frame.payload.len()
        );
        self.ranging.record_received(frame.clone());
        Ok(frame)
    }

    /// RX timestamp of the last received frame
    pub fn rx_timestamp(&mut self) -> Result<Timestamp> {
        self.hal.rx_timestamp()
    }
}

/// Shared, locked access to a [`RadioSession`]
pub struct RadioCoordinator<H> {
    inner: Arc<Mutex<RadioSession<H>>>,
}

impl<H> Clone for RadioCoordinator<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: RadioHal> RadioCoordinator<H> {
    pub fn new(session: RadioSession<H>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Block until the radio is free
    ///
    /// The session holds plain data, so a lock poisoned by a panicking holder
    /// is still usable.
    pub fn lock(&self) -> MutexGuard<'_, RadioSession<H>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
