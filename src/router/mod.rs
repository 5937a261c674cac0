//! # Packet Router
//!
//! Dispatches every received radio frame:
//!
//! - from our own address: duplicate-address anomaly, dropped
//! - to our address: ranging state machine, anything else as broadcast
//! - to broadcast (0 or 255): data relay, PING/PONG discovery
//! - to someone else: only overheard `RANGE_REPORT`s are used
//!
//! A handler that transmitted a reply leaves re-arming to the TX-complete
//! path; every other path re-arms the receiver before returning.

pub mod registry;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::buffer::RingProducer;
use crate::error::{Result, UwbBridgeError};
use crate::pprz::protocol::RangeReport;
use crate::radio::frame::{is_broadcast, Frame, FrameType};
use crate::radio::{RadioHal, RadioSession};

pub use registry::NodeRegistry;

/// Size of the distance field in a `RANGE_REPORT` frame
pub const REPORT_PAYLOAD_LEN: usize = 8;

/// Channel carrying range results to the telemetry output
pub type ReportSender = mpsc::UnboundedSender<RangeReport>;

/// Diagnostic counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouterStats {
    pub frames: u64,
    pub own_address_collisions: u64,
    pub undecodable: u64,
    pub unknown_types: u64,
    pub degenerate_ranges: u64,
    /// `RANGE_TRANSFER`s with no exchange waiting for them (duplicates included)
    pub unexpected_transfers: u64,
    pub ranges_computed: u64,
    pub reports_delivered: u64,
    pub relay_bytes: u64,
    pub relay_dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handled {
    /// A reply was transmitted; TX-complete re-arms
    Replied,
    /// Nothing sent; receiver must be re-armed
    Idle,
}

/// Receive-side dispatcher, owned by the radio worker
pub struct Router {
    local_address: u8,
    calibration_offset_m: f64,
    registry: NodeRegistry,
    relay: RingProducer,
    reports: ReportSender,
    stats: RouterStats,
}

impl Router {
    /// Create a router
    ///
    /// # Arguments
    ///
    /// * `local_address` - This node's address
    /// * `calibration_offset_m` - Subtracted from every computed distance
    /// * `relay` - Producer half of the radio → UART ring buffer
    /// * `reports` - Range results destined for local telemetry
    pub fn new(
        local_address: u8,
        calibration_offset_m: f64,
        relay: RingProducer,
        reports: ReportSender,
    ) -> Self {
        Self {
            local_address,
            calibration_offset_m,
            registry: NodeRegistry::new(),
            relay,
            reports,
            stats: RouterStats::default(),
        }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Handle a frame-received event
    ///
    /// The receiver is re-armed on every path that did not transmit, errors
    /// included.
    pub fn on_frame_received<H: RadioHal>(&mut self, radio: &mut RadioSession<H>) -> Result<()> {
        let handled = match radio.receive_frame() {
            Ok(frame) => self.route(radio, frame),
            Err(UwbBridgeError::Frame(reason)) => {
                warn!("Dropping undecodable frame: {}", reason);
                self.stats.undecodable += 1;
                Ok(Handled::Idle)
            }
            Err(e) => Err(e),
        };

        match handled {
            Ok(Handled::Replied) => Ok(()),
            Ok(Handled::Idle) => radio.arm_receive(),
            Err(e) => {
                radio.arm_receive()?;
                Err(e)
            }
        }
    }

    fn route<H: RadioHal>(&mut self, radio: &mut RadioSession<H>, frame: Frame) -> Result<Handled> {
        self.stats.frames += 1;

        if frame.src == self.local_address {
            warn!(
                "Received frame from our own address {} (duplicate address?), dropping",
                frame.src
            );
            self.stats.own_address_collisions += 1;
            return Ok(Handled::Idle);
        }

        if frame.dest == self.local_address {
            self.handle_own(radio, frame)
        } else if is_broadcast(frame.dest) {
            self.handle_broadcast(radio, frame)
        } else {
            Ok(self.handle_foreign(frame))
        }
    }

    fn handle_own<H: RadioHal>(&mut self, radio: &mut RadioSession<H>, frame: Frame) -> Result<Handled> {
        match frame.kind() {
            Some(FrameType::RangePoll) => {
                radio.ranging_mut().reset();
                radio.send(frame.src, FrameType::RangeResponse, Vec::new())?;
                Ok(Handled::Replied)
            }
            Some(FrameType::RangeResponse) => {
                radio.send(frame.src, FrameType::RangeFinal, Vec::new())?;
                Ok(Handled::Replied)
            }
            Some(FrameType::RangeFinal) => {
                let rx_time = radio.rx_timestamp()?;
                radio.ranging_mut().record_final_received(rx_time);
                let payload = radio.ranging().transfer_payload();
                radio.send(frame.src, FrameType::RangeTransfer, payload)?;
                Ok(Handled::Replied)
            }
            Some(FrameType::RangeTransfer) => self.complete_ranging(radio, &frame),
            Some(FrameType::RangeReport) => {
                self.deliver_from_frame(&frame);
                Ok(Handled::Idle)
            }
            _ => self.handle_broadcast(radio, frame),
        }
    }

    fn handle_broadcast<H: RadioHal>(
        &mut self,
        radio: &mut RadioSession<H>,
        frame: Frame,
    ) -> Result<Handled> {
        match frame.kind() {
            Some(FrameType::DataRelay) => {
                let stored = self.relay.push_slice(&frame.payload);
                self.stats.relay_bytes += stored as u64;
                if stored < frame.payload.len() {
                    let lost = frame.payload.len() - stored;
                    self.stats.relay_dropped += lost as u64;
                    warn!("Relay buffer full, dropped {} bytes from node {}", lost, frame.src);
                }
                Ok(Handled::Idle)
            }
            Some(FrameType::Ping) => {
                radio.send(frame.src, FrameType::Pong, Vec::new())?;
                Ok(Handled::Replied)
            }
            Some(FrameType::Pong) => {
                if self.registry.register(frame.src) {
                    info!("Discovered node {} ({} known)", frame.src, self.registry.len());
                }
                Ok(Handled::Idle)
            }
            _ => {
                debug!(
                    "Unhandled frame type {} from node {} to {}",
                    frame.frame_type, frame.src, frame.dest
                );
                self.stats.unknown_types += 1;
                Ok(Handled::Idle)
            }
        }
    }

    fn handle_foreign(&mut self, frame: Frame) -> Handled {
        if frame.kind() == Some(FrameType::RangeReport) {
            self.deliver_from_frame(&frame);
        } else {
            trace!(
                "Ignoring type {} frame {} -> {}",
                frame.frame_type,
                frame.src,
                frame.dest
            );
        }
        Handled::Idle
    }

    /// Initiator side: last message of the exchange
    ///
    /// The session is consumed here, so a repeated transfer is dropped
    /// instead of producing a second distance.
    fn complete_ranging<H: RadioHal>(
        &mut self,
        radio: &mut RadioSession<H>,
        frame: &Frame,
    ) -> Result<Handled> {
        let times = match radio.ranging_mut().complete_from_transfer(&frame.payload) {
            Ok(times) => times,
            Err(e) => {
                debug!("Ignoring transfer from node {}: {}", frame.src, e);
                self.stats.unexpected_transfers += 1;
                return Ok(Handled::Idle);
            }
        };
        let result = times.distance_m(self.calibration_offset_m);
        radio.ranging_mut().reset();

        let distance = match result {
            Ok(distance) => distance,
            Err(e) => {
                warn!("Ranging with node {} aborted: {}", frame.src, e);
                self.stats.degenerate_ranges += 1;
                return Ok(Handled::Idle);
            }
        };

        self.stats.ranges_computed += 1;
        info!("Range {} -> {}: {:.3} m", self.local_address, frame.src, distance);

        // We never hear our own report, so deliver it here, even if it
        // cannot be sent
        self.deliver(RangeReport {
            src: self.local_address,
            dest: frame.src,
            range: distance,
        });
        radio.send(frame.src, FrameType::RangeReport, distance.to_le_bytes().to_vec())?;
        Ok(Handled::Replied)
    }

    fn deliver_from_frame(&mut self, frame: &Frame) {
        let Some(raw) = frame.payload.get(..REPORT_PAYLOAD_LEN) else {
            warn!(
                "Range report from node {} too short: {} bytes",
                frame.src,
                frame.payload.len()
            );
            return;
        };

        let mut bytes = [0u8; REPORT_PAYLOAD_LEN];
        bytes.copy_from_slice(raw);
        self.deliver(RangeReport {
            src: frame.src,
            dest: frame.dest,
            range: f64::from_le_bytes(bytes),
        });
    }

    fn deliver(&mut self, report: RangeReport) {
        debug!("Delivering range report {:?}", report);
        if self.reports.send(report).is_err() {
            warn!("Telemetry output closed, range report lost");
            return;
        }
        self.stats.reports_delivered += 1;
    }
}
