//! # Node Runtime
//!
//! Two cooperating activities share the radio through a
//! [`RadioCoordinator`]:
//!
//! - the radio worker ([`run_radio_worker`]) drains radio events in order and
//!   drives the [`Router`]
//! - the main loop ([`Node::run_until`]) relays UART packets onto the radio,
//!   forwards relayed packets and range reports to the UART, and fires the
//!   ranging and discovery timers
//!
//! The radio lock is only taken inside synchronous sections and is never
//! held across an `.await`.
//!
//! The worker's ranging replies take precedence on air. Main-loop
//! transmissions (relay chunks, polls, pings) wait until the previous
//! frame's TX-complete has been handled, so they never take over the
//! timestamps a reply is waiting for.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::buffer::RingConsumer;
use crate::config::Config;
use crate::error::{Result, UwbBridgeError};
use crate::pprz::decoder::PprzScanner;
use crate::pprz::encoder::encode_range_report;
use crate::pprz::protocol::RangeReport;
use crate::radio::frame::{BROADCAST, FRAME_MAX_PAYLOAD};
use crate::radio::{EventReceiver, FrameType, RadioCoordinator, RadioEvent, RadioHal};
use crate::router::Router;
use crate::serial::SerialPortIO;
use crate::telemetry::RangeLogger;

/// Main loop service period for the ring buffers
const SERVICE_INTERVAL: Duration = Duration::from_millis(1);

/// UART packets waiting for the radio
const RELAY_QUEUE_PACKETS: usize = 16;

/// Period of the status log line
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// Receiving end of the router's range report channel
pub type ReportReceiver = mpsc::UnboundedReceiver<RangeReport>;

/// Run the radio worker until the event queue closes
///
/// Returns the router so its counters can be inspected.
pub async fn run_radio_worker<H>(
    coordinator: RadioCoordinator<H>,
    mut router: Router,
    mut events: EventReceiver,
) -> Router
where
    H: RadioHal + 'static,
{
    let mut status = interval(STATUS_INTERVAL);
    status.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => handle_event(&coordinator, &mut router, event),
                None => break,
            },

            _ = status.tick() => {
                let stats = router.stats();
                info!(
                    "Radio: {} frames, {} ranges, {} reports, {} known nodes, {} relay bytes dropped",
                    stats.frames,
                    stats.ranges_computed,
                    stats.reports_delivered,
                    router.registry().len(),
                    stats.relay_dropped
                );
            }
        }
    }

    info!("Radio event queue closed, worker stopping");
    router
}

/// Process one radio event under the radio lock
pub fn handle_event<H: RadioHal>(
    coordinator: &RadioCoordinator<H>,
    router: &mut Router,
    event: RadioEvent,
) {
    let mut radio = coordinator.lock();
    let result = match event {
        RadioEvent::TxComplete => radio.on_tx_complete(),
        RadioEvent::FrameReceived => router.on_frame_received(&mut radio),
    };

    if let Err(e) = result {
        warn!("Radio event {:?} failed: {}", event, e);
    }
}

/// Main loop counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeStats {
    pub uart_packets: u64,
    pub relay_frames: u64,
    /// UART packets dropped because the relay queue was full
    pub relay_overflows: u64,
    pub radio_packets: u64,
    pub reports_written: u64,
    pub polls: u64,
    pub pings: u64,
    pub radio_errors: u64,
}

/// Byte streams and channels the main loop services
pub struct NodeIo<S> {
    /// Filled by the UART reader
    pub uart_in: RingConsumer,
    /// Filled by the router with relayed payloads
    pub radio_in: RingConsumer,
    pub uart_out: S,
    pub reports: ReportReceiver,
}

/// Main service loop state
pub struct Node<H, S> {
    local_address: u8,
    anchor_address: u8,
    initiator: bool,
    poll_interval: Duration,
    discovery_interval: Option<Duration>,
    coordinator: RadioCoordinator<H>,
    io: NodeIo<S>,
    uart_scanner: PprzScanner,
    radio_scanner: PprzScanner,
    /// Packets not yet fully on air, and how much of the front one was sent
    relay_queue: VecDeque<Vec<u8>>,
    relay_offset: usize,
    poll_due: bool,
    ping_due: bool,
    range_log: Option<RangeLogger>,
    stats: NodeStats,
}

impl<H, S> Node<H, S>
where
    H: RadioHal,
    S: SerialPortIO,
{
    pub fn new(
        config: &Config,
        coordinator: RadioCoordinator<H>,
        io: NodeIo<S>,
        range_log: Option<RangeLogger>,
    ) -> Self {
        let discovery_interval = match config.node.discovery_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Self {
            local_address: config.node.address,
            anchor_address: config.node.anchor_address,
            initiator: config.is_initiator(),
            poll_interval: Duration::from_micros(config.ranging.poll_interval_us),
            discovery_interval,
            coordinator,
            io,
            uart_scanner: PprzScanner::new(),
            radio_scanner: PprzScanner::new(),
            relay_queue: VecDeque::new(),
            relay_offset: 0,
            poll_due: false,
            ping_due: false,
            range_log,
            stats: NodeStats::default(),
        }
    }

    /// Returns `true` if this node polls the anchor
    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    /// UART-side parser counters
    pub fn uart_scanner(&self) -> &PprzScanner {
        &self.uart_scanner
    }

    /// Radio-side parser counters
    pub fn radio_scanner(&self) -> &PprzScanner {
        &self.radio_scanner
    }

    /// Queue every complete UART packet for the mesh and send the next chunk
    ///
    /// Packets go out as `DATA_RELAY` frames of at most 15 bytes, in order.
    /// At most one frame is handed over per call, and only once the radio
    /// has finished its previous transmission. Returns the number of packets
    /// queued.
    pub fn relay_uart_packets(&mut self) -> usize {
        let mut queued = 0;

        while let Some(packet) = self.uart_scanner.next_packet(&mut self.io.uart_in) {
            self.stats.uart_packets += 1;
            if self.relay_queue.len() >= RELAY_QUEUE_PACKETS {
                warn!("Relay queue full, dropping {}-byte UART packet", packet.len());
                self.stats.relay_overflows += 1;
                continue;
            }
            self.relay_queue.push_back(packet);
            queued += 1;
        }

        self.send_relay_chunk();
        queued
    }

    /// Packets still (partly) waiting for the radio
    pub fn pending_relay(&self) -> usize {
        self.relay_queue.len()
    }

    fn send_relay_chunk(&mut self) {
        let Some(packet) = self.relay_queue.front() else {
            return;
        };
        let mut radio = self.coordinator.lock();
        if radio.is_transmitting() {
            trace!("Radio busy, holding relay chunk");
            return;
        }

        let end = (self.relay_offset + FRAME_MAX_PAYLOAD).min(packet.len());
        let chunk = packet[self.relay_offset..end].to_vec();
        match radio.send(BROADCAST, FrameType::DataRelay, chunk) {
            Ok(_) => {
                self.stats.relay_frames += 1;
                self.relay_offset = end;
            }
            Err(e) => {
                // The rest of the packet is useless to receivers
                warn!("Failed to relay {}-byte packet: {}", packet.len(), e);
                self.stats.radio_errors += 1;
                self.relay_offset = packet.len();
            }
        }

        if self.relay_offset >= packet.len() {
            self.relay_queue.pop_front();
            self.relay_offset = 0;
        }
    }

    /// Write every complete relayed packet to the autopilot
    ///
    /// # Errors
    ///
    /// Returns error if the UART write fails
    pub async fn forward_radio_packets(&mut self) -> Result<usize> {
        let mut forwarded = 0;

        while let Some(packet) = self.radio_scanner.next_packet(&mut self.io.radio_in) {
            self.io.uart_out.write_all(&packet).await.map_err(|e| {
                UwbBridgeError::Serial(format!("Failed to write relayed packet: {}", e))
            })?;
            self.stats.radio_packets += 1;
            forwarded += 1;
        }

        if forwarded > 0 {
            self.flush_uart().await?;
            debug!("Forwarded {} relayed packet(s) to UART", forwarded);
        }
        Ok(forwarded)
    }

    /// Send a range result to the autopilot as a PPRZ `RANGE_REPORT`
    ///
    /// # Errors
    ///
    /// Returns error if the UART write fails. A failing range log is only
    /// reported.
    pub async fn deliver_report(&mut self, report: RangeReport) -> Result<()> {
        let packet = encode_range_report(self.local_address, &report);
        self.io.uart_out.write_all(&packet).await.map_err(|e| {
            UwbBridgeError::Serial(format!("Failed to write range report: {}", e))
        })?;
        self.flush_uart().await?;
        self.stats.reports_written += 1;

        if let Some(log) = self.range_log.as_mut() {
            if let Err(e) = log.record(&report) {
                warn!("Failed to log range report: {}", e);
            }
        }
        Ok(())
    }

    /// Start a ranging exchange with the anchor
    ///
    /// Returns `Ok(false)` if the radio is still transmitting; the poll is
    /// then retried on the next service tick.
    pub fn poll_anchor(&mut self) -> Result<bool> {
        let mut radio = self.coordinator.lock();
        if radio.is_transmitting() {
            debug!("Radio busy, deferring poll of anchor {}", self.anchor_address);
            self.poll_due = true;
            return Ok(false);
        }

        self.poll_due = false;
        radio.begin_ranging(self.anchor_address)?;
        self.stats.polls += 1;
        Ok(true)
    }

    /// Broadcast a discovery `PING`
    ///
    /// Deferred like [`Node::poll_anchor`] while the radio is busy.
    pub fn announce(&mut self) -> Result<bool> {
        let mut radio = self.coordinator.lock();
        if radio.is_transmitting() {
            debug!("Radio busy, deferring discovery ping");
            self.ping_due = true;
            return Ok(false);
        }

        self.ping_due = false;
        radio.send(BROADCAST, FrameType::Ping, Vec::new())?;
        self.stats.pings += 1;
        Ok(true)
    }

    /// Service both ring buffers once, after any deferred poll or ping
    pub async fn service(&mut self) -> Result<()> {
        if self.poll_due {
            self.try_poll();
        }
        if self.ping_due {
            self.try_announce();
        }
        self.relay_uart_packets();
        self.forward_radio_packets().await?;
        Ok(())
    }

    fn try_poll(&mut self) {
        if let Err(e) = self.poll_anchor() {
            warn!("Failed to poll anchor {}: {}", self.anchor_address, e);
            self.stats.radio_errors += 1;
        }
    }

    fn try_announce(&mut self) {
        if let Err(e) = self.announce() {
            warn!("Failed to send discovery ping: {}", e);
            self.stats.radio_errors += 1;
        }
    }

    /// Run until `shutdown` completes or the radio worker goes away
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<NodeStats>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut discovery = interval(self.discovery_interval.unwrap_or(STATUS_INTERVAL));
        discovery.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let discovery_enabled = self.discovery_interval.is_some();
        let mut service = interval(SERVICE_INTERVAL);
        service.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut status = interval(STATUS_INTERVAL);
        status.set_missed_tick_behavior(MissedTickBehavior::Skip);

        if self.initiator {
            info!(
                "Node {} ranging with anchor {} every {:?}",
                self.local_address, self.anchor_address, self.poll_interval
            );
        } else {
            info!("Node {} not initiating ranging", self.local_address);
        }

        loop {
            tokio::select! {
                _ = poll.tick(), if self.initiator => self.try_poll(),

                _ = discovery.tick(), if discovery_enabled => self.try_announce(),

                _ = service.tick() => {
                    if let Err(e) = self.service().await {
                        warn!("UART service failed: {}", e);
                    }
                }

                report = self.io.reports.recv() => match report {
                    Some(report) => {
                        if let Err(e) = self.deliver_report(report).await {
                            warn!("{}", e);
                        }
                    }
                    None => {
                        warn!("Radio worker stopped, shutting down");
                        break;
                    }
                },

                _ = status.tick() => self.log_status(),

                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.log_status();
        Ok(self.stats)
    }

    fn log_status(&self) {
        info!(
            "UART: {} packets in ({} resyncs, {} bytes skipped, {} dropped, {} packets over queue), {} relayed out, {} reports written",
            self.stats.uart_packets,
            self.uart_scanner.resyncs(),
            self.uart_scanner.discarded(),
            self.io.uart_in.dropped(),
            self.stats.relay_overflows,
            self.stats.radio_packets,
            self.stats.reports_written
        );
    }

    async fn flush_uart(&mut self) -> Result<()> {
        self.io
            .uart_out
            .flush()
            .await
            .map_err(|e| UwbBridgeError::Serial(format!("Failed to flush UART: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ring_buffer, RingProducer};
    use crate::pprz::decoder::{decode_packet, decode_range_report};
    use crate::pprz::encoder::encode_message;
    use crate::radio::frame::Frame;
    use crate::radio::hal::mocks::SimRadio;
    use crate::radio::time::Timestamp;
    use crate::radio::RadioSession;
    use crate::serial::port_trait::mocks::MockSerialPort;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
[node]
address = 2
anchor_address = 1
[ranging]
poll_interval_us = 1000
[radio]
[serial]
[telemetry]
enabled = false
"#;

    struct Harness {
        node: Node<SimRadio, MockSerialPort>,
        coordinator: RadioCoordinator<SimRadio>,
        uart: MockSerialPort,
        uart_in: RingProducer,
        radio_in: RingProducer,
        reports: mpsc::UnboundedSender<RangeReport>,
    }

    fn harness(config: &str, range_log: Option<RangeLogger>) -> Harness {
        let config = Config::from_toml(config).unwrap();
        let coordinator =
            RadioCoordinator::new(RadioSession::new(SimRadio::new(), config.node.address));
        let (uart_in, uart_rx) = ring_buffer(256);
        let (radio_in, radio_rx) = ring_buffer(256);
        let (reports, reports_rx) = mpsc::unbounded_channel();
        let uart = MockSerialPort::new();

        let io = NodeIo {
            uart_in: uart_rx,
            radio_in: radio_rx,
            uart_out: uart.clone(),
            reports: reports_rx,
        };

        Harness {
            node: Node::new(&config, coordinator.clone(), io, range_log),
            coordinator,
            uart,
            uart_in,
            radio_in,
            reports,
        }
    }

    /// Finish the radio's pending transmission, if any
    fn complete_tx(coordinator: &RadioCoordinator<SimRadio>) -> bool {
        let mut radio = coordinator.lock();
        if !radio.is_transmitting() {
            return false;
        }
        radio.on_tx_complete().unwrap();
        true
    }

    /// Relay until the queue is empty, completing each transmission
    fn relay_all(h: &mut Harness) -> usize {
        let mut queued = h.node.relay_uart_packets();
        while complete_tx(&h.coordinator) {
            queued += h.node.relay_uart_packets();
        }
        queued
    }

    fn transmitted_frames(coordinator: &RadioCoordinator<SimRadio>) -> Vec<Frame> {
        coordinator
            .lock()
            .hal()
            .transmitted
            .iter()
            .map(|bytes| Frame::decode(bytes).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_worker_answers_ping_and_rearms_on_tx_complete() {
        let coordinator = RadioCoordinator::new(RadioSession::new(SimRadio::new(), 4));
        let (relay, _relay_out) = ring_buffer(16);
        let (reports, _reports_rx) = mpsc::unbounded_channel();
        let router = Router::new(4, 0.0, relay, reports);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        {
            let ping = Frame::new(9, 255, FrameType::Ping, 0, vec![]).unwrap().encode();
            coordinator.lock().hal_mut().deliver(&ping, Timestamp::default());
        }
        events_tx.send(RadioEvent::FrameReceived).unwrap();
        events_tx.send(RadioEvent::TxComplete).unwrap();
        drop(events_tx);

        let router = run_radio_worker(coordinator.clone(), router, events_rx).await;

        let frames = transmitted_frames(&coordinator);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind(), Some(FrameType::Pong));
        assert_eq!(frames[0].dest, 9);
        assert!(coordinator.lock().hal().armed);
        assert_eq!(router.stats().frames, 1);
    }

    #[tokio::test]
    async fn test_worker_survives_failing_event() {
        let coordinator = RadioCoordinator::new(RadioSession::new(SimRadio::new(), 4));
        let (relay, _relay_out) = ring_buffer(16);
        let (reports, _reports_rx) = mpsc::unbounded_channel();
        let router = Router::new(4, 0.0, relay, reports);

        // Nothing latched: the frame is too short to decode
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        events_tx.send(RadioEvent::FrameReceived).unwrap();
        events_tx.send(RadioEvent::FrameReceived).unwrap();
        drop(events_tx);

        let router = run_radio_worker(coordinator.clone(), router, events_rx).await;
        assert_eq!(router.stats().undecodable, 2);
        assert_eq!(coordinator.lock().hal().arm_count, 2);
    }

    #[test]
    fn test_long_uart_packet_is_chunked_to_broadcast() {
        let mut h = harness(CONFIG, None);
        let packet = encode_message(7, 12, &[0x55; 20]).unwrap();
        assert_eq!(packet.len(), 26);

        h.uart_in.push_slice(&[0x00, 0x42]);
        h.uart_in.push_slice(&packet);

        assert_eq!(h.node.relay_uart_packets(), 1);

        // The second chunk waits for the first one's TX-complete
        assert_eq!(transmitted_frames(&h.coordinator).len(), 1);
        assert_eq!(h.node.relay_uart_packets(), 0);
        assert_eq!(transmitted_frames(&h.coordinator).len(), 1);

        assert_eq!(relay_all(&mut h), 0);
        assert_eq!(h.node.pending_relay(), 0);

        let frames = transmitted_frames(&h.coordinator);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.dest == BROADCAST));
        assert!(frames.iter().all(|f| f.kind() == Some(FrameType::DataRelay)));
        assert_eq!(frames[0].payload.len(), 15);
        assert_eq!(frames[1].payload.len(), 11);
        assert_eq!(frames[1].seq, frames[0].seq.wrapping_add(1));

        let rebuilt: Vec<u8> = frames.iter().flat_map(|f| f.payload.clone()).collect();
        assert_eq!(rebuilt, packet);
        assert_eq!(h.node.uart_scanner().discarded(), 2);
    }

    #[test]
    fn test_partial_uart_packet_waits() {
        let mut h = harness(CONFIG, None);
        let packet = encode_message(7, 12, &[1, 2, 3]).unwrap();

        h.uart_in.push_slice(&packet[..5]);
        assert_eq!(h.node.relay_uart_packets(), 0);

        h.uart_in.push_slice(&packet[5..]);
        assert_eq!(h.node.relay_uart_packets(), 1);
        assert_eq!(transmitted_frames(&h.coordinator)[0].payload, packet);
    }

    #[tokio::test]
    async fn test_relay_across_two_nodes() {
        let mut sender = harness(CONFIG, None);
        let mut receiver = harness(CONFIG.replace("address = 2", "address = 3").as_str(), None);

        let packet = encode_message(7, 12, &[0xA5; 30]).unwrap();
        sender.uart_in.push_slice(&packet);
        assert_eq!(relay_all(&mut sender), 1);

        // Feed every chunk through the receiving node's router
        let (reports, _reports_rx) = mpsc::unbounded_channel();
        let relay = std::mem::replace(&mut receiver.radio_in, ring_buffer(1).0);
        let mut router = Router::new(3, 0.0, relay, reports);
        let chunks = sender.coordinator.lock().hal().transmitted.clone();
        assert_eq!(chunks.len(), 3);
        for chunk in chunks {
            receiver.coordinator.lock().hal_mut().deliver(&chunk, Timestamp::default());
            handle_event(&receiver.coordinator, &mut router, RadioEvent::FrameReceived);
        }

        assert_eq!(receiver.node.forward_radio_packets().await.unwrap(), 1);
        assert_eq!(receiver.uart.get_stream(), packet);
        assert_eq!(receiver.uart.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_corrupted_relay_is_not_forwarded() {
        let mut h = harness(CONFIG, None);
        let mut packet = encode_message(7, 12, &[1, 2, 3]).unwrap();
        let last = packet.len() - 1;
        packet[last] ^= 0xFF;

        h.radio_in.push_slice(&packet);
        assert_eq!(h.node.forward_radio_packets().await.unwrap(), 0);
        assert!(h.uart.get_written_data().is_empty());
        assert!(h.node.radio_scanner().resyncs() >= 1);
    }

    #[tokio::test]
    async fn test_deliver_report_writes_pprz_and_logs() {
        let dir = TempDir::new().unwrap();
        let log = RangeLogger::new(dir.path(), 10, 2).unwrap();
        let mut h = harness(CONFIG, Some(log));

        let report = RangeReport { src: 2, dest: 1, range: 1.5 };
        h.node.deliver_report(report).await.unwrap();

        let stream = h.uart.get_stream();
        let packet = decode_packet(&stream).unwrap();
        assert_eq!(packet.sender_id, 2);
        assert_eq!(decode_range_report(&packet.payload).unwrap(), report);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(h.node.stats().reports_written, 1);
    }

    #[tokio::test]
    async fn test_deliver_report_uart_failure() {
        let mut h = harness(CONFIG, None);
        h.uart.set_write_error(std::io::ErrorKind::BrokenPipe);

        let report = RangeReport { src: 2, dest: 1, range: 1.5 };
        assert!(matches!(
            h.node.deliver_report(report).await,
            Err(UwbBridgeError::Serial(_))
        ));
    }

    #[test]
    fn test_poll_anchor_sends_range_poll() {
        let mut h = harness(CONFIG, None);
        assert!(h.node.is_initiator());

        assert!(h.node.poll_anchor().unwrap());

        let frames = transmitted_frames(&h.coordinator);
        assert_eq!(frames[0].kind(), Some(FrameType::RangePoll));
        assert_eq!((frames[0].src, frames[0].dest), (2, 1));
    }

    #[test]
    fn test_anchor_is_not_initiator() {
        let h = harness(&CONFIG.replace("address = 2", "address = 1"), None);
        assert!(!h.node.is_initiator());
    }

    #[test]
    fn test_announce_broadcasts_ping() {
        let mut h = harness(CONFIG, None);
        assert!(h.node.announce().unwrap());

        let frames = transmitted_frames(&h.coordinator);
        assert_eq!(frames[0].kind(), Some(FrameType::Ping));
        assert_eq!(frames[0].dest, BROADCAST);
    }

    #[test]
    fn test_relay_overflow_drops_whole_packets() {
        let mut h = harness(CONFIG, None);
        let packet = encode_message(7, 12, &[1]).unwrap();

        // Radio stays busy, nothing leaves the queue
        h.coordinator.lock().send(9, FrameType::Pong, vec![]).unwrap();
        for _ in 0..RELAY_QUEUE_PACKETS + 2 {
            h.uart_in.push_slice(&packet);
            h.node.relay_uart_packets();
        }

        assert_eq!(h.node.pending_relay(), RELAY_QUEUE_PACKETS);
        assert_eq!(h.node.stats().relay_overflows, 2);
        assert_eq!(h.node.stats().uart_packets, RELAY_QUEUE_PACKETS as u64 + 2);
    }

    #[test]
    fn test_relay_waits_for_ranging_reply_completion() {
        let mut h = harness(&CONFIG.replace("address = 2", "address = 1"), None);
        let (relay, _relay_out) = ring_buffer(64);
        let (reports, _reports_rx) = mpsc::unbounded_channel();
        let mut router = Router::new(1, 0.0, relay, reports);

        // Poll from node 2 lands at 5000; the worker answers
        let poll = Frame::new(2, 1, FrameType::RangePoll, 0, vec![]).unwrap().encode();
        h.coordinator.lock().hal_mut().deliver(&poll, Timestamp::new(5_000).unwrap());
        handle_event(&h.coordinator, &mut router, RadioEvent::FrameReceived);
        assert_eq!(transmitted_frames(&h.coordinator).len(), 1);

        // The main loop has a packet ready before the response went out
        h.uart_in.push_slice(&encode_message(7, 12, &[4, 5, 6]).unwrap());
        assert_eq!(h.node.relay_uart_packets(), 1);
        assert_eq!(transmitted_frames(&h.coordinator).len(), 1);

        h.coordinator.lock().hal_mut().tx_time = Timestamp::new(5_400).unwrap();
        handle_event(&h.coordinator, &mut router, RadioEvent::TxComplete);
        h.node.relay_uart_packets();
        handle_event(&h.coordinator, &mut router, RadioEvent::TxComplete);

        let kinds: Vec<_> = transmitted_frames(&h.coordinator).iter().map(Frame::kind).collect();
        assert_eq!(kinds, vec![Some(FrameType::RangeResponse), Some(FrameType::DataRelay)]);

        let radio = h.coordinator.lock();
        let stamps = radio.ranging().timestamps();
        assert_eq!(stamps.t_start_reply1.value(), 5_000);
        assert_eq!(stamps.t_end_reply1.value(), 5_400);
        assert!(!radio.is_transmitting());
    }

    #[tokio::test]
    async fn test_busy_radio_defers_poll_and_ping_to_service() {
        let mut h = harness(CONFIG, None);
        h.coordinator.lock().send(9, FrameType::Pong, vec![]).unwrap();

        assert!(!h.node.poll_anchor().unwrap());
        assert!(!h.node.announce().unwrap());
        h.node.service().await.unwrap();
        assert_eq!(transmitted_frames(&h.coordinator).len(), 1);

        // One frame per completed transmission: poll first, then ping
        complete_tx(&h.coordinator);
        h.node.service().await.unwrap();
        complete_tx(&h.coordinator);
        h.node.service().await.unwrap();

        let kinds: Vec<_> = transmitted_frames(&h.coordinator).iter().map(Frame::kind).collect();
        assert_eq!(
            kinds,
            vec![Some(FrameType::Pong), Some(FrameType::RangePoll), Some(FrameType::Ping)]
        );
        assert_eq!((h.node.stats().polls, h.node.stats().pings), (1, 1));

        // Nothing left to retry
        complete_tx(&h.coordinator);
        h.node.service().await.unwrap();
        assert_eq!(transmitted_frames(&h.coordinator).len(), 3);
    }

    #[tokio::test]
    async fn test_run_until_services_and_delivers() {
        let h = harness(CONFIG, None);
        let Harness { node, coordinator, uart, mut uart_in, reports, .. } = h;

        uart_in.push_slice(&encode_message(7, 12, &[9, 9]).unwrap());
        reports.send(RangeReport { src: 2, dest: 1, range: 3.0 }).unwrap();

        // Stands in for the radio worker's TX-complete handling
        let completer = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    complete_tx(&coordinator);
                }
            })
        };

        let stats = node
            .run_until(tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap();
        completer.abort();

        assert_eq!(stats.uart_packets, 1);
        assert_eq!(stats.reports_written, 1);
        assert!(stats.polls >= 1);
        assert!(stats.pings >= 1);
        assert!(!uart.get_written_data().is_empty());

        let kinds: Vec<_> = transmitted_frames(&coordinator).iter().map(Frame::kind).collect();
        assert!(kinds.contains(&Some(FrameType::DataRelay)));
        assert!(kinds.contains(&Some(FrameType::RangePoll)));
        drop(reports);
    }

    #[tokio::test]
    async fn test_run_stops_when_worker_goes_away() {
        let h = harness(CONFIG, None);
        let Harness { node, reports, .. } = h;
        drop(reports);

        // Would otherwise run for an hour
        let stats = node
            .run_until(tokio::time::sleep(Duration::from_secs(3600)))
            .await
            .unwrap();
        assert_eq!(stats.reports_written, 0);
    }
}
