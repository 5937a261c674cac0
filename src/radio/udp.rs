//! Host radio over UDP
//!
//! Stands in for the UWB transceiver when running nodes on a workstation:
//! every configured peer is a node "in range", each datagram is one frame.
//! Timestamps come from the host monotonic clock scaled to the 63.8976 GHz
//! radio counter. Like the real chip, the receiver is one-shot: a received
//! frame disarms it until [`RadioHal::arm_receive`] is called again, and
//! datagrams arriving while disarmed are lost.

use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use super::frame::FRAME_MAX_LEN;
use super::hal::{EventSender, RadioEvent, RadioHal, RadioSettings};
use super::time::{Timestamp, TIME_MAX};
use crate::error::{Result, UwbBridgeError};

/// Radio counter ticks per 10 µs (63.8976 ticks/ns)
const TICKS_PER_10_US: u128 = 638_976;

#[derive(Debug, Clone, Copy)]
struct RadioClock {
    epoch: Instant,
}

impl RadioClock {
    fn now(&self) -> Timestamp {
        let ticks = self.epoch.elapsed().as_nanos() * TICKS_PER_10_US / 10_000;
        Timestamp::wrapping((ticks % (TIME_MAX as u128 + 1)) as u64)
    }
}

#[derive(Debug, Default)]
struct RxLatch {
    armed: bool,
    data: Vec<u8>,
    rx_time: Timestamp,
}

/// UDP-backed implementation of [`RadioHal`]
pub struct UdpRadio {
    socket: UdpSocket,
    peers: Vec<SocketAddr>,
    latch: Arc<Mutex<RxLatch>>,
    events: EventSender,
    clock: RadioClock,
    tx_time: Timestamp,
    settings: Option<RadioSettings>,
}

impl std::fmt::Debug for UdpRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpRadio")
            .field("local", &self.socket.local_addr().ok())
            .field("peers", &self.peers)
            .finish_non_exhaustive()
    }
}

impl UdpRadio {
    /// Bind `bind` and start the receive thread
    ///
    /// # Errors
    ///
    /// Returns error if the socket cannot be bound or the thread spawned
    pub fn open(bind: SocketAddr, peers: Vec<SocketAddr>, events: EventSender) -> Result<Self> {
        let socket = UdpSocket::bind(bind)
            .map_err(|e| UwbBridgeError::Radio(format!("Failed to bind {}: {}", bind, e)))?;
        let listener = socket.try_clone()?;

        let latch = Arc::new(Mutex::new(RxLatch::default()));
        let clock = RadioClock { epoch: Instant::now() };

        let rx_latch = Arc::clone(&latch);
        let rx_events = events.clone();
        std::thread::Builder::new()
            .name("udp-radio-rx".to_string())
            .spawn(move || receive_loop(listener, rx_latch, rx_events, clock))?;

        info!("UDP radio bound to {} with {} peer(s)", socket.local_addr()?, peers.len());

        Ok(Self {
            socket,
            peers,
            latch,
            events,
            clock,
            tx_time: Timestamp::default(),
            settings: None,
        })
    }

    /// Address the radio is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn add_peer(&mut self, peer: SocketAddr) {
        self.peers.push(peer);
    }

    fn latch(&self) -> std::sync::MutexGuard<'_, RxLatch> {
        self.latch.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn receive_loop(
    socket: UdpSocket,
    latch: Arc<Mutex<RxLatch>>,
    events: EventSender,
    clock: RadioClock,
) {
    let mut buf = [0u8; 128];

    loop {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) => {
                warn!("UDP radio receive failed: {}", e);
                if events.is_closed() {
                    return;
                }
                continue;
            }
        };
        let rx_time = clock.now();

        {
            let mut latch = latch.lock().unwrap_or_else(PoisonError::into_inner);
            if !latch.armed {
                trace!("receiver not armed, lost {} bytes from {}", len, from);
                continue;
            }
            latch.armed = false;
            latch.data = buf[..len].to_vec();
            latch.rx_time = rx_time;
        }

        if events.send(RadioEvent::FrameReceived).is_err() {
            debug!("radio event queue closed, stopping receiver");
            return;
        }
    }
}

impl RadioHal for UdpRadio {
    fn reset(&mut self) -> Result<()> {
        *self.latch() = RxLatch::default();
        self.settings = None;
        Ok(())
    }

    fn configure(&mut self, settings: &RadioSettings) -> Result<()> {
        debug!("UDP radio configured: {:?}", settings);
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn transmit(&mut self, data: &[u8]) -> Result<()> {
        if self.settings.is_none() {
            return Err(UwbBridgeError::Radio("transmit before configure".to_string()));
        }

        self.tx_time = self.clock.now();
        for peer in &self.peers {
            self.socket
                .send_to(data, peer)
                .map_err(|e| UwbBridgeError::Radio(format!("Failed to send to {}: {}", peer, e)))?;
        }

        self.events
            .send(RadioEvent::TxComplete)
            .map_err(|_| UwbBridgeError::Radio("radio event queue closed".to_string()))
    }

    fn arm_receive(&mut self) -> Result<()> {
        self.latch().armed = true;
        Ok(())
    }

    fn read_received(&mut self, buf: &mut [u8]) -> Result<usize> {
        let latch = self.latch();
        let len = latch.data.len().min(buf.len()).min(FRAME_MAX_LEN);
        buf[..len].copy_from_slice(&latch.data[..len]);
        Ok(len)
    }

    fn tx_timestamp(&mut self) -> Result<Timestamp> {
        Ok(self.tx_time)
    }

    fn rx_timestamp(&mut self) -> Result<Timestamp> {
        Ok(self.latch().rx_time)
    }
}
