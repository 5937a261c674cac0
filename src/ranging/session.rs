//! Ranging session state
//!
//! Holds the six timestamp captures of a single in-flight DS-TWR exchange.
//! There is no session identifier: the frame type of the last transmission
//! decides which captures a TX-complete event fills in, and a fresh
//! `RANGE_POLL` resets everything. The initiator's captures are consumed by
//! exactly one `RANGE_TRANSFER`.

use tracing::trace;

use super::twr::RoundTimes;
use crate::error::{Result, UwbBridgeError};
use crate::radio::frame::{Frame, FrameType};
use crate::radio::hal::RadioHal;
use crate::radio::time::{Timestamp, TIMESTAMP_LEN};

/// Payload size of a `RANGE_TRANSFER` frame: three raw timestamps
pub const TRANSFER_PAYLOAD_LEN: usize = 3 * TIMESTAMP_LEN;

/// Timestamp captures, named from the point of view of the exchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DsTwrTimestamps {
    /// Initiator: poll TX
    pub t_start_round1: Timestamp,
    /// Responder: poll RX
    pub t_start_reply1: Timestamp,
    /// Responder: response TX
    pub t_end_reply1: Timestamp,
    /// Responder: final RX
    pub t_end_round2: Timestamp,
    /// Initiator: response RX
    pub t_start_reply2: Timestamp,
    /// Initiator: final TX
    pub t_end_reply2: Timestamp,
}

impl DsTwrTimestamps {
    /// Wraparound-aware intervals
    pub fn round_times(&self) -> RoundTimes {
        RoundTimes {
            round1: self.t_start_reply2.ticks_since(self.t_start_round1),
            reply1: self.t_end_reply1.ticks_since(self.t_start_reply1),
            round2: self.t_end_round2.ticks_since(self.t_end_reply1),
            reply2: self.t_end_reply2.ticks_since(self.t_start_reply2),
        }
    }
}

/// State of the (single) ranging exchange this node takes part in
#[derive(Debug, Clone, Default)]
pub struct RangingSession {
    timestamps: DsTwrTimestamps,
    last_sent: Option<Frame>,
    last_received: Option<Frame>,
    /// Initiator captures are complete and no transfer has used them yet
    awaiting_transfer: bool,
}

impl RangingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero all captures
    pub fn reset(&mut self) {
        self.timestamps = DsTwrTimestamps::default();
        self.awaiting_transfer = false;
    }

    pub fn timestamps(&self) -> &DsTwrTimestamps {
        &self.timestamps
    }

    /// True between the `RANGE_FINAL` TX-complete and the transfer that uses it
    pub fn is_awaiting_transfer(&self) -> bool {
        self.awaiting_transfer
    }

    pub fn last_sent(&self) -> Option<&Frame> {
        self.last_sent.as_ref()
    }

    pub fn last_received(&self) -> Option<&Frame> {
        self.last_received.as_ref()
    }

    pub fn record_sent(&mut self, frame: Frame) {
        self.last_sent = Some(frame);
    }

    pub fn record_received(&mut self, frame: Frame) {
        self.last_received = Some(frame);
    }

    /// Latch the timestamps that belong to the transmission that just completed
    pub fn capture_tx_complete<H>(&mut self, hal: &mut H) -> Result<()>
    where
        H: RadioHal + ?Sized,
    {
        match self.last_sent.as_ref().and_then(Frame::kind) {
            Some(FrameType::RangePoll) => {
                self.timestamps.t_start_round1 = hal.tx_timestamp()?;
                trace!("captured tStartRound1={}", self.timestamps.t_start_round1.value());
            }
            Some(FrameType::RangeResponse) => {
                self.timestamps.t_start_reply1 = hal.rx_timestamp()?;
                self.timestamps.t_end_reply1 = hal.tx_timestamp()?;
                trace!(
                    "captured tStartReply1={} tEndReply1={}",
                    self.timestamps.t_start_reply1.value(),
                    self.timestamps.t_end_reply1.value()
                );
            }
            Some(FrameType::RangeFinal) => {
                self.timestamps.t_start_reply2 = hal.rx_timestamp()?;
                self.timestamps.t_end_reply2 = hal.tx_timestamp()?;
                self.awaiting_transfer = true;
                trace!(
                    "captured tStartReply2={} tEndReply2={}",
                    self.timestamps.t_start_reply2.value(),
                    self.timestamps.t_end_reply2.value()
                );
            }
            _ => {}
        }
        Ok(())
    }

    /// Responder: RX time of the `RANGE_FINAL` message
    pub fn record_final_received(&mut self, rx_time: Timestamp) {
        self.timestamps.t_end_round2 = rx_time;
    }

    /// Responder: `tStartReply1, tEndReply1, tEndRound2` back to back
    pub fn transfer_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(TRANSFER_PAYLOAD_LEN);
        payload.extend_from_slice(&self.timestamps.t_start_reply1.to_bytes());
        payload.extend_from_slice(&self.timestamps.t_end_reply1.to_bytes());
        payload.extend_from_slice(&self.timestamps.t_end_round2.to_bytes());
        payload
    }

    /// Initiator: merge the responder's timestamps and derive the intervals
    ///
    /// # Errors
    ///
    /// Returns error if no exchange is waiting for a transfer (a duplicate,
    /// or one whose `RANGE_FINAL` was never captured), or if the payload is
    /// shorter than three timestamps
    pub fn complete_from_transfer(&mut self, payload: &[u8]) -> Result<RoundTimes> {
        if !self.awaiting_transfer {
            return Err(UwbBridgeError::Ranging(
                "no exchange awaiting a transfer".to_string(),
            ));
        }
        if payload.len() < TRANSFER_PAYLOAD_LEN {
            return Err(UwbBridgeError::Ranging(format!(
                "transfer payload too short: {} bytes",
                payload.len()
            )));
        }

        let field = |i: usize| {
            let mut raw = [0u8; TIMESTAMP_LEN];
            raw.copy_from_slice(&payload[i * TIMESTAMP_LEN..(i + 1) * TIMESTAMP_LEN]);
            Timestamp::from_bytes(raw)
        };

        self.timestamps.t_start_reply1 = field(0);
        self.timestamps.t_end_reply1 = field(1);
        self.timestamps.t_end_round2 = field(2);
        self.awaiting_transfer = false;

        Ok(self.timestamps.round_times())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::hal::MockRadioHal;

    fn ts(v: u64) -> Timestamp {
        Timestamp::new(v).unwrap()
    }

    fn sent(kind: FrameType) -> Frame {
        Frame::new(1, 2, kind, 0, vec![]).unwrap()
    }

    #[test]
    fn test_poll_completion_captures_tx_only() {
        let mut hal = MockRadioHal::new();
        hal.expect_tx_timestamp().times(1).returning(|| Ok(Timestamp::new(500).unwrap()));
        hal.expect_rx_timestamp().never();

        let mut session = RangingSession::new();
        session.record_sent(sent(FrameType::RangePoll));
        session.capture_tx_complete(&mut hal).unwrap();

        assert_eq!(session.timestamps().t_start_round1, ts(500));
    }

    #[test]
    fn test_response_completion_captures_rx_and_tx() {
        let mut hal = MockRadioHal::new();
        hal.expect_rx_timestamp().times(1).returning(|| Ok(Timestamp::new(100).unwrap()));
        hal.expect_tx_timestamp().times(1).returning(|| Ok(Timestamp::new(600).unwrap()));

        let mut session = RangingSession::new();
        session.record_sent(sent(FrameType::RangeResponse));
        session.capture_tx_complete(&mut hal).unwrap();

        assert_eq!(session.timestamps().t_start_reply1, ts(100));
        assert_eq!(session.timestamps().t_end_reply1, ts(600));
    }

    #[test]
    fn test_other_completions_capture_nothing() {
        let mut hal = MockRadioHal::new();
        hal.expect_rx_timestamp().never();
        hal.expect_tx_timestamp().never();

        let mut session = RangingSession::new();
        session.capture_tx_complete(&mut hal).unwrap();

        session.record_sent(sent(FrameType::DataRelay));
        session.capture_tx_complete(&mut hal).unwrap();
        assert_eq!(*session.timestamps(), DsTwrTimestamps::default());
    }

    #[test]
    fn test_transfer_payload_round_trip() {
        let mut responder = RangingSession::new();
        responder.timestamps.t_start_reply1 = ts(1_000);
        responder.timestamps.t_end_reply1 = ts(1_400);
        responder.record_final_received(ts(2_400));

        let payload = responder.transfer_payload();
        assert_eq!(payload.len(), TRANSFER_PAYLOAD_LEN);

        let mut initiator = RangingSession::new();
        initiator.timestamps.t_start_round1 = ts(50_000);
        initiator.timestamps.t_start_reply2 = ts(51_000);
        initiator.timestamps.t_end_reply2 = ts(51_400);
        initiator.awaiting_transfer = true;

        let times = initiator.complete_from_transfer(&payload).unwrap();
        assert_eq!(times, RoundTimes { round1: 1_000, reply1: 400, round2: 1_000, reply2: 400 });
    }

    #[test]
    fn test_final_completion_arms_transfer_once() {
        let mut hal = MockRadioHal::new();
        hal.expect_rx_timestamp().times(1).returning(|| Ok(Timestamp::new(2_000).unwrap()));
        hal.expect_tx_timestamp().times(1).returning(|| Ok(Timestamp::new(2_400).unwrap()));

        let mut session = RangingSession::new();
        assert!(!session.is_awaiting_transfer());
        session.record_sent(sent(FrameType::RangeFinal));
        session.capture_tx_complete(&mut hal).unwrap();
        assert!(session.is_awaiting_transfer());

        let payload = [0u8; TRANSFER_PAYLOAD_LEN];
        assert!(session.complete_from_transfer(&payload).is_ok());
        assert!(!session.is_awaiting_transfer());

        // Same transfer again: the captures were already used
        assert!(session.complete_from_transfer(&payload).is_err());
    }

    #[test]
    fn test_transfer_without_final_is_error() {
        let mut session = RangingSession::new();
        let err = session.complete_from_transfer(&[0u8; TRANSFER_PAYLOAD_LEN]).unwrap_err();
        assert!(err.to_string().contains("no exchange"));
    }

    #[test]
    fn test_round_times_across_wrap() {
        let max = crate::radio::time::TIME_MAX;
        let stamps = DsTwrTimestamps {
            t_start_round1: ts(max - 9),
            t_start_reply2: ts(990),
            t_end_reply2: ts(1_390),
            t_start_reply1: ts(max - 99),
            t_end_reply1: ts(300),
            t_end_round2: ts(1_300),
        };

        let times = stamps.round_times();
        assert_eq!(times.round1, 1_000);
        assert_eq!(times.reply1, 400);
        assert_eq!(times.round2, 1_000);
        assert_eq!(times.reply2, 400);
    }

    #[test]
    fn test_short_transfer_payload_is_error() {
        let mut session = RangingSession::new();
        session.awaiting_transfer = true;
        assert!(session.complete_from_transfer(&[0u8; 14]).is_err());
    }

    #[test]
    fn test_reset_clears_captures() {
        let mut session = RangingSession::new();
        session.record_final_received(ts(42));
        session.awaiting_transfer = true;
        session.reset();
        assert_eq!(*session.timestamps(), DsTwrTimestamps::default());
        assert!(!session.is_awaiting_transfer());
    }
}
