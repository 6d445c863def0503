use std::time::{Duration, Instant};

use super::frame::WsFrame;
use super::types::HeartbeatConfig;

/// Outbound heartbeat sentinel. Sent as a bare text frame, never wrapped in JSON.
pub const PING_SENTINEL: &str = "PING";
/// Inbound heartbeat sentinel.
pub const PONG_SENTINEL: &str = "PONG";

/// Result emitted by heartbeat strategies when inspecting inbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PongOutcome {
    /// Not a heartbeat frame; hand it to the message decoder.
    NotPong,
    /// Answer to the outstanding ping, with the measured round trip.
    PongReceived(Option<Duration>),
    /// A pong arrived while no ping was outstanding.
    Unsolicited,
}

/// Heartbeat contract driven by the link actor.
///
/// The actor owns the timers; the strategy owns the wire format and the missed-ping count.
pub trait HeartbeatStrategy: Send + 'static {
    fn create_ping(&mut self) -> WsFrame;
    fn handle_inbound(&mut self, frame: &WsFrame) -> PongOutcome;
    /// Record an elapsed pong timeout and return the consecutive miss count.
    fn record_miss(&mut self) -> u32;
    fn missed(&self) -> u32;
    fn reset(&mut self);
    fn interval(&self) -> Duration;
    fn timeout(&self) -> Duration;
    fn max_missed(&self) -> u32;

    fn is_dead(&self) -> bool {
        self.missed() >= self.max_missed()
    }
}

/// Application heartbeat using the `PING`/`PONG` text sentinels the firmware answers.
#[derive(Debug, Clone)]
pub struct SentinelHeartbeat {
    interval: Duration,
    timeout: Duration,
    max_missed: u32,
    missed: u32,
    outstanding: Option<Instant>,
}

impl SentinelHeartbeat {
    pub fn new(interval: Duration, timeout: Duration, max_missed: u32) -> Self {
        Self {
            interval,
            timeout,
            max_missed: max_missed.max(1),
            missed: 0,
            outstanding: None,
        }
    }

    pub fn from_config(config: &HeartbeatConfig) -> Self {
        Self::new(
            config.ping_interval,
            config.pong_timeout,
            config.max_missed_pings,
        )
    }

    pub fn is_awaiting_pong(&self) -> bool {
        self.outstanding.is_some()
    }
}

impl Default for SentinelHeartbeat {
    fn default() -> Self {
        Self::from_config(&HeartbeatConfig::default())
    }
}

impl HeartbeatStrategy for SentinelHeartbeat {
    fn create_ping(&mut self) -> WsFrame {
        self.outstanding = Some(Instant::now());
        WsFrame::text_static(PING_SENTINEL)
    }

    fn handle_inbound(&mut self, frame: &WsFrame) -> PongOutcome {
        let WsFrame::Text(bytes) = frame else {
            return PongOutcome::NotPong;
        };
        if bytes.as_ref() != PONG_SENTINEL.as_bytes() {
            return PongOutcome::NotPong;
        }
        match self.outstanding.take() {
            Some(sent) => {
                self.missed = 0;
                PongOutcome::PongReceived(Some(sent.elapsed()))
            }
            None => PongOutcome::Unsolicited,
        }
    }

    fn record_miss(&mut self) -> u32 {
        self.outstanding = None;
        self.missed = self.missed.saturating_add(1);
        self.missed
    }

    fn missed(&self) -> u32 {
        self.missed
    }

    fn reset(&mut self) {
        self.missed = 0;
        self.outstanding = None;
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn max_missed(&self) -> u32 {
        self.max_missed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat() -> SentinelHeartbeat {
        SentinelHeartbeat::new(Duration::from_millis(10), Duration::from_millis(10), 3)
    }

    #[test]
    fn ping_is_a_bare_text_sentinel() {
        let mut hb = heartbeat();
        assert_eq!(hb.create_ping(), WsFrame::text_static("PING"));
        assert!(hb.is_awaiting_pong());
    }

    #[test]
    fn pong_resets_missed_counter_and_reports_rtt() {
        let mut hb = heartbeat();
        hb.create_ping();
        assert_eq!(hb.record_miss(), 1);
        hb.create_ping();

        match hb.handle_inbound(&WsFrame::text_static("PONG")) {
            PongOutcome::PongReceived(Some(_)) => {}
            other => panic!("expected pong, got {other:?}"),
        }
        assert_eq!(hb.missed(), 0);
        assert!(!hb.is_awaiting_pong());
    }

    #[test]
    fn pong_without_ping_is_unsolicited() {
        let mut hb = heartbeat();
        assert_eq!(
            hb.handle_inbound(&WsFrame::text_static("PONG")),
            PongOutcome::Unsolicited
        );
        assert_eq!(hb.missed(), 0);
    }

    #[test]
    fn other_frames_are_not_pongs() {
        let mut hb = heartbeat();
        hb.create_ping();
        for frame in [
            WsFrame::text_static("pong"),
            WsFrame::text_static("{\"m\":\"SC\",\"p\":{}}"),
            WsFrame::Binary(bytes::Bytes::from_static(b"PONG")),
            WsFrame::Pong(bytes::Bytes::new()),
        ] {
            assert_eq!(hb.handle_inbound(&frame), PongOutcome::NotPong);
        }
        assert!(hb.is_awaiting_pong());
    }

    #[test]
    fn dead_after_max_consecutive_misses() {
        let mut hb = heartbeat();
        for expected in 1..=3 {
            hb.create_ping();
            assert_eq!(hb.record_miss(), expected);
        }
        assert!(hb.is_dead());

        hb.reset();
        assert!(!hb.is_dead());
        assert_eq!(hb.missed(), 0);
    }
}
