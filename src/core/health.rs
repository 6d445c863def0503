use hdrhistogram::Histogram;
use std::time::{Duration, Instant};

use super::circular_buffer::CircularBuffer;
use super::types::{LinkStats, RecentError};

const MAX_RECENT_ERRORS: usize = 32;
const MAX_ERROR_TEXT_BYTES: usize = 512;

#[derive(Debug, Clone)]
struct ErrorRec {
    recorded_at: Instant,
    context: &'static str,
    error: String,
}

fn truncate_string(s: &str) -> String {
    if s.len() <= MAX_ERROR_TEXT_BYTES {
        return s.to_string();
    }

    let mut end = MAX_ERROR_TEXT_BYTES;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Health counters for the link. Owned by the link actor, so no interior mutability.
#[derive(Debug)]
pub struct LinkHealth {
    session_started: Option<Instant>,
    connects: u64,
    reconnects: u64,
    frames_in: u64,
    frames_out: u64,
    malformed_frames: u64,
    dropped_outbound: u64,
    missed_pongs: u64,
    error_count: u64,
    recent_errors: CircularBuffer<ErrorRec>,
    // Ping round trips in microseconds, 1us..60s.
    rtt_histogram: Option<Histogram<u64>>,
}

impl LinkHealth {
    pub fn new() -> Self {
        Self {
            session_started: None,
            connects: 0,
            reconnects: 0,
            frames_in: 0,
            frames_out: 0,
            malformed_frames: 0,
            dropped_outbound: 0,
            missed_pongs: 0,
            error_count: 0,
            recent_errors: CircularBuffer::new(MAX_RECENT_ERRORS),
            rtt_histogram: Histogram::new_with_bounds(1, 60_000_000, 3).ok(),
        }
    }

    pub fn record_session_open(&mut self) {
        self.session_started = Some(Instant::now());
        self.connects = self.connects.saturating_add(1);
    }

    pub fn record_session_closed(&mut self) {
        self.session_started = None;
    }

    pub fn record_inbound(&mut self) {
        self.frames_in = self.frames_in.saturating_add(1);
    }

    pub fn record_sent(&mut self) {
        self.frames_out = self.frames_out.saturating_add(1);
    }

    pub fn record_dropped_outbound(&mut self) {
        self.dropped_outbound = self.dropped_outbound.saturating_add(1);
    }

    pub fn record_malformed(&mut self, error: &str) {
        self.malformed_frames = self.malformed_frames.saturating_add(1);
        self.record_error("decode", error);
    }

    pub fn record_missed_pong(&mut self) {
        self.missed_pongs = self.missed_pongs.saturating_add(1);
    }

    pub fn record_error(&mut self, context: &'static str, error: &str) {
        self.error_count = self.error_count.saturating_add(1);
        self.recent_errors.push(ErrorRec {
            recorded_at: Instant::now(),
            context,
            error: truncate_string(error),
        });
    }

    pub fn record_rtt(&mut self, rtt: Duration) {
        let micros = rtt.as_micros().clamp(1, u64::MAX as u128) as u64;
        if let Some(histogram) = self.rtt_histogram.as_mut() {
            let _ = histogram.record(micros);
        }
    }

    pub fn increment_reconnect(&mut self) {
        self.reconnects = self.reconnects.saturating_add(1);
    }

    pub fn last_error(&self) -> Option<RecentError> {
        self.recent_errors.back().map(|rec| RecentError {
            context: rec.context,
            message: rec.error.clone(),
            age: rec.recorded_at.elapsed(),
        })
    }

    pub fn get_stats(&self) -> LinkStats {
        let (p50, p99, samples) = match self.rtt_histogram.as_ref() {
            Some(h) if !h.is_empty() => (
                h.value_at_percentile(50.0),
                h.value_at_percentile(99.0),
                h.len(),
            ),
            _ => (0, 0, 0),
        };

        LinkStats {
            uptime: self.session_started.map(|started| started.elapsed()),
            connects: self.connects,
            reconnects: self.reconnects,
            frames_in: self.frames_in,
            frames_out: self.frames_out,
            malformed_frames: self.malformed_frames,
            dropped_outbound: self.dropped_outbound,
            missed_pongs: self.missed_pongs,
            errors: self.error_count,
            recent_errors: self.recent_errors.len(),
            last_error: self.last_error(),
            p50_rtt_us: p50,
            p99_rtt_us: p99,
            rtt_samples: samples,
        }
    }
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self::new()
    }
}
