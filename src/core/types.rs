use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type LinkResult<T> = Result<T, LinkError>;

/// Interval between a pong (or session open) and the next ping.
pub const PING_INTERVAL: Duration = Duration::from_millis(2000);
/// How long to wait for a pong after each ping.
pub const PONG_TIMEOUT: Duration = Duration::from_millis(2000);
/// Consecutive missed pongs after which the session is considered dead.
pub const MAX_MISSED_PINGS: u32 = 3;
/// Receive buffer the firmware allocates for a single client frame.
pub const FIRMWARE_CLIENT_BUFFER_BYTES: usize = 256;
/// Largest frame the firmware accepts; it NUL-terminates the frame in place.
pub const MAX_OUTBOUND_FRAME_BYTES: usize = FIRMWARE_CLIENT_BUFFER_BYTES - 1;
/// Largest frame the firmware will ever emit.
pub const MAX_INBOUND_FRAME_BYTES: usize = 1024;

/// Errors surfaced by the link.
///
/// Transport failures are never returned to callers of `connect`; they are recorded and exposed
/// through [`LinkSnapshot::error`]. Only caller-caused failures (oversize frames) and mailbox
/// failures come back as `Err`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("Failed to connect to the device! ({0})")]
    ConnectFailed(String),

    #[error("Connection to the device was lost! ({0})")]
    ConnectionLost(String),

    #[error("An unexpected error has occurred! ({0})")]
    Unexpected(String),

    #[error("Transport error ({context}): {error}")]
    Transport { context: &'static str, error: String },

    #[error("Frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Actor error: {0}")]
    ActorError(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl LinkError {
    /// Classify a transport failure by the state the link was in when it happened.
    pub fn for_transport_failure(state: ConnectionState, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match state {
            ConnectionState::Connecting => LinkError::ConnectFailed(detail),
            ConnectionState::Connected => LinkError::ConnectionLost(detail),
            ConnectionState::Disconnected | ConnectionState::Error => LinkError::Unexpected(detail),
        }
    }
}

/// Connection state of the link. Exactly one is current at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Error => "ERROR",
        }
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the link published on every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub state: ConnectionState,
    pub error: Option<LinkError>,
}

/// Why a session ended. Used for logging the close decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    /// The caller asked for the close.
    Requested,
    /// Superseded by a newer `connect`.
    Replaced,
    /// Too many consecutive pongs were missed.
    MissedHeartbeat,
    /// The device sent a close frame.
    RemoteClosed,
    /// Reading from the transport failed.
    ReadFailure,
    /// The transport stream ended without a close frame.
    StreamEnded,
    /// The handshake never completed.
    HandshakeFailed,
    /// The actor is stopping.
    Shutdown,
}

/// Heartbeat timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub max_missed_pings: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: PING_INTERVAL,
            pong_timeout: PONG_TIMEOUT,
            max_missed_pings: MAX_MISSED_PINGS,
        }
    }
}

/// Application frame size limits; these must match the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_outbound_bytes: usize,
    pub max_inbound_bytes: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_outbound_bytes: MAX_OUTBOUND_FRAME_BYTES,
            max_inbound_bytes: MAX_INBOUND_FRAME_BYTES,
        }
    }
}

/// WebSocket transport buffer sizing.
///
/// These are transport-level guards only. Application-level inbound limits are enforced by the
/// frame decoder so an oversize frame is dropped instead of tearing the session down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportBufferConfig {
    pub max_message_bytes: usize,
    pub max_frame_bytes: usize,
    pub write_buffer_bytes: usize,
    pub max_write_buffer_bytes: usize,
}

impl Default for TransportBufferConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 64 * 1024,
            max_frame_bytes: 64 * 1024,
            write_buffer_bytes: 4 * 1024,
            max_write_buffer_bytes: 64 * 1024,
        }
    }
}

/// Link configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub url: String,
    pub heartbeat: HeartbeatConfig,
    pub limits: FrameLimits,
    pub buffers: TransportBufferConfig,
    pub connect_timeout: Duration,
    /// When false, the link never reconnects on its own.
    pub keep_connection_open: bool,
}

impl LinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Build the config for a device reachable at `host` (IP address or mDNS name).
    pub fn for_device(host: &str) -> Self {
        Self::new(format!("ws://{host}/ws"))
    }

    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_limits(mut self, limits: FrameLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_buffers(mut self, buffers: TransportBufferConfig) -> Self {
        self.buffers = buffers;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_keep_connection_open(mut self, keep_open: bool) -> Self {
        self.keep_connection_open = keep_open;
        self
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            url: "ws://garagebot.local/ws".to_string(),
            heartbeat: HeartbeatConfig::default(),
            limits: FrameLimits::default(),
            buffers: TransportBufferConfig::default(),
            connect_timeout: Duration::from_secs(10),
            keep_connection_open: true,
        }
    }
}

/// Most recent error recorded by the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentError {
    pub context: &'static str,
    pub message: String,
    /// Time since the error was recorded.
    pub age: Duration,
}

/// Snapshot of link health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Time since the current session opened, if one is open.
    pub uptime: Option<Duration>,
    pub connects: u64,
    pub reconnects: u64,
    pub frames_in: u64,
    pub frames_out: u64,
    pub malformed_frames: u64,
    pub dropped_outbound: u64,
    pub missed_pongs: u64,
    pub errors: u64,
    pub recent_errors: usize,
    pub last_error: Option<RecentError>,
    pub p50_rtt_us: u64,
    pub p99_rtt_us: u64,
    pub rtt_samples: u64,
}
