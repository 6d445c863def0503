use std::fmt;

/// WebSocket close status code.
///
/// Codes 1000–1015 are the standard codes; 4000 is private to the link and means the session was
/// closed on purpose so a new one can take its place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CloseCode(u16);

impl CloseCode {
    pub const NORMAL_CLOSURE: Self = Self(1000);
    pub const GOING_AWAY: Self = Self(1001);
    pub const PROTOCOL_ERROR: Self = Self(1002);
    pub const UNSUPPORTED_DATA: Self = Self(1003);
    pub const NO_STATUS_RECEIVED: Self = Self(1005);
    pub const ABNORMAL_CLOSURE: Self = Self(1006);
    pub const INVALID_FRAME_PAYLOAD_DATA: Self = Self(1007);
    pub const POLICY_VIOLATION: Self = Self(1008);
    pub const MESSAGE_TOO_BIG: Self = Self(1009);
    pub const MISSING_EXTENSION: Self = Self(1010);
    pub const INTERNAL_ERROR: Self = Self(1011);
    pub const SERVICE_RESTART: Self = Self(1012);
    pub const TRY_AGAIN_LATER: Self = Self(1013);
    pub const BAD_GATEWAY: Self = Self(1014);
    pub const TLS_HANDSHAKE: Self = Self(1015);
    pub const CLOSING_FOR_RECONNECT: Self = Self(4000);

    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Only normal closure and going-away count as intentional.
    pub fn is_graceful(self) -> bool {
        matches!(self, Self::NORMAL_CLOSURE | Self::GOING_AWAY)
    }

    /// Human readable description used when logging a close.
    pub fn description(self) -> &'static str {
        match self {
            Self::NORMAL_CLOSURE => "Closed Normally",
            Self::GOING_AWAY => {
                "The endpoint is going away, either because of a server failure or because the client is shutting down."
            }
            Self::PROTOCOL_ERROR => {
                "The endpoint is terminating the connection due to a protocol error."
            }
            Self::UNSUPPORTED_DATA => {
                "The connection is being terminated because the endpoint received data of a type it cannot accept."
            }
            Self::NO_STATUS_RECEIVED => "No status code was provided even though one was expected.",
            Self::ABNORMAL_CLOSURE => {
                "A connection was closed abnormally (that is, with no close frame being sent) when a status code is expected."
            }
            Self::INVALID_FRAME_PAYLOAD_DATA => {
                "The endpoint is terminating the connection because a message was received that contained inconsistent data."
            }
            Self::POLICY_VIOLATION => {
                "The endpoint is terminating the connection because it received a message that violates its policy."
            }
            Self::MESSAGE_TOO_BIG => {
                "The endpoint is terminating the connection because a data frame was received that is too large."
            }
            Self::MISSING_EXTENSION => {
                "The client is terminating the connection because it expected the server to negotiate one or more extension, but the server didn't."
            }
            Self::INTERNAL_ERROR => {
                "The server is terminating the connection because it encountered an unexpected condition that prevented it from fulfilling the request."
            }
            Self::SERVICE_RESTART => {
                "The server is terminating the connection because it is restarting."
            }
            Self::TRY_AGAIN_LATER => {
                "The server is terminating the connection due to a temporary condition."
            }
            Self::BAD_GATEWAY => {
                "The server was acting as a gateway or proxy and received an invalid response from the upstream server."
            }
            Self::TLS_HANDSHAKE => {
                "The connection was closed due to a failure to perform a TLS handshake."
            }
            Self::CLOSING_FOR_RECONNECT => {
                "Pre-existing connection closed in anticipation of new connection."
            }
            _ => "Unknown close code.",
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.0
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
