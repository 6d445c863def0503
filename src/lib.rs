//! Reconnecting websocket link to a GarageBot garage-door controller.
//!
//! The link keeps one session open to the device, proves liveness with a `PING`/`PONG` text
//! heartbeat, reconnects after abnormal closes while the user is active, and exposes state and
//! decoded device messages to observers.

pub mod activity;
pub mod client;
pub mod core;
pub mod events;
pub mod protocol;
pub mod testing;
pub mod transport;
pub mod ws;

pub use activity::UserActivity;
pub use client::GarageLink;
pub use core::{
    CloseCode, ConnectionState, LinkConfig, LinkError, LinkResult, LinkSnapshot, LinkStats,
    RecentError,
};
pub use events::{EventHub, Subscription};
pub use protocol::{
    ClientMessageType, DeviceEvent, InboundMessage, OutboundMessage, ServerMessageType,
};
pub use ws::{LinkActor, LinkCommand};
