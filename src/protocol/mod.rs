//! Application protocol spoken with the device firmware.

pub mod codec;
pub mod messages;
pub mod payload;

pub use codec::*;
pub use messages::*;
pub use payload::*;
