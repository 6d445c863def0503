//! Kameo actors driving a device link: the connection state machine and the per-session writer.

pub mod actor;
pub mod writer;

pub use actor::{GetLinkSnapshot, GetLinkStats, LinkActor, LinkActorArgs, LinkCommand};
pub use writer::{WriterWrite, WsWriterActor};
