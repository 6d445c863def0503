use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream};

use crate::core::{LinkError, LinkResult, TransportBufferConfig, WsFrame};

pub mod tungstenite;

/// Future returned by [`WsTransport::connect`].
pub type WsTransportConnectFuture<R, W> = Pin<Box<dyn Future<Output = LinkResult<(R, W)>> + Send>>;

/// Transport boundary for websocket IO.
///
/// The IO loop lives outside kameo; the link actor owns state and policy. Swapping the
/// transport (tokio-tungstenite, the in-memory mock) leaves the state machine unchanged.
pub trait WsTransport: Clone + Send + Sync + 'static {
    type Reader: Stream<Item = LinkResult<WsFrame>> + Send + Unpin + 'static;
    type Writer: Sink<WsFrame, Error = LinkError> + Send + Unpin + 'static;

    fn connect(
        &self,
        url: String,
        buffers: TransportBufferConfig,
    ) -> WsTransportConnectFuture<Self::Reader, Self::Writer>;
}
