use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Sink, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async_with_config,
    tungstenite::{
        Message as TungsteniteMessage, Utf8Bytes,
        protocol::{CloseFrame as TungCloseFrame, WebSocketConfig},
    },
};

use crate::core::{CloseCode, LinkError, LinkResult, TransportBufferConfig, WsCloseFrame, WsFrame};
use crate::transport::{WsTransport, WsTransportConnectFuture};

type DeviceStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn map_ws_error(context: &'static str, err: impl ToString) -> LinkError {
    LinkError::Transport {
        context,
        error: err.to_string(),
    }
}

fn close_to_core(frame: Option<TungCloseFrame>) -> Option<WsCloseFrame> {
    frame.map(|f| WsCloseFrame {
        code: CloseCode::new(u16::from(f.code)),
        reason: Bytes::from(f.reason),
    })
}

fn core_to_close(frame: WsCloseFrame) -> TungCloseFrame {
    let reason = Utf8Bytes::try_from(frame.reason).unwrap_or_else(|_| Utf8Bytes::from_static(""));
    TungCloseFrame {
        code: frame.code.as_u16().into(),
        reason,
    }
}

fn msg_to_frame(msg: TungsteniteMessage) -> WsFrame {
    match msg {
        TungsteniteMessage::Text(text) => WsFrame::Text(Bytes::from(text)),
        TungsteniteMessage::Binary(bytes) => WsFrame::Binary(bytes),
        TungsteniteMessage::Ping(bytes) => WsFrame::Ping(bytes),
        TungsteniteMessage::Pong(bytes) => WsFrame::Pong(bytes),
        TungsteniteMessage::Close(frame) => WsFrame::Close(close_to_core(frame)),
        TungsteniteMessage::Frame(_) => WsFrame::Binary(Bytes::new()),
    }
}

fn frame_to_msg(frame: WsFrame) -> TungsteniteMessage {
    match frame {
        WsFrame::Text(bytes) => match Utf8Bytes::try_from(bytes.clone()) {
            Ok(text) => TungsteniteMessage::Text(text),
            Err(_) => TungsteniteMessage::Binary(bytes),
        },
        WsFrame::Binary(bytes) => TungsteniteMessage::Binary(bytes),
        WsFrame::Ping(bytes) => TungsteniteMessage::Ping(bytes),
        WsFrame::Pong(bytes) => TungsteniteMessage::Pong(bytes),
        WsFrame::Close(frame) => TungsteniteMessage::Close(frame.map(core_to_close)),
    }
}

/// tokio-tungstenite transport for plain `ws://` device connections.
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteTransport {
    disable_nagle: bool,
}

impl TungsteniteTransport {
    /// Send frames immediately instead of coalescing; heartbeat round trips are small.
    pub fn with_nodelay(mut self) -> Self {
        self.disable_nagle = true;
        self
    }
}

pub struct TungsteniteReader {
    inner: futures_util::stream::SplitStream<DeviceStream>,
}

impl Stream for TungsteniteReader {
    type Item = LinkResult<WsFrame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(msg))) => Poll::Ready(Some(Ok(msg_to_frame(msg)))),
            Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(map_ws_error("read", err)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub struct TungsteniteWriter {
    inner: futures_util::stream::SplitSink<DeviceStream, TungsteniteMessage>,
}

impl Sink<WsFrame> for TungsteniteWriter {
    type Error = LinkError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner)
            .poll_ready(cx)
            .map_err(|e| map_ws_error("write", e))
    }

    fn start_send(mut self: Pin<&mut Self>, item: WsFrame) -> Result<(), Self::Error> {
        Pin::new(&mut self.inner)
            .start_send(frame_to_msg(item))
            .map_err(|e| map_ws_error("write", e))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner)
            .poll_flush(cx)
            .map_err(|e| map_ws_error("write", e))
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner)
            .poll_close(cx)
            .map_err(|e| map_ws_error("write", e))
    }
}

impl WsTransport for TungsteniteTransport {
    type Reader = TungsteniteReader;
    type Writer = TungsteniteWriter;

    fn connect(
        &self,
        url: String,
        buffers: TransportBufferConfig,
    ) -> WsTransportConnectFuture<Self::Reader, Self::Writer> {
        let disable_nagle = self.disable_nagle;
        Box::pin(async move {
            let config = WebSocketConfig::default()
                .max_message_size(Some(buffers.max_message_bytes))
                .max_frame_size(Some(buffers.max_frame_bytes))
                .write_buffer_size(buffers.write_buffer_bytes)
                .max_write_buffer_size(buffers.max_write_buffer_bytes);

            let (stream, _) = connect_async_with_config(url, Some(config), disable_nagle)
                .await
                .map_err(|e| map_ws_error("connect", e))?;

            let (write, read) = stream.split();
            Ok((
                TungsteniteReader { inner: read },
                TungsteniteWriter { inner: write },
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_frames_keep_code_and_reason() {
        let core = WsCloseFrame {
            code: CloseCode::CLOSING_FOR_RECONNECT,
            reason: Bytes::from_static(b"Missed Heartbeat"),
        };
        let TungsteniteMessage::Close(Some(native)) = frame_to_msg(WsFrame::Close(Some(core.clone())))
        else {
            panic!("expected close frame");
        };
        assert_eq!(u16::from(native.code), 4000);
        assert_eq!(close_to_core(Some(native)), Some(core));
    }

    #[test]
    fn text_frames_stay_text() {
        let msg = frame_to_msg(WsFrame::text_static("PING"));
        assert!(matches!(&msg, TungsteniteMessage::Text(t) if t.as_str() == "PING"));
        assert_eq!(msg_to_frame(msg), WsFrame::text_static("PING"));
    }

    #[test]
    fn invalid_utf8_text_falls_back_to_binary() {
        let msg = frame_to_msg(WsFrame::Text(Bytes::from_static(&[0xff, 0xfe])));
        assert!(matches!(msg, TungsteniteMessage::Binary(_)));
    }
}
