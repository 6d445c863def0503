//! Reusable test utilities for exercising the link without a real device.
//!
//! [`MockTransport`] hands every successful connect to a [`MockAcceptor`], which yields one
//! [`MockServer`] per session. Tests use the server handle to read what the link wrote, push
//! inbound frames, close the socket with a code, or drop it outright.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Sink;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::{
    CloseCode, LinkError, LinkResult, PING_SENTINEL, PONG_SENTINEL, TransportBufferConfig,
    WsFrame,
};
use crate::transport::{WsTransport, WsTransportConnectFuture};

/// A transport backed by in-memory channels. Supports any number of sequential connects.
#[derive(Clone)]
pub struct MockTransport {
    accept_tx: mpsc::UnboundedSender<MockServer>,
    refuse: Arc<AtomicBool>,
    handshake_delay_ms: Arc<AtomicU64>,
    connects: Arc<AtomicUsize>,
}

/// Receives one [`MockServer`] per accepted connection.
pub struct MockAcceptor {
    rx: mpsc::UnboundedReceiver<MockServer>,
}

impl MockTransport {
    /// Build a transport and the acceptor that observes its connections.
    pub fn channel_pair() -> (Self, MockAcceptor) {
        let (accept_tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                accept_tx,
                refuse: Arc::new(AtomicBool::new(false)),
                handshake_delay_ms: Arc::new(AtomicU64::new(0)),
                connects: Arc::new(AtomicUsize::new(0)),
            },
            MockAcceptor { rx },
        )
    }

    /// Fail every subsequent handshake until switched back.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Delay every subsequent handshake.
    pub fn set_handshake_delay(&self, delay: Duration) {
        let millis = delay.as_millis().min(u64::MAX as u128) as u64;
        self.handshake_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of handshakes attempted, refused ones included.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl WsTransport for MockTransport {
    type Reader = MockReader;
    type Writer = MockWriter;

    fn connect(
        &self,
        url: String,
        _buffers: TransportBufferConfig,
    ) -> WsTransportConnectFuture<Self::Reader, Self::Writer> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let accept_tx = self.accept_tx.clone();
        let refuse = self.refuse.load(Ordering::SeqCst);
        let delay = Duration::from_millis(self.handshake_delay_ms.load(Ordering::SeqCst));

        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if refuse {
                return Err(LinkError::Transport {
                    context: "connect",
                    error: format!("connection refused by mock device at {url}"),
                });
            }

            let (sent_tx, outbound_rx) = mpsc::unbounded_channel();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            let server = MockServer {
                outbound_rx,
                inbound_tx: Some(inbound_tx),
            };
            accept_tx.send(server).map_err(|_| LinkError::Transport {
                context: "connect",
                error: "mock acceptor dropped".to_string(),
            })?;

            Ok((MockReader { rx: inbound_rx }, MockWriter { sent_tx }))
        })
    }
}

impl MockAcceptor {
    pub async fn accept(&mut self) -> Option<MockServer> {
        self.rx.recv().await
    }

    pub async fn accept_timeout(&mut self, timeout: Duration) -> Option<MockServer> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .unwrap_or_default()
    }
}

/// Error surface for operations on [`MockServer`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MockServerError {
    /// The inbound socket side was intentionally dropped.
    SocketDropped,
    /// The link is no longer reading this session.
    ChannelClosed,
}

impl std::fmt::Display for MockServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MockServerError::SocketDropped => f.write_str("mock socket already dropped"),
            MockServerError::ChannelClosed => f.write_str("mock session is no longer read"),
        }
    }
}

impl std::error::Error for MockServerError {}

/// Device-side handle for one mock session.
pub struct MockServer {
    outbound_rx: mpsc::UnboundedReceiver<WsFrame>,
    inbound_tx: Option<mpsc::UnboundedSender<LinkResult<WsFrame>>>,
}

impl MockServer {
    /// Receive a frame the link wrote to this session.
    pub async fn recv_outbound(&mut self) -> Option<WsFrame> {
        self.outbound_rx.recv().await
    }

    pub async fn recv_outbound_timeout(&mut self, timeout: Duration) -> Option<WsFrame> {
        tokio::time::timeout(timeout, self.outbound_rx.recv())
            .await
            .unwrap_or_default()
    }

    /// Receive the next outbound frame that is not a heartbeat ping.
    pub async fn recv_non_ping_timeout(&mut self, timeout: Duration) -> Option<WsFrame> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.outbound_rx.recv())
                .await
                .ok()??;
            if frame.as_text() != Some(PING_SENTINEL) {
                return Some(frame);
            }
        }
    }

    pub fn send_inbound(&self, frame: WsFrame) -> Result<(), MockServerError> {
        let Some(tx) = self.inbound_tx.as_ref() else {
            return Err(MockServerError::SocketDropped);
        };
        tx.send(Ok(frame)).map_err(|_| MockServerError::ChannelClosed)
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<(), MockServerError> {
        self.send_inbound(WsFrame::text(text.into()))
    }

    pub fn send_pong(&self) -> Result<(), MockServerError> {
        self.send_inbound(WsFrame::text_static(PONG_SENTINEL))
    }

    /// Close the session from the device side with `code`.
    pub fn close(&mut self, code: CloseCode, reason: &str) -> Result<(), MockServerError> {
        self.send_inbound(WsFrame::close(code, reason))?;
        self.inbound_tx = None;
        Ok(())
    }

    /// Surface a transport error on the read side, as a reset socket would.
    pub fn fail(&mut self, error: &str) -> Result<(), MockServerError> {
        let Some(tx) = self.inbound_tx.take() else {
            return Err(MockServerError::SocketDropped);
        };
        tx.send(Err(LinkError::Transport {
            context: "read",
            error: error.to_string(),
        }))
        .map_err(|_| MockServerError::ChannelClosed)
    }

    /// End the inbound stream without a close frame.
    pub fn drop_socket(&mut self) {
        self.inbound_tx = None;
    }

    /// Answer every `PING` with `PONG` in the background; every other outbound frame is
    /// forwarded to the returned receiver.
    pub fn reply_to_pings(self) -> (JoinHandle<()>, mpsc::UnboundedReceiver<WsFrame>) {
        let (forward_tx, forward_rx) = mpsc::unbounded_channel();
        let mut server = self;
        let task = tokio::spawn(async move {
            while let Some(frame) = server.outbound_rx.recv().await {
                if frame.as_text() == Some(PING_SENTINEL) {
                    if server.send_pong().is_err() {
                        break;
                    }
                    continue;
                }
                if forward_tx.send(frame).is_err() {
                    break;
                }
            }
        });
        (task, forward_rx)
    }
}

/// Reader side for [`MockTransport`].
pub struct MockReader {
    rx: mpsc::UnboundedReceiver<LinkResult<WsFrame>>,
}

impl futures_util::Stream for MockReader {
    type Item = LinkResult<WsFrame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_recv(cx)
    }
}

/// Writer side for [`MockTransport`].
pub struct MockWriter {
    sent_tx: mpsc::UnboundedSender<WsFrame>,
}

impl Sink<WsFrame> for MockWriter {
    type Error = LinkError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsFrame) -> Result<(), Self::Error> {
        self.get_mut()
            .sent_tx
            .send(item)
            .map_err(|_| LinkError::Transport {
                context: "mock_transport_write",
                error: "mock outbound channel closed".to_string(),
            })
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}
