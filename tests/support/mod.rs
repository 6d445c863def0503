#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use garagebot_link::core::{HeartbeatConfig, WsFrame};
use garagebot_link::testing::{MockAcceptor, MockServer, MockTransport};
use garagebot_link::{ConnectionState, GarageLink, LinkConfig, Subscription, UserActivity};
use parking_lot::Mutex;

pub type TestLink = GarageLink<MockTransport>;

pub const STEP: Duration = Duration::from_millis(40);
pub const WAIT: Duration = Duration::from_secs(2);

/// Heartbeat short enough for tests: one ping every 40ms, 40ms to answer, three strikes.
pub fn fast_config() -> LinkConfig {
    LinkConfig::new("ws://garagebot.test/ws").with_heartbeat(HeartbeatConfig {
        ping_interval: STEP,
        pong_timeout: STEP,
        max_missed_pings: 3,
    })
}

/// Heartbeat slow enough that unanswered pings never close a session during a test.
pub fn quiet_config() -> LinkConfig {
    fast_config().with_heartbeat(HeartbeatConfig {
        ping_interval: Duration::from_secs(5),
        pong_timeout: Duration::from_secs(5),
        max_missed_pings: 3,
    })
}

pub fn spawn_link(config: LinkConfig, active: bool) -> (TestLink, MockTransport, MockAcceptor) {
    let (transport, acceptor) = MockTransport::channel_pair();
    let link = GarageLink::spawn(config, transport.clone(), UserActivity::manual(active));
    (link, transport, acceptor)
}

/// Connect and return the device side of the new session.
pub async fn connect(link: &TestLink, acceptor: &mut MockAcceptor) -> MockServer {
    link.connect().await.expect("connect");
    let server = acceptor.accept_timeout(WAIT).await.expect("session accepted");
    link.wait_for_state(ConnectionState::Connected, WAIT)
        .await
        .expect("connected");
    server
}

/// Records every state transition delivered to observers.
pub struct StateLog {
    states: Arc<Mutex<Vec<ConnectionState>>>,
    _subscription: Subscription,
}

impl StateLog {
    pub fn attach(link: &TestLink) -> Self {
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        let subscription = link.on_state_change(move |state| sink.lock().push(state));
        Self {
            states,
            _subscription: subscription,
        }
    }

    pub fn snapshot(&self) -> Vec<ConnectionState> {
        self.states.lock().clone()
    }

    pub fn clear(&self) {
        self.states.lock().clear();
    }

    /// Wait until the log ends with `expected`.
    pub async fn wait_for_tail(&self, expected: &[ConnectionState]) {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if self.states.lock().ends_with(expected) {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "timed out waiting for {expected:?}; saw {:?}",
                    self.snapshot()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

pub fn is_ping(frame: &WsFrame) -> bool {
    frame.as_text() == Some("PING")
}

pub fn close_code(frame: &WsFrame) -> Option<u16> {
    match frame {
        WsFrame::Close(Some(close)) => Some(close.code.as_u16()),
        _ => None,
    }
}
