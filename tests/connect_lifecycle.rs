mod support;

use garagebot_link::protocol::{SensorPosition, VirtualButton};
use garagebot_link::{CloseCode, ConnectionState, LinkError, OutboundMessage};
use support::{STEP, StateLog, WAIT, close_code, connect, quiet_config, spawn_link};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connect_walks_connecting_then_connected() {
    let (link, transport, mut acceptor) = spawn_link(quiet_config(), true);
    let log = StateLog::attach(&link);
    assert_eq!(link.state(), ConnectionState::Disconnected);

    let _server = connect(&link, &mut acceptor).await;
    log.wait_for_tail(&[ConnectionState::Connecting, ConnectionState::Connected])
        .await;

    assert_eq!(
        log.snapshot(),
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );
    assert_eq!(link.last_error(), None);
    assert_eq!(transport.connect_count(), 1);

    let stats = link.stats().await.expect("stats");
    assert_eq!(stats.connects, 1);
    assert!(stats.uptime.is_some());
    link.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn observers_read_the_new_state_synchronously() {
    let (link, _transport, mut acceptor) = spawn_link(quiet_config(), true);
    let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let reader = link.clone();
    let sink = std::sync::Arc::clone(&seen);
    let _sub = link.on_state_change(move |state| sink.lock().push((state, reader.state())));

    let _server = connect(&link, &mut acceptor).await;
    let seen = seen.lock().clone();
    assert!(!seen.is_empty());
    for (notified, read) in seen {
        assert_eq!(notified, read);
    }
    link.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn messages_go_out_as_compact_json() {
    let (link, _transport, mut acceptor) = spawn_link(quiet_config(), true);
    let mut server = connect(&link, &mut acceptor).await;

    link.send_message(&OutboundMessage::button_press(VirtualButton::Activate))
        .await
        .expect("send button press");
    let frame = server.recv_non_ping_timeout(WAIT).await.expect("frame");
    assert_eq!(frame.as_text(), Some(r#"{"m":"BP","p":{"b":"ACTIVATE"}}"#));

    link.send_message(&OutboundMessage::set_sensor_threshold(SensorPosition::Top, 150))
        .await
        .expect("send threshold");
    let frame = server.recv_non_ping_timeout(WAIT).await.expect("frame");
    assert_eq!(frame.as_text(), Some(r#"{"m":"ST","p":{"s":"TOP","t":150}}"#));
    link.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversize_messages_are_rejected_before_the_wire() {
    let (link, _transport, mut acceptor) = spawn_link(quiet_config(), true);
    let mut server = connect(&link, &mut acceptor).await;

    let message = OutboundMessage::reboot().with("pad", "x".repeat(300));
    let err = link.send_message(&message).await.expect_err("too large");
    assert!(matches!(err, LinkError::FrameTooLarge { max: 255, .. }));
    assert_eq!(server.recv_non_ping_timeout(STEP * 3).await, None);
    assert_eq!(link.state(), ConnectionState::Connected);
    link.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sends_without_a_session_are_dropped() {
    let (link, transport, _acceptor) = spawn_link(quiet_config(), true);

    link.send_message(&OutboundMessage::reboot())
        .await
        .expect("dropped silently");
    let stats = link.stats().await.expect("stats");
    assert_eq!(stats.dropped_outbound, 1);
    assert_eq!(stats.frames_out, 0);
    assert_eq!(transport.connect_count(), 0);
    assert_eq!(link.state(), ConnectionState::Disconnected);
    link.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_sends_normal_closure_and_stays_down() {
    let (link, transport, mut acceptor) = spawn_link(quiet_config(), true);
    let mut server = connect(&link, &mut acceptor).await;
    let log = StateLog::attach(&link);

    link.disconnect("user logout").await.expect("disconnect");
    let frame = server.recv_non_ping_timeout(WAIT).await.expect("close frame");
    assert_eq!(close_code(&frame), Some(CloseCode::NORMAL_CLOSURE.as_u16()));

    log.wait_for_tail(&[ConnectionState::Disconnected]).await;
    assert_eq!(link.last_error(), None);

    tokio::time::sleep(STEP * 4).await;
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(link.state(), ConnectionState::Disconnected);
    assert!(acceptor.accept_timeout(STEP).await.is_none());
    link.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connect_while_connecting_is_single_flight() {
    let (link, transport, mut acceptor) = spawn_link(quiet_config(), true);
    transport.set_handshake_delay(STEP * 2);

    link.connect().await.expect("first connect");
    link.connect().await.expect("second connect");
    link.connect().await.expect("third connect");

    let _server = acceptor.accept_timeout(WAIT).await.expect("session");
    link.wait_for_state(ConnectionState::Connected, WAIT)
        .await
        .expect("connected");
    assert_eq!(transport.connect_count(), 1);
    assert!(acceptor.accept_timeout(STEP * 3).await.is_none());
    link.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopping_the_link_closes_with_going_away() {
    let (link, _transport, mut acceptor) = spawn_link(quiet_config(), true);
    let mut server = connect(&link, &mut acceptor).await;

    link.stop().await;
    let frame = server.recv_non_ping_timeout(WAIT).await.expect("close frame");
    assert_eq!(close_code(&frame), Some(CloseCode::GOING_AWAY.as_u16()));
}
