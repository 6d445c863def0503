mod support;

use std::sync::Arc;
use std::time::Duration;

use garagebot_link::core::{ExponentialBackoffReconnect, SentinelHeartbeat};
use garagebot_link::testing::MockTransport;
use garagebot_link::{CloseCode, ConnectionState, GarageLink, LinkError, UserActivity};
use parking_lot::Mutex;
use support::{STEP, StateLog, WAIT, connect, quiet_config, spawn_link};

const INTERNAL_ERROR: CloseCode = CloseCode::INTERNAL_ERROR;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abnormal_close_reconnects_while_user_is_active() {
    let (link, transport, mut acceptor) = spawn_link(quiet_config(), true);
    let mut server = connect(&link, &mut acceptor).await;
    let log = StateLog::attach(&link);

    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&errors);
    let watcher = link.clone();
    let _errors_sub = link.on_state_change(move |state| {
        if state == ConnectionState::Error {
            seen.lock().push(watcher.last_error());
        }
    });

    server.close(INTERNAL_ERROR, "firmware fault").expect("close");

    let _next = acceptor.accept_timeout(WAIT).await.expect("reconnected");
    log.wait_for_tail(&[
        ConnectionState::Error,
        ConnectionState::Connecting,
        ConnectionState::Connected,
    ])
    .await;
    assert_eq!(transport.connect_count(), 2);
    assert_eq!(link.last_error(), None);

    let errors = errors.lock().clone();
    assert_eq!(errors.len(), 1);
    assert!(
        matches!(errors[0], Some(LinkError::ConnectionLost(ref detail)) if detail.contains("1011")),
        "error seen while in Error: {:?}",
        errors[0]
    );
    link.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abnormal_close_while_inactive_waits_for_the_user() {
    let (link, transport, mut acceptor) = spawn_link(quiet_config(), false);
    let mut server = connect(&link, &mut acceptor).await;

    server.close(INTERNAL_ERROR, "firmware fault").expect("close");
    link.wait_for_state(ConnectionState::Disconnected, WAIT)
        .await
        .expect("disconnected");
    assert!(matches!(link.last_error(), Some(LinkError::ConnectionLost(_))));
    assert!(acceptor.accept_timeout(STEP * 3).await.is_none());
    assert_eq!(transport.connect_count(), 1);

    let log = StateLog::attach(&link);
    link.activity().set_active(true);
    let _next = acceptor.accept_timeout(WAIT).await.expect("reconnected");
    log.wait_for_tail(&[ConnectionState::Connecting, ConnectionState::Connected])
        .await;
    assert_eq!(transport.connect_count(), 2);
    assert_eq!(link.last_error(), None);
    link.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn explicit_disconnect_survives_activity_changes() {
    let (link, transport, mut acceptor) = spawn_link(quiet_config(), true);
    let _server = connect(&link, &mut acceptor).await;

    link.disconnect("user closed panel").await.expect("disconnect");
    assert_eq!(link.state(), ConnectionState::Disconnected);

    link.activity().set_active(false);
    link.activity().set_active(true);
    assert!(acceptor.accept_timeout(STEP * 3).await.is_none());
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(link.state(), ConnectionState::Disconnected);
    link.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn graceful_remote_close_does_not_reconnect() {
    let (link, transport, mut acceptor) = spawn_link(quiet_config(), true);
    let mut server = connect(&link, &mut acceptor).await;

    server
        .close(CloseCode::GOING_AWAY, "device shutting down")
        .expect("close");
    link.wait_for_state(ConnectionState::Disconnected, WAIT)
        .await
        .expect("disconnected");
    assert_eq!(link.last_error(), None);

    tokio::time::sleep(STEP * 3).await;
    assert_eq!(transport.connect_count(), 1);
    link.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn keep_connection_open_false_disables_every_reconnect() {
    let (link, transport, mut acceptor) = spawn_link(quiet_config(), true);
    let mut server = connect(&link, &mut acceptor).await;
    link.set_keep_connection_open(false)
        .await
        .expect("keep open");

    server.close(INTERNAL_ERROR, "firmware fault").expect("close");
    link.wait_for_state(ConnectionState::Disconnected, WAIT)
        .await
        .expect("disconnected");

    link.activity().set_active(false);
    link.activity().set_active(true);
    assert!(acceptor.accept_timeout(STEP * 3).await.is_none());
    assert_eq!(transport.connect_count(), 1);

    link.connect().await.expect("explicit connect");
    let _next = acceptor.accept_timeout(WAIT).await.expect("explicit session");
    link.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_handshake_reports_error_then_settles() {
    let (link, transport, _acceptor) = spawn_link(quiet_config(), false);
    transport.refuse_connections(true);
    let log = StateLog::attach(&link);

    link.connect().await.expect("connect");
    log.wait_for_tail(&[ConnectionState::Error, ConnectionState::Disconnected])
        .await;
    assert_eq!(
        log.snapshot(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Error,
            ConnectionState::Disconnected
        ]
    );
    let Some(LinkError::ConnectFailed(detail)) = link.last_error() else {
        panic!("expected connect failure, got {:?}", link.last_error());
    };
    assert!(detail.contains("refused"), "detail: {detail}");
    link.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_failure_reports_error_then_reconnects() {
    let (link, transport, mut acceptor) = spawn_link(quiet_config(), true);
    let mut server = connect(&link, &mut acceptor).await;
    let log = StateLog::attach(&link);

    server.fail("connection reset by peer").expect("fail");
    let _next = acceptor.accept_timeout(WAIT).await.expect("reconnected");
    log.wait_for_tail(&[ConnectionState::Connecting, ConnectionState::Connected])
        .await;
    assert_eq!(
        log.snapshot(),
        vec![
            ConnectionState::Error,
            ConnectionState::Connecting,
            ConnectionState::Connected
        ]
    );
    assert_eq!(transport.connect_count(), 2);
    link.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn socket_dropped_without_close_frame_reconnects() {
    let (link, transport, mut acceptor) = spawn_link(quiet_config(), true);
    let mut server = connect(&link, &mut acceptor).await;

    server.drop_socket();
    let _next = acceptor.accept_timeout(WAIT).await.expect("reconnected");
    link.wait_for_state(ConnectionState::Connected, WAIT)
        .await
        .expect("connected");
    assert_eq!(transport.connect_count(), 2);
    link.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backoff_spaces_attempts_and_waits_in_error() {
    let config = quiet_config();
    let (transport, mut acceptor) = MockTransport::channel_pair();
    let heartbeat = SentinelHeartbeat::from_config(&config.heartbeat);
    let backoff = ExponentialBackoffReconnect::new(
        Duration::from_millis(100),
        Duration::from_secs(1),
        2.0,
    )
    .without_jitter();
    let link = GarageLink::spawn_with(
        config,
        transport.clone(),
        heartbeat,
        backoff,
        UserActivity::manual(true),
    );
    transport.refuse_connections(true);

    link.connect().await.expect("connect");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(link.state(), ConnectionState::Error);
    assert_eq!(transport.connect_count(), 1);
    assert!(matches!(link.last_error(), Some(LinkError::ConnectFailed(_))));

    transport.refuse_connections(false);
    let _server = acceptor.accept_timeout(WAIT).await.expect("retried");
    link.wait_for_state(ConnectionState::Connected, WAIT)
        .await
        .expect("connected");
    assert_eq!(transport.connect_count(), 2);
    link.stop().await;
}
