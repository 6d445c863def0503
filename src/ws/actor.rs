//! Link actor: the connection state machine for one device.
//!
//! The websocket IO loop runs outside kameo; the actor owns connection state, heartbeat timers
//! and reconnect policy, and receives transport and timer callbacks as messages. Every callback
//! carries the session id (and, for heartbeat timers, the probe number) it was created for, and
//! is ignored once that session or probe is no longer current.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage, WeakActorRef};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::writer::{WriterWrite, WsWriterActor};
use crate::activity::UserActivity;
use crate::core::{
    CloseCause, CloseCode, ConnectionState, FrameLimits, HeartbeatStrategy, ImmediateReconnect,
    LinkConfig, LinkError, LinkHealth, LinkResult, LinkSnapshot, LinkStats, PongOutcome,
    ReconnectGate, ReconnectStrategy, SentinelHeartbeat, TransportBufferConfig, WsFrame,
};
use crate::events::EventHub;
use crate::protocol::{DecodedFrame, ServerMessageType, decode_frame};
use crate::transport::WsTransport;

const MISSED_HEARTBEAT_REASON: &str = "Missed Heartbeat";
const REPLACED_REASON: &str = "Replacing connection";

/// Arguments passed when spawning a [`LinkActor`].
pub struct LinkActorArgs<T, H = SentinelHeartbeat, R = ImmediateReconnect>
where
    T: WsTransport,
    H: HeartbeatStrategy,
    R: ReconnectStrategy,
{
    pub config: LinkConfig,
    pub transport: T,
    pub heartbeat: H,
    pub reconnect_strategy: R,
    pub activity: UserActivity,
    pub events: EventHub,
    pub snapshot: watch::Sender<LinkSnapshot>,
}

struct PendingConnect {
    id: u64,
    task: JoinHandle<()>,
}

struct Session<T: WsTransport> {
    id: u64,
    writer: ActorRef<WsWriterActor<T::Writer>>,
    reader_task: JoinHandle<()>,
    ping_timer: Option<JoinHandle<()>>,
    pong_timer: Option<JoinHandle<()>>,
    probe: u64,
}

/// Connection manager for a single device link.
pub struct LinkActor<T, H = SentinelHeartbeat, R = ImmediateReconnect>
where
    T: WsTransport,
    H: HeartbeatStrategy,
    R: ReconnectStrategy,
{
    url: String,
    transport: T,
    buffers: TransportBufferConfig,
    limits: FrameLimits,
    connect_timeout: Duration,
    heartbeat: H,
    reconnect: R,
    activity: UserActivity,
    events: EventHub,
    snapshot: watch::Sender<LinkSnapshot>,
    actor_ref: ActorRef<Self>,
    state: ConnectionState,
    last_error: Option<LinkError>,
    keep_connection_open: bool,
    // Set when a reconnect was refused only because the user is inactive.
    withheld_for_inactivity: bool,
    health: LinkHealth,
    next_session: u64,
    pending: Option<PendingConnect>,
    session: Option<Session<T>>,
    reconnect_token: u64,
    reconnect_timer: Option<JoinHandle<()>>,
    activity_task: Option<JoinHandle<()>>,
}

/// Requests accepted from callers.
#[derive(Debug, Clone)]
pub enum LinkCommand {
    /// Open a session, replacing an open one. Ignored while a handshake is in flight.
    Connect,
    /// Close the session with `code`; a graceful code settles in `Disconnected`.
    Disconnect { code: CloseCode, reason: String },
    SetKeepConnectionOpen(bool),
    /// Write an already encoded frame; dropped when no session is open.
    Send(WsFrame),
}

/// Query the current state and last error.
#[derive(Debug, Clone, Copy)]
pub struct GetLinkSnapshot;

/// Query health statistics.
#[derive(Debug, Clone, Copy)]
pub struct GetLinkStats;

pub(crate) struct TransportOpened<T: WsTransport> {
    session: u64,
    reader: T::Reader,
    writer: T::Writer,
}

#[derive(Debug)]
pub(crate) enum TransportEvent {
    Failed {
        session: u64,
        error: LinkError,
    },
    Closed {
        session: u64,
        code: CloseCode,
        reason: String,
        cause: CloseCause,
    },
    Frame {
        session: u64,
        frame: WsFrame,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum TimerEvent {
    PingDue { session: u64, probe: u64 },
    PongDeadline { session: u64, probe: u64 },
    ReconnectDue { token: u64 },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ActivityChanged {
    active: bool,
}

fn cancel_timer(slot: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = slot.take() {
        handle.abort();
    }
}

impl<T, H, R> Actor for LinkActor<T, H, R>
where
    T: WsTransport,
    H: HeartbeatStrategy,
    R: ReconnectStrategy,
{
    type Args = LinkActorArgs<T, H, R>;
    type Error = LinkError;

    fn name() -> &'static str {
        "LinkActor"
    }

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> LinkResult<Self> {
        let mut activity_rx = args.activity.subscribe();
        let activity_ref = actor_ref.clone();
        let activity_task = tokio::spawn(async move {
            while activity_rx.changed().await.is_ok() {
                let active = *activity_rx.borrow_and_update();
                if activity_ref
                    .tell(ActivityChanged { active })
                    .send()
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        args.snapshot.send_replace(LinkSnapshot::default());
        info!(url = %args.config.url, "link actor started");

        Ok(Self {
            url: args.config.url,
            transport: args.transport,
            buffers: args.config.buffers,
            limits: args.config.limits,
            connect_timeout: args.config.connect_timeout,
            heartbeat: args.heartbeat,
            reconnect: args.reconnect_strategy,
            activity: args.activity,
            events: args.events,
            snapshot: args.snapshot,
            actor_ref,
            state: ConnectionState::Disconnected,
            last_error: None,
            keep_connection_open: args.config.keep_connection_open,
            withheld_for_inactivity: false,
            health: LinkHealth::new(),
            next_session: 0,
            pending: None,
            session: None,
            reconnect_token: 0,
            reconnect_timer: None,
            activity_task: Some(activity_task),
        })
    }

    async fn on_stop(
        &mut self,
        _ctx: WeakActorRef<Self>,
        _reason: kameo::error::ActorStopReason,
    ) -> LinkResult<()> {
        self.cancel_reconnect_timer();
        if let Some(task) = self.activity_task.take() {
            task.abort();
        }
        self.release_session(Some((CloseCode::GOING_AWAY, "Link stopped")))
            .await;
        if self.state != ConnectionState::Disconnected {
            self.last_error = None;
            self.set_state(ConnectionState::Disconnected);
        }
        info!(
            url = %self.url,
            cause = ?CloseCause::Shutdown,
            observers = self.events.observer_count(),
            "link actor stopped"
        );
        Ok(())
    }

    fn on_panic(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            tracing::error!(error = ?err, "LinkActor panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

impl<T, H, R> KameoMessage<LinkCommand> for LinkActor<T, H, R>
where
    T: WsTransport,
    H: HeartbeatStrategy,
    R: ReconnectStrategy,
{
    type Reply = LinkResult<()>;

    async fn handle(&mut self, msg: LinkCommand, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        match msg {
            LinkCommand::Connect => self.connect().await,
            LinkCommand::Disconnect { code, reason } => self.disconnect(code, &reason).await,
            LinkCommand::SetKeepConnectionOpen(keep_open) => {
                info!(url = %self.url, keep_open, "keep connection open updated");
                self.keep_connection_open = keep_open;
            }
            LinkCommand::Send(frame) => self.send_frame(frame).await,
        }
        Ok(())
    }
}

impl<T, H, R> KameoMessage<GetLinkSnapshot> for LinkActor<T, H, R>
where
    T: WsTransport,
    H: HeartbeatStrategy,
    R: ReconnectStrategy,
{
    type Reply = LinkResult<LinkSnapshot>;

    async fn handle(
        &mut self,
        _msg: GetLinkSnapshot,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(LinkSnapshot {
            state: self.state,
            error: self.last_error.clone(),
        })
    }
}

impl<T, H, R> KameoMessage<GetLinkStats> for LinkActor<T, H, R>
where
    T: WsTransport,
    H: HeartbeatStrategy,
    R: ReconnectStrategy,
{
    type Reply = LinkResult<LinkStats>;

    async fn handle(&mut self, _msg: GetLinkStats, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        Ok(self.health.get_stats())
    }
}

impl<T, H, R> KameoMessage<TransportOpened<T>> for LinkActor<T, H, R>
where
    T: WsTransport,
    H: HeartbeatStrategy,
    R: ReconnectStrategy,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: TransportOpened<T>,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.on_transport_opened(msg.session, msg.reader, msg.writer);
    }
}

impl<T, H, R> KameoMessage<TransportEvent> for LinkActor<T, H, R>
where
    T: WsTransport,
    H: HeartbeatStrategy,
    R: ReconnectStrategy,
{
    type Reply = ();

    async fn handle(&mut self, msg: TransportEvent, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        match msg {
            TransportEvent::Failed { session, error } => self.on_transport_failed(session, error),
            TransportEvent::Closed {
                session,
                code,
                reason,
                cause,
            } => self.on_transport_closed(session, code, &reason, cause).await,
            TransportEvent::Frame { session, frame } => self.on_frame(session, frame),
        }
    }
}

impl<T, H, R> KameoMessage<TimerEvent> for LinkActor<T, H, R>
where
    T: WsTransport,
    H: HeartbeatStrategy,
    R: ReconnectStrategy,
{
    type Reply = ();

    async fn handle(&mut self, msg: TimerEvent, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        match msg {
            TimerEvent::PingDue { session, probe } => {
                if !self.timer_is_current(session, probe) {
                    debug!(session, probe, "ignoring stale ping timer");
                    return;
                }
                if let Some(current) = self.session.as_mut() {
                    current.ping_timer = None;
                }
                self.send_ping().await;
            }
            TimerEvent::PongDeadline { session, probe } => {
                if !self.timer_is_current(session, probe) {
                    debug!(session, probe, "ignoring stale pong deadline");
                    return;
                }
                if let Some(current) = self.session.as_mut() {
                    current.pong_timer = None;
                }
                self.on_pong_missed(session).await;
            }
            TimerEvent::ReconnectDue { token } => {
                if token != self.reconnect_token || self.reconnect_timer.is_none() {
                    debug!(token, "ignoring stale reconnect timer");
                    return;
                }
                self.reconnect_timer = None;
                self.reconnect("reconnect_timer", false).await;
            }
        }
    }
}

impl<T, H, R> KameoMessage<ActivityChanged> for LinkActor<T, H, R>
where
    T: WsTransport,
    H: HeartbeatStrategy,
    R: ReconnectStrategy,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ActivityChanged,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        debug!(url = %self.url, active = msg.active, state = %self.state, "user activity changed");
        if !msg.active {
            return;
        }
        let retry = match self.state {
            ConnectionState::Error => true,
            ConnectionState::Disconnected => self.withheld_for_inactivity,
            _ => false,
        };
        if retry {
            self.reconnect("user_active", false).await;
        }
    }
}

impl<T, H, R> LinkActor<T, H, R>
where
    T: WsTransport,
    H: HeartbeatStrategy,
    R: ReconnectStrategy,
{
    async fn connect(&mut self) {
        if self.state == ConnectionState::Connecting && self.pending.is_some() {
            debug!(url = %self.url, "connect already in flight");
            return;
        }

        self.cancel_reconnect_timer();
        self.withheld_for_inactivity = false;
        if let Some(pending) = self.pending.take() {
            pending.task.abort();
        }
        if let Some(session) = self.session.as_ref() {
            info!(
                url = %self.url,
                session = session.id,
                cause = ?CloseCause::Replaced,
                "replacing open session"
            );
            self.release_session(Some((CloseCode::CLOSING_FOR_RECONNECT, REPLACED_REASON)))
                .await;
        }

        self.next_session = self.next_session.wrapping_add(1);
        let id = self.next_session;
        self.last_error = None;
        self.heartbeat.reset();
        self.set_state(ConnectionState::Connecting);
        info!(url = %self.url, session = id, "connecting");

        let actor_ref = self.actor_ref.clone();
        let transport = self.transport.clone();
        let url = self.url.clone();
        let buffers = self.buffers;
        let connect_timeout = self.connect_timeout;

        let task = tokio::spawn(async move {
            let result =
                match tokio::time::timeout(connect_timeout, transport.connect(url, buffers)).await {
                    Ok(result) => result,
                    Err(_) => Err(LinkError::Transport {
                        context: "connect",
                        error: format!("timed out after {connect_timeout:?}"),
                    }),
                };

            match result {
                Ok((reader, writer)) => {
                    let _ = actor_ref
                        .tell(TransportOpened::<T> {
                            session: id,
                            reader,
                            writer,
                        })
                        .send()
                        .await;
                }
                Err(error) => {
                    let reason = error.to_string();
                    if actor_ref
                        .tell(TransportEvent::Failed { session: id, error })
                        .send()
                        .await
                        .is_err()
                    {
                        return;
                    }
                    let _ = actor_ref
                        .tell(TransportEvent::Closed {
                            session: id,
                            code: CloseCode::ABNORMAL_CLOSURE,
                            reason,
                            cause: CloseCause::HandshakeFailed,
                        })
                        .send()
                        .await;
                }
            }
        });

        self.pending = Some(PendingConnect { id, task });
    }

    async fn disconnect(&mut self, code: CloseCode, reason: &str) {
        self.cancel_reconnect_timer();
        self.withheld_for_inactivity = false;
        if self.session.is_none() && self.pending.is_none() {
            if self.state == ConnectionState::Error && code.is_graceful() {
                self.set_state(ConnectionState::Disconnected);
            }
            return;
        }

        info!(url = %self.url, code = code.as_u16(), reason = %reason, "closing session");
        self.release_session(Some((code, reason))).await;
        self.handle_close(code, reason, CloseCause::Requested).await;
    }

    fn on_transport_opened(&mut self, session: u64, reader: T::Reader, writer: T::Writer) {
        if self.pending.as_ref().is_none_or(|pending| pending.id != session) {
            debug!(session, "discarding transport for a superseded session");
            tokio::spawn(async move {
                let mut writer = writer;
                let _ = writer.close().await;
                drop(reader);
            });
            return;
        }
        self.pending = None;

        let writer = WsWriterActor::spawn(WsWriterActor::new(writer, session));
        let reader_task = self.spawn_reader(session, reader);
        self.session = Some(Session {
            id: session,
            writer,
            reader_task,
            ping_timer: None,
            pong_timer: None,
            probe: 0,
        });

        self.last_error = None;
        self.heartbeat.reset();
        self.reconnect.reset();
        self.health.record_session_open();
        info!(url = %self.url, session, "socket connected");
        self.set_state(ConnectionState::Connected);
        self.schedule_ping(self.heartbeat.interval());
    }

    fn spawn_reader(&self, session: u64, mut reader: T::Reader) -> JoinHandle<()> {
        let actor_ref = self.actor_ref.clone();
        tokio::spawn(async move {
            loop {
                match reader.next().await {
                    Some(Ok(WsFrame::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => (frame.code, frame.reason_lossy()),
                            None => (CloseCode::NO_STATUS_RECEIVED, String::new()),
                        };
                        let _ = actor_ref
                            .tell(TransportEvent::Closed {
                                session,
                                code,
                                reason,
                                cause: CloseCause::RemoteClosed,
                            })
                            .send()
                            .await;
                        break;
                    }
                    Some(Ok(frame)) => {
                        if actor_ref
                            .tell(TransportEvent::Frame { session, frame })
                            .send()
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Err(error)) => {
                        let reason = error.to_string();
                        if actor_ref
                            .tell(TransportEvent::Failed { session, error })
                            .send()
                            .await
                            .is_err()
                        {
                            break;
                        }
                        let _ = actor_ref
                            .tell(TransportEvent::Closed {
                                session,
                                code: CloseCode::ABNORMAL_CLOSURE,
                                reason,
                                cause: CloseCause::ReadFailure,
                            })
                            .send()
                            .await;
                        break;
                    }
                    None => {
                        let _ = actor_ref
                            .tell(TransportEvent::Closed {
                                session,
                                code: CloseCode::ABNORMAL_CLOSURE,
                                reason: "stream ended without a close frame".to_string(),
                                cause: CloseCause::StreamEnded,
                            })
                            .send()
                            .await;
                        break;
                    }
                }
            }
        })
    }

    fn on_transport_failed(&mut self, session: u64, error: LinkError) {
        if !self.owns(session) {
            debug!(session, error = %error, "ignoring error from a superseded session");
            return;
        }

        let detail = error.to_string();
        let classified = LinkError::for_transport_failure(self.state, detail.clone());
        error!(
            url = %self.url,
            session,
            state = %self.state,
            error = %detail,
            "{classified}"
        );
        self.health.record_error("transport", &detail);
        self.cancel_heartbeat();
        self.last_error = Some(classified);
        self.set_state(ConnectionState::Error);
    }

    async fn on_transport_closed(
        &mut self,
        session: u64,
        code: CloseCode,
        reason: &str,
        cause: CloseCause,
    ) {
        if !self.owns(session) {
            debug!(
                session,
                code = code.as_u16(),
                "ignoring close from a superseded session"
            );
            return;
        }
        self.release_session(None).await;
        self.handle_close(code, reason, cause).await;
    }

    async fn handle_close(&mut self, code: CloseCode, reason: &str, cause: CloseCause) {
        if code.is_graceful() {
            info!(
                url = %self.url,
                code = code.as_u16(),
                reason = %reason,
                cause = ?cause,
                "socket closed"
            );
            self.last_error = None;
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        error!(
            url = %self.url,
            code = code.as_u16(),
            description = code.description(),
            reason = %reason,
            cause = ?cause,
            "socket closed abnormally"
        );
        if self.last_error.is_none() {
            self.last_error = Some(LinkError::ConnectionLost(format!(
                "close code {code}: {}",
                code.description()
            )));
        }
        self.health.record_error("close", code.description());
        if self.gate().permits() && self.state != ConnectionState::Error {
            self.set_state(ConnectionState::Error);
        }
        self.reconnect("abnormal_close", true).await;
    }

    /// Decide whether to reconnect. A refused reconnect settles in `Disconnected`; a delayed one
    /// waits in `Error`.
    async fn reconnect(&mut self, trigger: &'static str, allow_delay: bool) {
        let gate = self.gate();
        if !gate.permits() {
            self.withheld_for_inactivity = gate.keep_connection_open && !gate.user_active;
            self.log_reconnect_plan(trigger, gate.refusal().unwrap_or("refused"), None);
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        let delay = if allow_delay {
            self.reconnect.next_delay()
        } else {
            Duration::ZERO
        };
        self.log_reconnect_plan(trigger, "scheduled", Some(delay));

        if delay.is_zero() {
            self.health.increment_reconnect();
            self.connect().await;
            return;
        }

        if self.state != ConnectionState::Error {
            self.set_state(ConnectionState::Error);
        }
        self.schedule_reconnect(delay);
    }

    fn gate(&self) -> ReconnectGate {
        ReconnectGate {
            keep_connection_open: self.keep_connection_open,
            user_active: self.activity.is_active(),
        }
    }

    fn schedule_reconnect(&mut self, delay: Duration) {
        self.cancel_reconnect_timer();
        self.reconnect_token = self.reconnect_token.wrapping_add(1);
        let token = self.reconnect_token;
        let actor_ref = self.actor_ref.clone();
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = actor_ref.tell(TimerEvent::ReconnectDue { token }).send().await;
        }));
    }

    fn cancel_reconnect_timer(&mut self) {
        cancel_timer(&mut self.reconnect_timer);
    }

    /// Tear down the pending handshake and the open session, optionally sending a close frame.
    /// Leaves `state` untouched; callers decide the transition.
    async fn release_session(&mut self, close: Option<(CloseCode, &str)>) {
        if let Some(pending) = self.pending.take() {
            pending.task.abort();
        }
        let Some(mut session) = self.session.take() else {
            return;
        };

        cancel_timer(&mut session.ping_timer);
        cancel_timer(&mut session.pong_timer);
        session.reader_task.abort();

        if let Some((code, reason)) = close {
            let frame = WsFrame::close(code, reason);
            if let Err(err) = session.writer.tell(WriterWrite { frame }).send().await {
                debug!(session = session.id, error = %err, "close frame not delivered");
            }
        }
        let _ = session.writer.stop_gracefully().await;
        session.writer.wait_for_shutdown().await;

        self.heartbeat.reset();
        self.health.record_session_closed();
    }

    fn owns(&self, session: u64) -> bool {
        self.pending.as_ref().is_some_and(|p| p.id == session)
            || self.session.as_ref().is_some_and(|s| s.id == session)
    }

    fn timer_is_current(&self, session: u64, probe: u64) -> bool {
        self.state == ConnectionState::Connected
            && self
                .session
                .as_ref()
                .is_some_and(|s| s.id == session && s.probe == probe)
    }

    fn cancel_heartbeat(&mut self) {
        if let Some(session) = self.session.as_mut() {
            cancel_timer(&mut session.ping_timer);
            cancel_timer(&mut session.pong_timer);
        }
        self.heartbeat.reset();
    }

    fn schedule_ping(&mut self, delay: Duration) {
        let actor_ref = self.actor_ref.clone();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        cancel_timer(&mut session.ping_timer);
        cancel_timer(&mut session.pong_timer);
        session.probe = session.probe.wrapping_add(1);
        let (id, probe) = (session.id, session.probe);
        session.ping_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = actor_ref
                .tell(TimerEvent::PingDue { session: id, probe })
                .send()
                .await;
        }));
    }

    fn arm_pong_timeout(&mut self) {
        let timeout = self.heartbeat.timeout();
        let actor_ref = self.actor_ref.clone();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        cancel_timer(&mut session.pong_timer);
        session.probe = session.probe.wrapping_add(1);
        let (id, probe) = (session.id, session.probe);
        session.pong_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = actor_ref
                .tell(TimerEvent::PongDeadline { session: id, probe })
                .send()
                .await;
        }));
    }

    async fn send_ping(&mut self) {
        let Some((id, writer)) = self.session.as_ref().map(|s| (s.id, s.writer.clone())) else {
            return;
        };
        let frame = self.heartbeat.create_ping();
        debug!(session = id, missed = self.heartbeat.missed(), "sending ping");
        match writer.tell(WriterWrite { frame }).send().await {
            Ok(()) => self.health.record_sent(),
            Err(err) => {
                warn!(url = %self.url, session = id, error = %err, "ping not delivered");
                self.health.record_error("ping", &err.to_string());
            }
        }
        // A ping that could not be written is still timed; the miss count closes the session.
        self.arm_pong_timeout();
    }

    async fn on_pong_missed(&mut self, session: u64) {
        let missed = self.heartbeat.record_miss();
        self.health.record_missed_pong();
        warn!(
            url = %self.url,
            session,
            missed,
            max = self.heartbeat.max_missed(),
            "missed heartbeat pong"
        );

        if !self.heartbeat.is_dead() {
            self.send_ping().await;
            return;
        }

        let code = CloseCode::CLOSING_FOR_RECONNECT;
        self.release_session(Some((code, MISSED_HEARTBEAT_REASON)))
            .await;
        self.handle_close(code, MISSED_HEARTBEAT_REASON, CloseCause::MissedHeartbeat)
            .await;
    }

    fn on_frame(&mut self, session: u64, frame: WsFrame) {
        let current = self.state == ConnectionState::Connected
            && self.session.as_ref().is_some_and(|s| s.id == session);
        if !current {
            debug!(session, "ignoring frame from a superseded session");
            return;
        }
        self.health.record_inbound();

        match self.heartbeat.handle_inbound(&frame) {
            PongOutcome::PongReceived(rtt) => {
                if let Some(rtt) = rtt {
                    self.health.record_rtt(rtt);
                }
                self.schedule_ping(self.heartbeat.interval());
                return;
            }
            PongOutcome::Unsolicited => {
                debug!(session, "ignoring pong with no outstanding ping");
                return;
            }
            PongOutcome::NotPong => {}
        }

        match decode_frame(&frame, self.limits.max_inbound_bytes) {
            Ok(DecodedFrame::Message(message)) => {
                if message.kind == ServerMessageType::Rebooting {
                    info!(url = %self.url, "device is rebooting");
                    self.activity.poke();
                }
                self.events.emit_message(&message);
            }
            Ok(DecodedFrame::Sentinel(sentinel)) => {
                debug!(session, sentinel = ?sentinel, "ignoring unexpected sentinel");
            }
            Ok(DecodedFrame::Control) => {}
            Err(err) => {
                warn!(url = %self.url, session, error = %err, "dropping malformed frame");
                self.health.record_malformed(&err.to_string());
            }
        }
    }

    async fn send_frame(&mut self, frame: WsFrame) {
        let target = match self.session.as_ref() {
            Some(session) if self.state == ConnectionState::Connected => {
                Some((session.id, session.writer.clone()))
            }
            _ => None,
        };
        let Some((id, writer)) = target else {
            debug!(url = %self.url, state = %self.state, "dropping outbound frame; no open session");
            self.health.record_dropped_outbound();
            return;
        };

        match writer.tell(WriterWrite { frame }).send().await {
            Ok(()) => self.health.record_sent(),
            Err(err) => {
                warn!(url = %self.url, session = id, error = %err, "websocket writer send failed");
                self.health.record_error("outbound", &err.to_string());
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        let previous = self.state;
        self.state = state;
        self.snapshot.send_replace(LinkSnapshot {
            state,
            error: self.last_error.clone(),
        });
        debug!(url = %self.url, from = %previous, to = %state, "state transition");
        self.events.emit_state(state);
    }

    fn log_reconnect_plan(&self, trigger: &str, note: &str, delay: Option<Duration>) {
        let stats = self.health.get_stats();
        let last_error = self.last_error.as_ref().map(ToString::to_string);
        match delay {
            None => info!(
                url = %self.url,
                trigger = %trigger,
                note = %note,
                keep_open = self.keep_connection_open,
                reconnects = stats.reconnects,
                last_error = ?last_error,
                "link reconnect plan"
            ),
            Some(delay) => warn!(
                url = %self.url,
                trigger = %trigger,
                note = %note,
                delay_ms = delay.as_millis().min(u64::MAX as u128) as u64,
                reconnects = stats.reconnects,
                missed_pongs = stats.missed_pongs,
                last_error = ?last_error,
                "link reconnect plan"
            ),
        }
    }
}
