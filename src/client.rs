//! Handle used by the rest of the application to talk to a device link.

use std::time::Duration;

use kameo::prelude::{Actor, ActorRef};
use tokio::sync::watch;

use crate::activity::UserActivity;
use crate::core::{
    CloseCode, ConnectionState, FrameLimits, HeartbeatStrategy, ImmediateReconnect, LinkConfig,
    LinkError, LinkResult, LinkSnapshot, LinkStats, ReconnectStrategy, SentinelHeartbeat,
};
use crate::events::{EventHub, Subscription};
use crate::protocol::{ClientMessageType, InboundMessage, OutboundMessage, Payload, encode_message};
use crate::transport::WsTransport;
use crate::transport::tungstenite::TungsteniteTransport;
use crate::ws::{GetLinkSnapshot, GetLinkStats, LinkActor, LinkActorArgs, LinkCommand};

fn actor_error(err: impl std::fmt::Display) -> LinkError {
    LinkError::ActorError(err.to_string())
}

/// Cloneable handle to a running [`LinkActor`].
///
/// State and last error are read synchronously from a watch channel the actor publishes to
/// before notifying observers, so an observer that calls [`GarageLink::state`] sees the new
/// state.
pub struct GarageLink<T = TungsteniteTransport, H = SentinelHeartbeat, R = ImmediateReconnect>
where
    T: WsTransport,
    H: HeartbeatStrategy,
    R: ReconnectStrategy,
{
    actor: ActorRef<LinkActor<T, H, R>>,
    snapshot: watch::Receiver<LinkSnapshot>,
    events: EventHub,
    activity: UserActivity,
    limits: FrameLimits,
}

impl<T, H, R> Clone for GarageLink<T, H, R>
where
    T: WsTransport,
    H: HeartbeatStrategy,
    R: ReconnectStrategy,
{
    fn clone(&self) -> Self {
        Self {
            actor: self.actor.clone(),
            snapshot: self.snapshot.clone(),
            events: self.events.clone(),
            activity: self.activity.clone(),
            limits: self.limits,
        }
    }
}

impl GarageLink {
    /// Spawn a link to a real device over tokio-tungstenite.
    pub fn new(config: LinkConfig, activity: UserActivity) -> Self {
        Self::spawn(config, TungsteniteTransport::default().with_nodelay(), activity)
    }
}

impl<T: WsTransport> GarageLink<T> {
    /// Spawn a link with the sentinel heartbeat and immediate reconnects.
    pub fn spawn(config: LinkConfig, transport: T, activity: UserActivity) -> Self {
        let heartbeat = SentinelHeartbeat::from_config(&config.heartbeat);
        Self::spawn_with(config, transport, heartbeat, ImmediateReconnect, activity)
    }
}

impl<T, H, R> GarageLink<T, H, R>
where
    T: WsTransport,
    H: HeartbeatStrategy,
    R: ReconnectStrategy,
{
    pub fn spawn_with(
        config: LinkConfig,
        transport: T,
        heartbeat: H,
        reconnect_strategy: R,
        activity: UserActivity,
    ) -> Self {
        let events = EventHub::new();
        let (snapshot_tx, snapshot) = watch::channel(LinkSnapshot::default());
        let limits = config.limits;
        let actor = LinkActor::spawn(LinkActorArgs {
            config,
            transport,
            heartbeat,
            reconnect_strategy,
            activity: activity.clone(),
            events: events.clone(),
            snapshot: snapshot_tx,
        });
        Self {
            actor,
            snapshot,
            events,
            activity,
            limits,
        }
    }

    /// Open a session. Returns once the handshake is started, not when it completes.
    pub async fn connect(&self) -> LinkResult<()> {
        self.command(LinkCommand::Connect).await
    }

    /// Close the session with a normal closure code.
    pub async fn disconnect(&self, reason: &str) -> LinkResult<()> {
        self.disconnect_with(CloseCode::NORMAL_CLOSURE, reason).await
    }

    /// Close the session with `code`. Abnormal codes follow the reconnect policy.
    pub async fn disconnect_with(&self, code: CloseCode, reason: &str) -> LinkResult<()> {
        self.command(LinkCommand::Disconnect {
            code,
            reason: reason.to_string(),
        })
        .await
    }

    /// Encode and queue a message. Encoding and size errors are returned here; a message sent
    /// while no session is open is dropped.
    pub async fn send_message(&self, message: &OutboundMessage) -> LinkResult<()> {
        let frame = encode_message(message, self.limits.max_outbound_bytes)?;
        self.actor
            .tell(LinkCommand::Send(frame))
            .send()
            .await
            .map_err(actor_error)
    }

    pub async fn send(&self, kind: ClientMessageType, payload: Payload) -> LinkResult<()> {
        self.send_message(&OutboundMessage::new(kind, payload)).await
    }

    pub async fn set_keep_connection_open(&self, keep_open: bool) -> LinkResult<()> {
        self.command(LinkCommand::SetKeepConnectionOpen(keep_open))
            .await
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot.borrow().state
    }

    pub fn last_error(&self) -> Option<LinkError> {
        self.snapshot.borrow().error.clone()
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Snapshot straight from the actor, ordered after every message sent before it.
    pub async fn query_snapshot(&self) -> LinkResult<LinkSnapshot> {
        self.actor.ask(GetLinkSnapshot).await.map_err(actor_error)
    }

    pub fn watch(&self) -> watch::Receiver<LinkSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until the link reports `state`. Transient states may be coalesced by the watch
    /// channel; use [`GarageLink::on_state_change`] to observe every transition.
    pub async fn wait_for_state(&self, state: ConnectionState, timeout: Duration) -> LinkResult<()> {
        let mut rx = self.snapshot.clone();
        match tokio::time::timeout(timeout, rx.wait_for(|snap| snap.state == state)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(LinkError::ActorError("link actor stopped".to_string())),
            Err(_) => Err(LinkError::InvalidState(format!(
                "timed out waiting for {state}"
            ))),
        }
    }

    pub fn on_state_change<F>(&self, observer: F) -> Subscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.events.on_state_change(observer)
    }

    pub fn on_message<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.events.on_message(observer)
    }

    pub fn activity(&self) -> &UserActivity {
        &self.activity
    }

    pub async fn stats(&self) -> LinkResult<LinkStats> {
        self.actor.ask(GetLinkStats).await.map_err(actor_error)
    }

    pub fn actor_ref(&self) -> &ActorRef<LinkActor<T, H, R>> {
        &self.actor
    }

    /// Close any open session with `1001` and stop the actor.
    pub async fn stop(&self) {
        let _ = self.actor.stop_gracefully().await;
        self.actor.wait_for_shutdown().await;
    }

    async fn command(&self, command: LinkCommand) -> LinkResult<()> {
        self.actor.ask(command).await.map_err(actor_error)
    }
}
