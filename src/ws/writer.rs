use futures_util::{Sink, SinkExt};
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage};
use tracing::debug;

use crate::core::{LinkError, LinkResult, WsFrame};

/// Writer actor that owns the transport sink and serializes writes for one session.
pub struct WsWriterActor<W>
where
    W: Sink<WsFrame, Error = LinkError> + Send + Unpin + 'static,
{
    writer: W,
    session: u64,
    closed: bool,
}

impl<W> WsWriterActor<W>
where
    W: Sink<WsFrame, Error = LinkError> + Send + Unpin + 'static,
{
    pub fn new(writer: W, session: u64) -> Self {
        Self {
            writer,
            session,
            closed: false,
        }
    }
}

impl<W> Actor for WsWriterActor<W>
where
    W: Sink<WsFrame, Error = LinkError> + Send + Unpin + 'static,
{
    type Args = Self;
    type Error = LinkError;

    async fn on_start(args: Self::Args, _ctx: ActorRef<Self>) -> Result<Self, Self::Error> {
        Ok(args)
    }

    fn on_panic(
        &mut self,
        _actor_ref: kameo::actor::WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        let session = self.session;
        async move {
            tracing::error!(session, error = ?err, "WsWriterActor panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

#[derive(Clone, Debug)]
pub struct WriterWrite {
    pub frame: WsFrame,
}

impl<W> KameoMessage<WriterWrite> for WsWriterActor<W>
where
    W: Sink<WsFrame, Error = LinkError> + Send + Unpin + 'static,
{
    type Reply = LinkResult<()>;

    async fn handle(&mut self, msg: WriterWrite, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if self.closed {
            return Err(LinkError::InvalidState(
                "writer already sent a close frame".to_string(),
            ));
        }
        if matches!(msg.frame, WsFrame::Close(_)) {
            self.closed = true;
        }
        debug!(target: "garagebot-link-writer", session = self.session, "sending frame to wire");
        self.writer.send(msg.frame).await
    }
}
