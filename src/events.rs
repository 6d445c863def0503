//! Observer registry for link events.
//!
//! Observers are invoked synchronously, in registration order, from inside the link actor. They
//! must not block and must not wait on the link (for example by awaiting `GarageLink::stats`).

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::core::ConnectionState;
use crate::protocol::InboundMessage;

type StateObserver = Arc<dyn Fn(ConnectionState) + Send + Sync>;
type MessageObserver = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

#[derive(Default)]
struct Observers {
    next_id: u64,
    state: Vec<(u64, StateObserver)>,
    messages: Vec<(u64, MessageObserver)>,
}

impl Observers {
    fn allocate_id(&mut self) -> u64 {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    State,
    Messages,
}

/// Shared registry of state-change and message observers.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<Mutex<Observers>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_state_change<F>(&self, observer: F) -> Subscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.allocate_id();
        inner.state.push((id, Arc::new(observer)));
        self.subscription(id, Channel::State)
    }

    pub fn on_message<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.allocate_id();
        inner.messages.push((id, Arc::new(observer)));
        self.subscription(id, Channel::Messages)
    }

    pub fn observer_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.state.len() + inner.messages.len()
    }

    pub(crate) fn emit_state(&self, state: ConnectionState) {
        // Snapshot so observers may subscribe or unsubscribe while being notified.
        let observers: Vec<StateObserver> = self
            .inner
            .lock()
            .state
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        for observer in observers {
            observer(state);
        }
    }

    pub(crate) fn emit_message(&self, message: &InboundMessage) {
        let observers: Vec<MessageObserver> = self
            .inner
            .lock()
            .messages
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        for observer in observers {
            observer(message);
        }
    }

    fn subscription(&self, id: u64, channel: Channel) -> Subscription {
        Subscription {
            hub: Arc::downgrade(&self.inner),
            id,
            channel,
            active: true,
        }
    }
}

/// Disposer returned by [`EventHub`] registrations. Dropping it unregisters the observer.
#[must_use = "dropping a Subscription unregisters the observer; call `detach` to keep it"]
pub struct Subscription {
    hub: Weak<Mutex<Observers>>,
    id: u64,
    channel: Channel,
    active: bool,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    /// Keep the observer registered for the lifetime of the hub.
    pub fn detach(mut self) {
        self.active = false;
    }

    fn remove(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        let mut inner = hub.lock();
        match self.channel {
            Channel::State => inner.state.retain(|(id, _)| *id != self.id),
            Channel::Messages => inner.messages.retain(|(id, _)| *id != self.id),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}
