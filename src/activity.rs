//! User-activity signal.
//!
//! The link only reconnects on its own while the user is considered active. `UserActivity` is a
//! cheap cloneable handle over a `watch` channel: embedders either drive it by hand
//! ([`UserActivity::manual`]) or let an inactivity timer do it
//! ([`UserActivity::with_inactivity_threshold`]).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::debug;

/// Default time without interaction before the user is considered inactive.
pub const DEFAULT_INACTIVITY_THRESHOLD: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy)]
enum ActivityInput {
    Poke,
    Visibility(bool),
    Force(bool),
}

#[derive(Clone, Debug)]
pub struct UserActivity {
    state: Arc<watch::Sender<bool>>,
    input: Option<mpsc::UnboundedSender<ActivityInput>>,
}

impl UserActivity {
    /// Signal that only changes when the embedder calls [`set_active`](Self::set_active) or
    /// [`poke`](Self::poke).
    pub fn manual(active: bool) -> Self {
        let (tx, _rx) = watch::channel(active);
        Self {
            state: Arc::new(tx),
            input: None,
        }
    }

    /// Signal that is active now and turns inactive after `threshold` without a poke.
    ///
    /// Spawns the timer task, so this must be called inside a tokio runtime. The task exits once
    /// every handle has been dropped.
    pub fn with_inactivity_threshold(threshold: Duration) -> Self {
        let (tx, _rx) = watch::channel(true);
        let state = Arc::new(tx);
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        tokio::spawn(track_inactivity(Arc::clone(&state), input_rx, threshold));
        Self {
            state,
            input: Some(input_tx),
        }
    }

    pub fn is_active(&self) -> bool {
        *self.state.borrow()
    }

    /// Receiver notified whenever the active flag changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Record user interaction; marks the user active and restarts the inactivity timer.
    pub fn poke(&self) {
        match &self.input {
            Some(input) => {
                let _ = input.send(ActivityInput::Poke);
            }
            None => set_flag(&self.state, true),
        }
    }

    /// Override the flag. In tracked mode, forcing active also restarts the timer and forcing
    /// inactive stops it until the next poke.
    pub fn set_active(&self, active: bool) {
        match &self.input {
            Some(input) => {
                let _ = input.send(ActivityInput::Force(active));
            }
            None => set_flag(&self.state, active),
        }
    }

    /// Report page visibility. Becoming visible counts as interaction.
    pub fn set_page_visible(&self, visible: bool) {
        match &self.input {
            Some(input) => {
                let _ = input.send(ActivityInput::Visibility(visible));
            }
            None if visible => set_flag(&self.state, true),
            None => {}
        }
    }
}

fn set_flag(state: &watch::Sender<bool>, active: bool) {
    state.send_if_modified(|current| {
        let changed = *current != active;
        *current = active;
        changed
    });
}

async fn track_inactivity(
    state: Arc<watch::Sender<bool>>,
    mut input: mpsc::UnboundedReceiver<ActivityInput>,
    threshold: Duration,
) {
    let mut visible = true;
    let mut deadline = Some(Instant::now() + threshold);

    loop {
        let expiry = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            msg = input.recv() => {
                let Some(msg) = msg else { break };
                match msg {
                    ActivityInput::Poke => {
                        set_flag(&state, true);
                        deadline = Some(Instant::now() + threshold);
                    }
                    ActivityInput::Visibility(now_visible) => {
                        let became_visible = now_visible && !visible;
                        visible = now_visible;
                        if became_visible {
                            set_flag(&state, true);
                            deadline = Some(Instant::now() + threshold);
                        }
                    }
                    ActivityInput::Force(active) => {
                        set_flag(&state, active);
                        deadline = active.then(|| Instant::now() + threshold);
                    }
                }
            }
            _ = expiry => {
                debug!(threshold_ms = threshold.as_millis() as u64, "user inactive");
                deadline = None;
                set_flag(&state, false);
            }
        }
    }
}
