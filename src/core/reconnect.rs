use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::SmallRng};

/// Delay policy applied once the link has decided to reconnect.
///
/// Whether to reconnect at all is decided by [`ReconnectGate`]; the strategy only spaces attempts.
pub trait ReconnectStrategy: Send + 'static {
    fn next_delay(&mut self) -> Duration;
    /// Called when a session opens.
    fn reset(&mut self);
}

/// Reconnect as soon as the gate allows. This is the default.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateReconnect;

impl ReconnectStrategy for ImmediateReconnect {
    fn next_delay(&mut self) -> Duration {
        Duration::ZERO
    }

    fn reset(&mut self) {}
}

/// Opt-in exponential backoff with jitter, for deployments where immediate retries against an
/// offline device are undesirable.
#[derive(Clone, Debug)]
pub struct ExponentialBackoffReconnect {
    base: Duration,
    max: Duration,
    factor: f64,
    current: Duration,
    jitter: bool,
}

impl ExponentialBackoffReconnect {
    pub fn new(base: Duration, max: Duration, factor: f64) -> Self {
        let factor = if factor.is_finite() && factor > 1.0 {
            factor
        } else {
            1.5
        };
        Self {
            base,
            max: max.max(base),
            factor,
            current: base,
            jitter: true,
        }
    }

    /// Disable jitter; delays follow the exact geometric sequence.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

impl Default for ExponentialBackoffReconnect {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30), 2.0)
    }
}

impl ReconnectStrategy for ExponentialBackoffReconnect {
    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let next = (self.current.as_secs_f64() * self.factor).min(self.max.as_secs_f64());
        self.current = Duration::try_from_secs_f64(next).unwrap_or(self.max);
        if self.jitter {
            jitter_delay(delay)
        } else {
            delay
        }
    }

    fn reset(&mut self) {
        self.current = self.base;
    }
}

/// Scale `base` by a random factor in `[0.5, 1.0]`.
pub fn jitter_delay(base: Duration) -> Duration {
    if base.is_zero() {
        return base;
    }

    let mut rng = SmallRng::from_entropy();
    let jitter: f64 = rng.gen_range(0.5..=1.0);
    let nanos = (base.as_nanos() as f64 * jitter) as u128;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

/// Inputs to the reconnect decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectGate {
    pub keep_connection_open: bool,
    pub user_active: bool,
}

impl ReconnectGate {
    pub fn permits(self) -> bool {
        self.keep_connection_open && self.user_active
    }

    /// Short label for logs explaining a refusal.
    pub fn refusal(self) -> Option<&'static str> {
        if !self.keep_connection_open {
            Some("reconnect disabled")
        } else if !self.user_active {
            Some("user is inactive")
        } else {
            None
        }
    }
}
