//! Exponential backoff state machine used by the connector.

use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng, rngs::StdRng};

use super::config::BackoffPolicy;

/// Smallest pause ever produced, so a zero-ish policy cannot spin.
pub(crate) const MIN_SLEEP: Duration = Duration::from_millis(10);

/// Tracks reconnection attempts and produces jittered delays.
pub struct BackoffState {
    policy: BackoffPolicy,
    current: Duration,
    connected_since: Option<Instant>,
    rng: StdRng,
}

impl BackoffState {
    /// Create a new state machine from the supplied policy.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            current: policy.base,
            connected_since: None,
            rng: StdRng::from_entropy(),
            policy,
        }
    }

    /// Record that a connection was established at `now`.
    pub fn record_connected(&mut self, now: Instant) {
        self.connected_since = Some(now);
    }

    /// Record a successful write; resets the window once the connection has
    /// stayed healthy for `reset_after`.
    pub fn record_success(&mut self, now: Instant) {
        if let Some(since) = self.connected_since
            && now.duration_since(since) >= self.policy.reset_after
        {
            self.current = self.policy.base;
        }
    }

    /// Record that the connection was lost.
    pub fn record_disconnect(&mut self) {
        self.connected_since = None;
    }

    /// Calculate the next sleep duration following a failure.
    pub fn next_sleep(&mut self) -> Duration {
        let ceiling = self.current;
        self.current = self.current.saturating_mul(2).min(self.policy.cap);

        let max_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        let min_ms = u64::try_from(MIN_SLEEP.as_millis()).unwrap_or(10);
        let sleep_ms = match max_ms {
            ms if ms <= min_ms => min_ms,
            ms if self.policy.jitter => self.rng.gen_range(min_ms..=ms),
            ms => ms,
        };
        Duration::from_millis(sleep_ms)
    }

    /// Current ceiling for the next sleep.
    #[cfg(test)]
    pub fn ceiling(&self) -> Duration {
        self.current
    }
}
