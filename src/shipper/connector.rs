//! Connection ownership and the reconnect loop.

use std::{
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use crate::rate_limited_warner::RateLimitedWarner;

use super::{
    backoff::BackoffState,
    config::BackoffPolicy,
    state::{ConnectionState, DeliveryStats, SharedState, ShutdownSignal},
    transport::{Connection, Dial},
};

/// The shutdown signal fired while the connector was waiting.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Cancelled;

/// Owns the single active connection and re-establishes it on demand.
pub(crate) struct Connector<D: Dial> {
    dialer: D,
    conn: Option<D::Conn>,
    connect_timeout: Duration,
    backoff: BackoffState,
    cooldown: Option<Duration>,
    warner: RateLimitedWarner,
    state: Arc<SharedState>,
    stats: Arc<DeliveryStats>,
}

impl<D: Dial> Connector<D> {
    pub(crate) fn new(
        dialer: D,
        connect_timeout: Duration,
        backoff: BackoffPolicy,
        warn_interval: Duration,
        state: Arc<SharedState>,
        stats: Arc<DeliveryStats>,
    ) -> Self {
        Self {
            dialer,
            conn: None,
            connect_timeout,
            backoff: BackoffState::new(backoff),
            cooldown: None,
            warner: RateLimitedWarner::new(warn_interval),
            state,
            stats,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Borrow the active connection, if any.
    pub(crate) fn connection(&mut self) -> Option<&mut D::Conn> {
        self.conn.as_mut()
    }

    /// Connect unless already connected, retrying without limit.
    ///
    /// Each attempt is bounded by the connect timeout; failures pause for the
    /// backoff delay. Only the shutdown signal ends the loop early.
    pub(crate) fn ensure_connected(&mut self, shutdown: &ShutdownSignal) -> Result<(), Cancelled> {
        if self.conn.is_some() {
            return Ok(());
        }
        self.state.set(ConnectionState::Connecting);
        if let Some(pause) = self.cooldown.take()
            && shutdown.wait_timeout(pause)
        {
            return Err(Cancelled);
        }
        loop {
            if shutdown.is_triggered() {
                return Err(Cancelled);
            }
            match self.dialer.dial(self.connect_timeout) {
                Ok(conn) => {
                    self.install(conn);
                    return Ok(());
                }
                Err(err) => self.report_connect_failure(&err),
            }
            let delay = self.backoff.next_sleep();
            debug!(
                "femtoship: retrying {} in {delay:?}",
                self.dialer.endpoint()
            );
            if shutdown.wait_timeout(delay) {
                return Err(Cancelled);
            }
        }
    }

    fn install(&mut self, conn: D::Conn) {
        if let Some(mut old) = self.conn.take() {
            old.shutdown();
        }
        self.conn = Some(conn);
        self.backoff.record_connected(Instant::now());
        self.stats.record_connect();
        self.state.set(ConnectionState::Connected);
        self.warner.flush(|count| {
            warn!("femtoship: {count} more connect attempts failed before recovery");
        });
        info!("femtoship: connected to {}", self.dialer.endpoint());
    }

    fn report_connect_failure(&self, err: &io::Error) {
        self.warner.record_drop();
        self.warner.warn_if_due(|count| {
            warn!(
                "femtoship: failed to connect to {}: {err}; {count} attempts failed",
                self.dialer.endpoint()
            );
        });
    }

    /// Note a successful write for backoff bookkeeping.
    pub(crate) fn record_success(&mut self) {
        self.backoff.record_success(Instant::now());
    }

    /// Drop the current connection after a failure and arm a pause before
    /// the next attempt.
    pub(crate) fn abandon(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.shutdown();
        }
        self.backoff.record_disconnect();
        self.cooldown = Some(self.backoff.next_sleep());
        self.state.set(ConnectionState::Disconnected);
    }

    /// Close the connection without arming a pause.
    pub(crate) fn disconnect(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.shutdown();
        }
        self.backoff.record_disconnect();
    }

    pub(crate) fn endpoint(&self) -> String {
        self.dialer.endpoint()
    }
}
