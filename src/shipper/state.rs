//! State shared between the facade and the pump thread.

use std::{
    sync::atomic::{AtomicU8, AtomicU64, Ordering},
    time::Duration,
};

use parking_lot::{Condvar, Mutex};

/// Lifecycle of the pump and its connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No connection; the pump will connect next.
    Disconnected = 0,
    /// A connect or handshake attempt is in progress or backing off.
    Connecting = 1,
    /// Connected and idle, waiting for records.
    Connected = 2,
    /// Writing a record to the connection.
    Draining = 3,
    /// The pump has exited.
    Stopped = 4,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

/// Atomically published [`ConnectionState`].
#[derive(Debug)]
pub(crate) struct SharedState(AtomicU8);

impl SharedState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Disconnected as u8))
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Counters describing what the pump has handed to the transport.
#[derive(Debug, Default)]
pub(crate) struct DeliveryStats {
    records_sent: AtomicU64,
    bytes_sent: AtomicU64,
    connects: AtomicU64,
    write_failures: AtomicU64,
    retransmits: AtomicU64,
    dropped_on_shutdown: AtomicU64,
}

impl DeliveryStats {
    pub(crate) fn record_sent(&self, bytes: usize) {
        self.records_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retransmit(&self) {
        self.retransmits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, records: usize) {
        self.dropped_on_shutdown
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_sent: self.records_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            retransmits: self.retransmits.load(Ordering::Relaxed),
            dropped_on_shutdown: self.dropped_on_shutdown.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the delivery counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Records fully handed to the transport.
    pub records_sent: u64,
    /// Bytes of those records, delimiters included.
    pub bytes_sent: u64,
    /// Successful connection handshakes.
    pub connects: u64,
    /// Writes that failed and forced a reconnect.
    pub write_failures: u64,
    /// Records resent from byte 0 after a failed write.
    pub retransmits: u64,
    /// Records discarded because shutdown was forced.
    pub dropped_on_shutdown: u64,
}

/// One-shot cancellation flag with an interruptible sleep.
#[derive(Debug, Default)]
pub(crate) struct ShutdownSignal {
    triggered: Mutex<bool>,
    cond: Condvar,
}

impl ShutdownSignal {
    pub(crate) fn trigger(&self) {
        *self.triggered.lock() = true;
        self.cond.notify_all();
    }

    pub(crate) fn is_triggered(&self) -> bool {
        *self.triggered.lock()
    }

    /// Sleep for `timeout` unless triggered first. Returns `true` when triggered.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut triggered = self.triggered.lock();
        if !*triggered {
            // Spurious wakeups only shorten the pause; callers retry anyway.
            self.cond.wait_for(&mut triggered, timeout);
        }
        *triggered
    }
}
