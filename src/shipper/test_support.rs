//! Scripted transport doubles for connector and pump tests.
//!
//! [`ScriptedDialer`] follows a queue of [`ConnPlan`]s, one per dial attempt,
//! and records every byte each connection accepted so tests can inspect what
//! a collector would have seen.

use std::{
    collections::VecDeque,
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;

use super::{
    config::BackoffPolicy,
    transport::{Connection, Dial},
};

/// What the next dial attempt does.
#[derive(Clone, Debug)]
pub(crate) enum ConnPlan {
    /// Fail the dial with `ConnectionRefused`.
    Refuse,
    /// Accept, then fail writes once `limit` bytes were taken; `chunk` caps
    /// the bytes accepted per write call.
    Accept {
        limit: Option<usize>,
        chunk: Option<usize>,
    },
}

impl ConnPlan {
    pub(crate) fn accept() -> Self {
        Self::Accept {
            limit: None,
            chunk: None,
        }
    }

    pub(crate) fn fail_after(limit: usize) -> Self {
        Self::Accept {
            limit: Some(limit),
            chunk: None,
        }
    }

    pub(crate) fn chunked(chunk: usize) -> Self {
        Self::Accept {
            limit: None,
            chunk: Some(chunk),
        }
    }
}

pub(crate) type Received = Arc<Mutex<Vec<Vec<u8>>>>;

pub(crate) struct ScriptedDialer {
    plans: VecDeque<ConnPlan>,
    fallback: ConnPlan,
    attempts: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    received: Received,
}

impl ScriptedDialer {
    /// Follow `plans`, then accept every further attempt.
    pub(crate) fn new(plans: impl IntoIterator<Item = ConnPlan>) -> Self {
        Self {
            plans: plans.into_iter().collect(),
            fallback: ConnPlan::accept(),
            attempts: Arc::default(),
            closed: Arc::default(),
            received: Arc::default(),
        }
    }

    /// Accept every attempt.
    pub(crate) fn accepting() -> Self {
        Self::new(Vec::new())
    }

    /// Refuse every attempt.
    pub(crate) fn refusing() -> Self {
        let mut dialer = Self::accepting();
        dialer.fallback = ConnPlan::Refuse;
        dialer
    }

    pub(crate) fn attempts(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.attempts)
    }

    pub(crate) fn closed_connections(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closed)
    }

    /// Bytes accepted, one entry per established connection.
    pub(crate) fn received(&self) -> Received {
        Arc::clone(&self.received)
    }
}

impl Dial for ScriptedDialer {
    type Conn = ScriptedConn;

    fn dial(&mut self, _timeout: Duration) -> io::Result<ScriptedConn> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let plan = self.plans.pop_front().unwrap_or_else(|| self.fallback.clone());
        match plan {
            ConnPlan::Refuse => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "scripted refusal",
            )),
            ConnPlan::Accept { limit, chunk } => {
                let mut received = self.received.lock();
                received.push(Vec::new());
                Ok(ScriptedConn {
                    index: received.len() - 1,
                    remaining: limit,
                    chunk,
                    received: Arc::clone(&self.received),
                    closed: Arc::clone(&self.closed),
                })
            }
        }
    }

    fn endpoint(&self) -> String {
        "scripted:0".into()
    }
}

pub(crate) struct ScriptedConn {
    index: usize,
    remaining: Option<usize>,
    chunk: Option<usize>,
    received: Received,
    closed: Arc<AtomicUsize>,
}

impl Connection for ScriptedConn {
    fn set_write_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut n = buf.len();
        if let Some(chunk) = self.chunk {
            n = n.min(chunk);
        }
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted reset"));
            }
            n = n.min(*remaining);
            *remaining -= n;
        }
        self.received.lock()[self.index].extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Backoff tuned for tests: short, deterministic pauses.
pub(crate) fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy {
        base: Duration::from_millis(5),
        cap: Duration::from_millis(20),
        reset_after: Duration::from_secs(30),
        jitter: false,
    }
}
