//! Worker thread moving records from the buffer to the connection.
//!
//! The pump runs `loop { ensure_connected(); drain(); }`. Draining pops one
//! record at a time and writes it under a fresh deadline. Any write error
//! abandons the connection and sends control back through the connector;
//! the interrupted record is kept and resent from its first byte once a new
//! connection is up.

use std::{
    io,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, bounded};
use log::{debug, warn};

use crate::buffer::RecordBuffer;

use super::{
    connector::Connector,
    state::{ConnectionState, DeliveryStats, SharedState, ShutdownSignal},
    transport::{Connection, Dial},
};

/// Why a drain pass ended.
#[derive(Debug)]
enum DrainOutcome {
    /// The buffer was closed and every record was handed off.
    Finished,
    /// The shutdown signal fired.
    Cancelled,
    /// A write failed; the connection must be replaced.
    WriteFailed(io::Error),
}

/// Handles the pump shares with the facade.
pub(crate) struct PumpShared {
    pub(crate) buffer: Arc<RecordBuffer>,
    pub(crate) shutdown: Arc<ShutdownSignal>,
    pub(crate) state: Arc<SharedState>,
    pub(crate) stats: Arc<DeliveryStats>,
}

pub(crate) struct Pump<D: Dial> {
    connector: Connector<D>,
    shared: PumpShared,
    write_timeout: Duration,
    pending: Option<Vec<u8>>,
    retransmit: bool,
}

/// Spawn the pump on a named thread.
///
/// The returned receiver yields once the pump has exited.
pub(crate) fn spawn_pump<D: Dial>(
    connector: Connector<D>,
    shared: PumpShared,
    write_timeout: Duration,
) -> io::Result<(thread::JoinHandle<()>, Receiver<()>)> {
    let (done_tx, done_rx) = bounded(1);
    let pump = Pump {
        connector,
        shared,
        write_timeout,
        pending: None,
        retransmit: false,
    };
    let handle = thread::Builder::new()
        .name("femtoship-pump".into())
        .spawn(move || {
            pump.run();
            let _ = done_tx.send(());
        })?;
    Ok((handle, done_rx))
}

impl<D: Dial> Pump<D> {
    pub(crate) fn run(mut self) {
        loop {
            if self.shared.shutdown.is_triggered() {
                break;
            }
            let buffer = &self.shared.buffer;
            if self.pending.is_none() && buffer.is_closed() && buffer.is_empty() {
                break;
            }
            if self
                .connector
                .ensure_connected(&self.shared.shutdown)
                .is_err()
            {
                break;
            }
            match self.drain() {
                DrainOutcome::Finished | DrainOutcome::Cancelled => break,
                DrainOutcome::WriteFailed(err) => {
                    warn!(
                        "femtoship: write to {} failed: {err}; reconnecting",
                        self.connector.endpoint()
                    );
                    self.shared.stats.record_write_failure();
                    self.connector.abandon();
                }
            }
        }
        self.finish();
    }

    fn drain(&mut self) -> DrainOutcome {
        loop {
            if self.shared.shutdown.is_triggered() {
                return DrainOutcome::Cancelled;
            }
            let record = match self.pending.take() {
                Some(record) => record,
                None => {
                    self.shared.state.set(ConnectionState::Connected);
                    match self.shared.buffer.pop_blocking() {
                        Some(record) => record,
                        None => return DrainOutcome::Finished,
                    }
                }
            };
            if self.shared.shutdown.is_triggered() {
                self.pending = Some(record);
                return DrainOutcome::Cancelled;
            }
            self.shared.state.set(ConnectionState::Draining);
            if self.retransmit {
                self.shared.stats.record_retransmit();
                self.retransmit = false;
            }
            let Some(conn) = self.connector.connection() else {
                self.pending = Some(record);
                return DrainOutcome::WriteFailed(io::Error::from(io::ErrorKind::NotConnected));
            };
            match send_record(conn, &record, self.write_timeout) {
                Ok(()) => {
                    self.shared.stats.record_sent(record.len());
                    self.shared.buffer.settle();
                    self.connector.record_success();
                }
                Err(err) => {
                    self.pending = Some(record);
                    self.retransmit = true;
                    return DrainOutcome::WriteFailed(err);
                }
            }
        }
    }

    fn finish(&mut self) {
        let mut dropped = usize::from(self.pending.take().is_some());
        dropped += self.shared.buffer.discard();
        if dropped > 0 {
            self.shared.stats.record_dropped(dropped);
            warn!("femtoship: dropped {dropped} undelivered records at shutdown");
        }
        self.connector.disconnect();
        self.shared.state.set(ConnectionState::Stopped);
        debug!("femtoship: pump for {} stopped", self.connector.endpoint());
    }
}

/// Write a whole record before a deadline of `write_timeout` from now.
///
/// Short writes are continued until the record is complete; the socket
/// timeout is reset to the remaining time before every call.
pub(crate) fn send_record<C: Connection + ?Sized>(
    conn: &mut C,
    record: &[u8],
    write_timeout: Duration,
) -> io::Result<()> {
    let deadline = Instant::now() + write_timeout;
    let mut written = 0;
    while written < record.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("write deadline exceeded after {written} of {} bytes", record.len()),
            ));
        }
        conn.set_write_timeout(Some(remaining))?;
        match conn.write(&record[written..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "connection accepted zero bytes",
                ));
            }
            Ok(n) => written += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    conn.flush()
}
