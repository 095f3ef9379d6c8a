//! Public client type exported by the crate.

use std::{io, sync::Arc, thread, time::Duration};

use crossbeam_channel::Receiver;
use log::warn;
use parking_lot::Mutex;

use crate::{
    buffer::RecordBuffer,
    credentials::CredentialProvider,
    error::{BuildError, WriteError},
    rate_limited_warner::RateLimitedWarner,
};

use super::{
    config::{PeerVerification, ShipperConfig},
    connector::Connector,
    pump::{PumpShared, spawn_pump},
    state::{ConnectionState, DeliveryStats, SharedState, ShutdownSignal, StatsSnapshot},
    transport::{Dial, Security, TcpDialer, TlsSettings},
};

/// Log shipping client delivering delimiter-framed records over mutual TLS.
///
/// [`write`](Self::write) only touches the in-memory buffer; a background
/// pump thread owns the connection, reconnects after failures, and drains
/// the buffer in FIFO order. Delivery outcomes are not reported back to
/// writers: once a record is accepted it either reaches the transport or is
/// dropped at shutdown.
pub struct FemtoShipper {
    buffer: Arc<RecordBuffer>,
    shutdown: Arc<ShutdownSignal>,
    state: Arc<SharedState>,
    stats: Arc<DeliveryStats>,
    worker: Mutex<Option<(thread::JoinHandle<()>, Receiver<()>)>>,
    warner: RateLimitedWarner,
    close_timeout: Duration,
    endpoint: String,
}

impl FemtoShipper {
    /// Validate `config`, load credentials, and start the pump.
    ///
    /// Trusted CAs combined with [`PeerVerification::Insecure`] are rejected
    /// as contradictory.
    ///
    /// Returns as soon as the pump thread is running; the first connection is
    /// made in the background.
    pub fn new(
        config: ShipperConfig,
        credentials: &dyn CredentialProvider,
    ) -> Result<Self, BuildError> {
        config.validate()?;
        let credentials = credentials.load()?;
        if config.verification == PeerVerification::Insecure
            && credentials.trusted_roots_pem.is_some()
        {
            return Err(BuildError::InvalidConfig(
                "trusted CAs cannot be combined with insecure peer verification".into(),
            ));
        }
        let material = credentials.into_tls_material()?;
        let tls = TlsSettings::new(material, config.verification, config.server_name())?;
        let dialer = TcpDialer::new(&config, Security::Tls(Box::new(tls)));
        Ok(Self::spawn(config, dialer)?)
    }

    /// Start a shipper that speaks plaintext TCP. Test transport only.
    #[cfg(any(test, feature = "test-util"))]
    pub fn plaintext_for_tests(config: ShipperConfig) -> Result<Self, BuildError> {
        config.validate()?;
        let dialer = TcpDialer::new(&config, Security::Plaintext);
        Ok(Self::spawn(config, dialer)?)
    }

    pub(crate) fn spawn<D: Dial>(config: ShipperConfig, dialer: D) -> io::Result<Self> {
        let buffer = Arc::new(RecordBuffer::new(config.buffer_capacity, config.delimiter));
        let shutdown = Arc::new(ShutdownSignal::default());
        let state = Arc::new(SharedState::new());
        let stats = Arc::new(DeliveryStats::default());
        let connector = Connector::new(
            dialer,
            config.connect_timeout,
            config.backoff.clone(),
            config.warn_interval,
            Arc::clone(&state),
            Arc::clone(&stats),
        );
        let shared = PumpShared {
            buffer: Arc::clone(&buffer),
            shutdown: Arc::clone(&shutdown),
            state: Arc::clone(&state),
            stats: Arc::clone(&stats),
        };
        let worker = spawn_pump(connector, shared, config.write_timeout)?;
        Ok(Self {
            buffer,
            shutdown,
            state,
            stats,
            worker: Mutex::new(Some(worker)),
            warner: RateLimitedWarner::new(config.warn_interval),
            close_timeout: config.close_timeout,
            endpoint: config.endpoint(),
        })
    }

    /// Queue `payload` as one record.
    ///
    /// Returns `payload.len() + 1` (the delimiter included) once the record
    /// is buffered; this does not mean it reached the collector. A record
    /// that does not fit in the remaining capacity is rejected whole with
    /// [`WriteError::BufferFull`].
    pub fn write(&self, payload: &[u8]) -> Result<usize, WriteError> {
        let result = self.buffer.append(payload);
        if let Err(err) = &result {
            self.warner.record_drop();
            self.warner.warn_if_due(|count| match err {
                WriteError::BufferFull { .. } => {
                    warn!("femtoship: buffer full; rejected {count} records");
                }
                WriteError::Closed => {
                    warn!("femtoship: closed; rejected {count} records");
                }
            });
        }
        result
    }

    /// Wait until every buffered record has been handed to the transport.
    ///
    /// Returns `false` when `timeout` elapses first.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.buffer.wait_settled(timeout)
    }

    /// Stop accepting records, deliver what is buffered, and stop the pump.
    ///
    /// The pump gets `close_timeout` to hand off the remaining records; after
    /// that the shutdown signal interrupts reconnect attempts and whatever
    /// is still buffered is dropped. With nothing buffered the pump is
    /// stopped at once, even while the collector is unreachable.
    ///
    /// Returns `true` when nothing was dropped. Subsequent calls return `false`.
    pub fn close(&self) -> bool {
        let Some((handle, done_rx)) = self.worker.lock().take() else {
            return false;
        };
        self.buffer.close();
        // Nothing buffered or in flight: the pump may be parked in a reconnect
        // wait, so stop it now instead of waiting for a drain that cannot come.
        let drained = self.buffer.wait_settled(Duration::ZERO)
            || done_rx.recv_timeout(self.close_timeout).is_ok();
        if !drained {
            warn!(
                "femtoship: {} not drained within {:?}; forcing shutdown",
                self.endpoint, self.close_timeout
            );
        }
        self.shutdown.trigger();
        if handle.join().is_err() {
            warn!("femtoship: pump thread panicked");
        }
        self.warner.flush(|count| {
            warn!("femtoship: rejected {count} records in the last interval");
        });
        drained && self.stats.snapshot().dropped_on_shutdown == 0
    }

    /// Bytes currently waiting in the buffer.
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Configured buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Delimiter appended to each record.
    pub fn delimiter(&self) -> u8 {
        self.buffer.delimiter()
    }

    /// Current pump state.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Snapshot of the delivery counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Each `write` call is one record. The reported count is `buf.len()`; the
/// delimiter is not counted because `io::Write` forbids reporting more bytes
/// than were supplied.
impl io::Write for FemtoShipper {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        FemtoShipper::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if FemtoShipper::flush(self, self.close_timeout) {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "buffered records were not delivered in time",
            ))
        }
    }
}

impl Drop for FemtoShipper {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for FemtoShipper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FemtoShipper")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("buffered_bytes", &self.buffered_bytes())
            .field("capacity", &self.capacity())
            .finish()
    }
}
