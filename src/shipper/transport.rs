//! Transport primitives for the shipper.
//!
//! [`Dial`] and [`Connection`] are the seams between the pump and the
//! network. The production implementation is [`TcpDialer`] speaking TLS with
//! a client identity; the `test-util` feature adds a plaintext mode.

use std::{
    io::{self, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use native_tls::{TlsConnector, TlsStream};

use crate::{credentials::TlsMaterial, error::BuildError};

use super::config::{PeerVerification, ShipperConfig};

/// A single established transport handle.
pub(crate) trait Connection: Send {
    /// Bound the next write call. `None` removes the bound.
    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
    /// Write some prefix of `buf`, returning how many bytes were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn flush(&mut self) -> io::Result<()>;
    /// Close the handle; errors are irrelevant because it is being discarded.
    fn shutdown(&mut self);
}

/// Factory for fresh connections to the collector.
pub(crate) trait Dial: Send + 'static {
    type Conn: Connection;

    /// Attempt one connection, bounded by `timeout`.
    fn dial(&mut self, timeout: Duration) -> io::Result<Self::Conn>;

    /// Human readable target used in log messages.
    fn endpoint(&self) -> String;
}

/// TLS settings applied to each handshake.
#[derive(Clone)]
pub(crate) struct TlsSettings {
    connector: TlsConnector,
    domain: String,
}

impl TlsSettings {
    /// Assemble a connector from parsed client material.
    ///
    /// Supplying trusted roots disables the platform's built-in roots so only
    /// the bundle is trusted.
    pub(crate) fn new(
        material: TlsMaterial,
        verification: PeerVerification,
        domain: impl Into<String>,
    ) -> Result<Self, BuildError> {
        let mut builder = TlsConnector::builder();
        builder.identity(material.identity);
        if !material.roots.is_empty() {
            builder.disable_built_in_roots(true);
        }
        for root in material.roots {
            builder.add_root_certificate(root);
        }
        match verification {
            PeerVerification::Verify => {}
            PeerVerification::SkipHostname => {
                builder.danger_accept_invalid_hostnames(true);
            }
            PeerVerification::Insecure => {
                log::warn!("femtoship: peer certificate verification is disabled");
                builder.danger_accept_invalid_certs(true);
                builder.danger_accept_invalid_hostnames(true);
            }
        }
        let connector = builder.build().map_err(BuildError::Tls)?;
        Ok(Self {
            connector,
            domain: domain.into(),
        })
    }

    #[cfg(test)]
    pub(crate) fn from_connector(connector: TlsConnector, domain: impl Into<String>) -> Self {
        Self {
            connector,
            domain: domain.into(),
        }
    }
}

/// Channel security used by [`TcpDialer`].
#[derive(Clone)]
pub(crate) enum Security {
    Tls(Box<TlsSettings>),
    #[cfg(any(test, feature = "test-util"))]
    Plaintext,
}

/// Active socket connection state.
pub(crate) enum ActiveConnection {
    Tls(Box<TlsStream<TcpStream>>),
    #[cfg(any(test, feature = "test-util"))]
    PlainTcp(TcpStream),
}

impl ActiveConnection {
    fn tcp(&self) -> &TcpStream {
        match self {
            ActiveConnection::Tls(stream) => stream.get_ref(),
            #[cfg(any(test, feature = "test-util"))]
            ActiveConnection::PlainTcp(stream) => stream,
        }
    }
}

impl Connection for ActiveConnection {
    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.tcp().set_write_timeout(timeout)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ActiveConnection::Tls(stream) => stream.write(buf),
            #[cfg(any(test, feature = "test-util"))]
            ActiveConnection::PlainTcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ActiveConnection::Tls(stream) => stream.flush(),
            #[cfg(any(test, feature = "test-util"))]
            ActiveConnection::PlainTcp(stream) => stream.flush(),
        }
    }

    fn shutdown(&mut self) {
        let _ = match self {
            ActiveConnection::Tls(stream) => stream.shutdown(),
            #[cfg(any(test, feature = "test-util"))]
            ActiveConnection::PlainTcp(stream) => stream.shutdown(std::net::Shutdown::Both),
        };
    }
}

/// Dials `host:port` over TCP and applies the configured security.
#[derive(Clone)]
pub(crate) struct TcpDialer {
    host: String,
    port: u16,
    security: Security,
}

impl TcpDialer {
    pub(crate) fn new(config: &ShipperConfig, security: Security) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            security,
        }
    }

    fn socket_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map(|iter| iter.collect())
    }

    fn connect_tcp(&self, timeout: Duration) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in self.socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses resolved for {}", self.endpoint()),
            )
        }))
    }
}

impl Dial for TcpDialer {
    type Conn = ActiveConnection;

    fn dial(&mut self, timeout: Duration) -> io::Result<ActiveConnection> {
        let stream = self.connect_tcp(timeout)?;
        match &self.security {
            Security::Tls(tls) => {
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                let stream = tls
                    .connector
                    .connect(&tls.domain, stream)
                    .map_err(io::Error::other)?;
                let tcp_ref = stream.get_ref();
                tcp_ref.set_read_timeout(None)?;
                tcp_ref.set_write_timeout(None)?;
                Ok(ActiveConnection::Tls(Box::new(stream)))
            }
            #[cfg(any(test, feature = "test-util"))]
            Security::Plaintext => Ok(ActiveConnection::PlainTcp(stream)),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::{
        io::Read,
        net::TcpListener,
        sync::mpsc,
        thread,
        time::Instant,
    };

    #[fixture]
    fn tcp_listener() -> TcpListener {
        TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener")
    }

    fn dialer_for(listener: &TcpListener, security: Security) -> TcpDialer {
        let addr = listener.local_addr().expect("listener has address");
        let config = ShipperConfig::default().with_endpoint(addr.ip().to_string(), addr.port());
        TcpDialer::new(&config, security)
    }

    #[rstest]
    fn plaintext_dial_writes_bytes(tcp_listener: TcpListener) {
        let mut dialer = dialer_for(&tcp_listener, Security::Plaintext);
        let server = thread::spawn(move || {
            let (mut stream, _) = tcp_listener.accept().expect("accept connection");
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).expect("read bytes");
            buf
        });
        let mut conn = dialer.dial(Duration::from_secs(1)).expect("dial");
        conn.set_write_timeout(Some(Duration::from_secs(1)))
            .expect("set timeout");
        assert_eq!(conn.write(b"hello").expect("write"), 5);
        conn.flush().expect("flush");
        assert_eq!(&server.join().expect("join server"), b"hello");
        conn.shutdown();
    }

    #[rstest]
    fn dial_fails_when_nothing_listens(tcp_listener: TcpListener) {
        let mut dialer = dialer_for(&tcp_listener, Security::Plaintext);
        drop(tcp_listener);
        assert!(dialer.dial(Duration::from_millis(250)).is_err());
    }

    #[rstest]
    fn tls_handshake_respects_timeout(tcp_listener: TcpListener) {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .expect("build connector");
        let security = Security::Tls(Box::new(TlsSettings::from_connector(
            connector,
            "localhost",
        )));
        let mut dialer = dialer_for(&tcp_listener, security);
        let (accepted_tx, accepted_rx) = mpsc::channel();
        thread::spawn(move || {
            let (stream, _) = tcp_listener.accept().expect("accept connection");
            accepted_tx.send(()).expect("signal accepted");
            // Hold the socket open without speaking TLS.
            thread::sleep(Duration::from_secs(2));
            drop(stream);
        });

        let (result_tx, result_rx) = mpsc::channel();
        thread::spawn(move || {
            let start = Instant::now();
            let ok = dialer.dial(Duration::from_millis(250)).is_ok();
            result_tx
                .send((ok, start.elapsed()))
                .expect("handshake result should send");
        });

        accepted_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("connection must be accepted");
        let (ok, elapsed) = result_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("handshake result should arrive");
        assert!(!ok, "handshake should fail for stalled peer");
        assert!(
            elapsed < Duration::from_secs(2),
            "handshake should respect timeout, elapsed {elapsed:?}"
        );
    }

    #[rstest]
    fn endpoint_renders_host_and_port() {
        let config = ShipperConfig::default().with_endpoint("collector", 6514);
        let dialer = TcpDialer::new(&config, Security::Plaintext);
        assert_eq!(dialer.endpoint(), "collector:6514");
    }
}
