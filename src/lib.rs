//! Resilient log shipping over mutual TLS.
//!
//! [`FemtoShipper`] accepts delimiter-framed records from any number of
//! threads, holds them in a bounded [`RecordBuffer`], and forwards them to a
//! remote collector from a background pump thread that reconnects with
//! exponential backoff whenever the connection drops.
//!
//! ```no_run
//! use femtoship::{PemFiles, ShipperBuilder};
//!
//! let shipper = ShipperBuilder::new()
//!     .with_endpoint("logs.internal", 6514)
//!     .build(&PemFiles::new("client.pem", "client.key").with_trusted_cas("ca.pem"))?;
//! shipper.write(b"service started")?;
//! shipper.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod buffer;
mod builder;
mod credentials;
mod error;
mod file_config;
mod rate_limited_warner;
mod shipper;

pub use buffer::{DEFAULT_BUFFER_CAPACITY, RecordBuffer};
pub use builder::{BackoffOverrides, ShipperBuilder};
pub use credentials::{ClientCredentials, CredentialProvider, PemFiles};
pub use error::{BuildError, CredentialError, WriteError};
pub use file_config::{DEFAULT_INI_SECTION, SettingsError, ShipperSettings};
pub use rate_limited_warner::DEFAULT_WARN_INTERVAL;
pub use shipper::{
    BackoffPolicy, ConnectionState, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP,
    DEFAULT_BACKOFF_RESET, DEFAULT_CLOSE_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DELIMITER,
    DEFAULT_WRITE_TIMEOUT, FemtoShipper, PeerVerification, ShipperConfig, StatsSnapshot,
};
