//! Configuration structures consumed by the shipper lifecycle.
//!
//! [`ShipperBuilder`](crate::ShipperBuilder) constructs these values before
//! passing them to [`FemtoShipper`](super::FemtoShipper) for runtime use.

use std::time::Duration;

use crate::{
    buffer::DEFAULT_BUFFER_CAPACITY, error::BuildError, rate_limited_warner::DEFAULT_WARN_INTERVAL,
};

/// Default delimiter appended to every record.
pub const DEFAULT_DELIMITER: u8 = b'\n';
/// Default connection timeout applied to each connect and handshake attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default deadline for writing a single record.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
/// Default time `close` waits for buffered records to be handed off.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default base delay for exponential backoff retries.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(100);
/// Default maximum delay for exponential backoff retries.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(10);
/// Default duration of healthy writes that resets backoff state.
pub const DEFAULT_BACKOFF_RESET: Duration = Duration::from_secs(30);

/// How the server certificate presented during the handshake is checked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PeerVerification {
    /// Verify the certificate chain and the hostname.
    #[default]
    Verify,
    /// Verify the certificate chain but accept a hostname mismatch.
    SkipHostname,
    /// Accept any server certificate. Intended for tests only.
    Insecure,
}

impl PeerVerification {
    /// Parse the textual form used in settings files.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "verify" | "full" => Some(Self::Verify),
            "skip_hostname" | "skip-hostname" => Some(Self::SkipHostname),
            "insecure" | "none" => Some(Self::Insecure),
            _ => None,
        }
    }
}

/// Exponential backoff policy for reconnection attempts.
///
/// Retries never give up; the policy only shapes the pauses between them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub reset_after: Duration,
    /// Pick a random delay up to the current ceiling instead of the ceiling itself.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            cap: DEFAULT_BACKOFF_CAP,
            reset_after: DEFAULT_BACKOFF_RESET,
            jitter: true,
        }
    }
}

/// Runtime configuration for a [`FemtoShipper`](super::FemtoShipper).
#[derive(Clone, Debug)]
pub struct ShipperConfig {
    pub host: String,
    pub port: u16,
    /// Name presented for SNI and hostname verification; defaults to `host`.
    pub server_name: Option<String>,
    pub delimiter: u8,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub buffer_capacity: usize,
    pub verification: PeerVerification,
    pub backoff: BackoffPolicy,
    pub warn_interval: Duration,
    pub close_timeout: Duration,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 9020,
            server_name: None,
            delimiter: DEFAULT_DELIMITER,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            verification: PeerVerification::default(),
            backoff: BackoffPolicy::default(),
            warn_interval: DEFAULT_WARN_INTERVAL,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl ShipperConfig {
    /// Target the given collector endpoint.
    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Name used for SNI and certificate hostname checks.
    pub fn server_name(&self) -> &str {
        self.server_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.host)
    }

    /// `host:port` rendering used in log messages.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject values the runtime cannot operate with.
    pub fn validate(&self) -> Result<(), BuildError> {
        let invalid = |msg: &str| Err(BuildError::InvalidConfig(msg.into()));
        if self.host.trim().is_empty() {
            return invalid("host must not be empty");
        }
        if self.port == 0 {
            return invalid("port must be greater than zero");
        }
        if self.buffer_capacity == 0 {
            return invalid("buffer_capacity must be greater than zero");
        }
        if self.connect_timeout.is_zero() {
            return invalid("connect_timeout must be greater than zero");
        }
        if self.write_timeout.is_zero() {
            return invalid("write_timeout must be greater than zero");
        }
        if self.backoff.base.is_zero() || self.backoff.cap.is_zero() {
            return invalid("backoff delays must be greater than zero");
        }
        if self.backoff.cap < self.backoff.base {
            return invalid("backoff cap must not be smaller than backoff base");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults_are_valid() {
        let config = ShipperConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.buffer_capacity, 4 * 1024 * 1024);
        assert_eq!(config.delimiter, b'\n');
        assert_eq!(config.verification, PeerVerification::Verify);
    }

    #[rstest]
    fn server_name_defaults_to_host() {
        let mut config = ShipperConfig::default().with_endpoint("logs.internal", 6514);
        assert_eq!(config.server_name(), "logs.internal");
        config.server_name = Some("collector.example".into());
        assert_eq!(config.server_name(), "collector.example");
        config.server_name = Some("  ".into());
        assert_eq!(config.server_name(), "logs.internal");
        assert_eq!(config.endpoint(), "logs.internal:6514");
    }

    #[rstest]
    #[case::empty_host(ShipperConfig { host: " ".into(), ..ShipperConfig::default() }, "host")]
    #[case::zero_port(ShipperConfig { port: 0, ..ShipperConfig::default() }, "port")]
    #[case::zero_capacity(ShipperConfig { buffer_capacity: 0, ..ShipperConfig::default() }, "buffer_capacity")]
    #[case::zero_write(ShipperConfig { write_timeout: Duration::ZERO, ..ShipperConfig::default() }, "write_timeout")]
    #[case::inverted_backoff(
        ShipperConfig {
            backoff: BackoffPolicy { cap: Duration::from_millis(1), ..BackoffPolicy::default() },
            ..ShipperConfig::default()
        },
        "cap"
    )]
    fn validate_rejects(#[case] config: ShipperConfig, #[case] needle: &str) {
        let err = config.validate().expect_err("config must be rejected");
        assert!(matches!(err, BuildError::InvalidConfig(msg) if msg.contains(needle)));
    }

    #[rstest]
    #[case("verify", Some(PeerVerification::Verify))]
    #[case("Skip-Hostname", Some(PeerVerification::SkipHostname))]
    #[case(" insecure ", Some(PeerVerification::Insecure))]
    #[case("maybe", None)]
    fn parses_verification(#[case] raw: &str, #[case] expected: Option<PeerVerification>) {
        assert_eq!(PeerVerification::parse(raw), expected);
    }
}
