//! Builder for [`FemtoShipper`](crate::FemtoShipper).
//!
//! Exposes endpoint selection, framing, timeout tuning, peer verification,
//! and exponential backoff parameters. Every value is validated before the
//! pump thread is started.

use std::time::Duration;

use crate::{
    credentials::CredentialProvider,
    error::BuildError,
    shipper::{BackoffPolicy, FemtoShipper, PeerVerification, ShipperConfig},
};

/// Overrides for the reconnect backoff timings applied by the shipper.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackoffOverrides {
    base_ms: Option<u64>,
    cap_ms: Option<u64>,
    reset_after_ms: Option<u64>,
    jitter: Option<bool>,
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(BuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

impl BackoffOverrides {
    /// Create overrides with no custom values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the base delay in milliseconds.
    pub fn with_base_ms(mut self, base_ms: u64) -> Self {
        self.base_ms = Some(base_ms);
        self
    }

    /// Override the cap in milliseconds.
    pub fn with_cap_ms(mut self, cap_ms: u64) -> Self {
        self.cap_ms = Some(cap_ms);
        self
    }

    /// Override the healthy period that resets the backoff, in milliseconds.
    pub fn with_reset_after_ms(mut self, reset_after_ms: u64) -> Self {
        self.reset_after_ms = Some(reset_after_ms);
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = Some(jitter);
        self
    }

    fn apply(&self, policy: &mut BackoffPolicy) -> Result<(), BuildError> {
        if let Some(base) = self.base_ms {
            ensure_positive!(base, "backoff_base_ms")?;
            policy.base = Duration::from_millis(base);
        }
        if let Some(cap) = self.cap_ms {
            ensure_positive!(cap, "backoff_cap_ms")?;
            policy.cap = Duration::from_millis(cap);
        }
        if let Some(reset) = self.reset_after_ms {
            ensure_positive!(reset, "backoff_reset_after_ms")?;
            policy.reset_after = Duration::from_millis(reset);
        }
        if let Some(jitter) = self.jitter {
            policy.jitter = jitter;
        }
        Ok(())
    }
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Builder for constructing [`FemtoShipper`] instances.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShipperBuilder {
    endpoint: Option<(String, u16)>,
    server_name: Option<String>,
    delimiter: Option<u8>,
    buffer_capacity: Option<usize>,
    connect_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    close_timeout_ms: Option<u64>,
    warn_interval_ms: Option<u64>,
    verification: Option<PeerVerification>,
    backoff: BackoffOverrides,
}

impl ShipperBuilder {
    /// Create a new builder with no endpoint configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target the collector at `host:port`.
    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.endpoint = Some((host.into(), port));
        self
    }

    /// Name presented for SNI and hostname verification.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    option_setter!(
        #[doc = "Set the byte appended after every record."]
        with_delimiter,
        delimiter,
        u8
    );
    option_setter!(
        #[doc = "Set the buffer capacity in bytes."]
        with_buffer_capacity,
        buffer_capacity,
        usize
    );
    option_setter!(with_connect_timeout_ms, connect_timeout_ms, u64);
    option_setter!(with_write_timeout_ms, write_timeout_ms, u64);
    option_setter!(with_close_timeout_ms, close_timeout_ms, u64);
    option_setter!(with_warn_interval_ms, warn_interval_ms, u64);
    option_setter!(
        #[doc = "Choose how the server certificate is verified."]
        with_verification,
        verification,
        PeerVerification
    );

    /// Override backoff timings using the provided overrides.
    pub fn with_backoff(mut self, overrides: BackoffOverrides) -> Self {
        self.backoff = overrides;
        self
    }

    fn validate(&self) -> Result<(), BuildError> {
        self.validate_endpoint()?;
        self.validate_capacity()?;
        self.validate_timeouts()?;
        Ok(())
    }

    fn validate_endpoint(&self) -> Result<(), BuildError> {
        match &self.endpoint {
            None => Err(BuildError::InvalidConfig(
                "shipper requires an endpoint".into(),
            )),
            Some((host, _)) if host.trim().is_empty() => Err(BuildError::InvalidConfig(
                "host must not be empty".into(),
            )),
            Some((_, port)) => ensure_positive!(*port, "port").map(drop),
        }
    }

    fn validate_capacity(&self) -> Result<(), BuildError> {
        if let Some(capacity) = self.buffer_capacity {
            ensure_positive!(capacity, "buffer_capacity")?;
        }
        Ok(())
    }

    fn validate_timeouts(&self) -> Result<(), BuildError> {
        if let Some(timeout) = self.connect_timeout_ms {
            ensure_positive!(timeout, "connect_timeout_ms")?;
        }
        if let Some(timeout) = self.write_timeout_ms {
            ensure_positive!(timeout, "write_timeout_ms")?;
        }
        if let Some(timeout) = self.close_timeout_ms {
            ensure_positive!(timeout, "close_timeout_ms")?;
        }
        Ok(())
    }

    /// Produce the validated runtime configuration.
    pub fn build_config(&self) -> Result<ShipperConfig, BuildError> {
        self.validate()?;
        let mut config = ShipperConfig::default();
        if let Some((host, port)) = &self.endpoint {
            config.host = host.clone();
            config.port = *port;
        }
        self.apply_optional_fields(&mut config);
        self.backoff.apply(&mut config.backoff)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_optional_fields(&self, config: &mut ShipperConfig) {
        config.server_name = self.server_name.clone();
        if let Some(delimiter) = self.delimiter {
            config.delimiter = delimiter;
        }
        if let Some(capacity) = self.buffer_capacity {
            config.buffer_capacity = capacity;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(timeout);
        }
        if let Some(timeout) = self.write_timeout_ms {
            config.write_timeout = Duration::from_millis(timeout);
        }
        if let Some(timeout) = self.close_timeout_ms {
            config.close_timeout = Duration::from_millis(timeout);
        }
        if let Some(interval) = self.warn_interval_ms {
            config.warn_interval = Duration::from_millis(interval);
        }
        if let Some(verification) = self.verification {
            config.verification = verification;
        }
    }

    /// Build a shipper authenticating with `credentials`.
    pub fn build(&self, credentials: &dyn CredentialProvider) -> Result<FemtoShipper, BuildError> {
        FemtoShipper::new(self.build_config()?, credentials)
    }

    /// Build a shipper speaking plaintext TCP. Test transport only.
    #[cfg(any(test, feature = "test-util"))]
    pub fn build_plaintext_for_tests(&self) -> Result<FemtoShipper, BuildError> {
        FemtoShipper::plaintext_for_tests(self.build_config()?)
    }
}
