//! Settings files for the shipper.
//!
//! Deployments describe the collector endpoint, credential paths, and tuning
//! knobs in either an INI section (parsed with `rust-ini`) or a JSON object.
//! Both formats produce the same [`ShipperSettings`], which converts into a
//! [`ShipperBuilder`] and a [`PemFiles`] credential provider.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use ini::{Ini, ParseOption};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    builder::{BackoffOverrides, ShipperBuilder},
    credentials::PemFiles,
    error::CredentialError,
    shipper::PeerVerification,
};

/// Section read from INI files when no other name is given.
pub const DEFAULT_INI_SECTION: &str = "femtoship";

/// Failures reading or interpreting a settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{} doesn't exist", path.display())]
    NotFound { path: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid INI/JSON or is missing the expected section.
    #[error("invalid settings: {0}")]
    Parse(String),
    /// A recognised key carries a value that cannot be used.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
    /// The file extension is neither `.ini` nor `.json`.
    #[error("unsupported settings format for {}", path.display())]
    UnknownFormat { path: PathBuf },
}

/// Shipper settings as written in a configuration file.
///
/// Every field is optional; unset fields keep the builder defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShipperSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub server_name: Option<String>,
    pub client_certificate: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub trusted_cas: Option<PathBuf>,
    pub delimiter: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    /// Buffer size; `0` selects the default capacity.
    pub buffer_capacity_bytes: Option<usize>,
    pub verification: Option<String>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_cap_ms: Option<u64>,
    pub backoff_reset_after_ms: Option<u64>,
    pub backoff_jitter: Option<bool>,
    pub warn_interval_ms: Option<u64>,
    pub close_timeout_ms: Option<u64>,
}

impl ShipperSettings {
    /// Load settings from `path`, choosing the parser from its extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("ini" | "cfg" | "conf") => {
                Self::from_ini_str(&read_settings_file(path)?, DEFAULT_INI_SECTION)
            }
            Some("json") => Self::from_json_str(&read_settings_file(path)?),
            _ => Err(SettingsError::UnknownFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Parse the named section of an INI document.
    ///
    /// Values are taken literally: backslashes reach the setting untouched,
    /// so `delimiter = \n` and Windows paths work as written.
    pub fn from_ini_str(text: &str, section: &str) -> Result<Self, SettingsError> {
        let options = ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(text, options)
            .map_err(|err| SettingsError::Parse(err.to_string()))?;
        let props = ini
            .section(Some(section))
            .ok_or_else(|| SettingsError::Parse(format!("missing [{section}] section")))?;
        let mut settings = Self::default();
        for (key, value) in props.iter() {
            settings.set_ini_value(key, value.trim())?;
        }
        Ok(settings)
    }

    /// Parse a JSON object.
    pub fn from_json_str(text: &str) -> Result<Self, SettingsError> {
        serde_json::from_str(text).map_err(|err| SettingsError::Parse(err.to_string()))
    }

    fn set_ini_value(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        match key {
            "host" => self.host = Some(value.to_owned()),
            "port" => self.port = Some(parse_value("port", value)?),
            "server_name" => self.server_name = Some(value.to_owned()),
            "client_certificate" => self.client_certificate = Some(value.into()),
            "client_key" => self.client_key = Some(value.into()),
            "trusted_cas" => self.trusted_cas = Some(value.into()),
            "delimiter" => self.delimiter = Some(value.to_owned()),
            "connect_timeout_ms" => {
                self.connect_timeout_ms = Some(parse_value("connect_timeout_ms", value)?);
            }
            "write_timeout_ms" => {
                self.write_timeout_ms = Some(parse_value("write_timeout_ms", value)?);
            }
            "buffer_capacity_bytes" => {
                self.buffer_capacity_bytes = Some(parse_value("buffer_capacity_bytes", value)?);
            }
            "verification" => self.verification = Some(value.to_owned()),
            "backoff_base_ms" => {
                self.backoff_base_ms = Some(parse_value("backoff_base_ms", value)?);
            }
            "backoff_cap_ms" => self.backoff_cap_ms = Some(parse_value("backoff_cap_ms", value)?),
            "backoff_reset_after_ms" => {
                self.backoff_reset_after_ms = Some(parse_value("backoff_reset_after_ms", value)?);
            }
            "backoff_jitter" => self.backoff_jitter = Some(parse_flag("backoff_jitter", value)?),
            "warn_interval_ms" => {
                self.warn_interval_ms = Some(parse_value("warn_interval_ms", value)?);
            }
            "close_timeout_ms" => {
                self.close_timeout_ms = Some(parse_value("close_timeout_ms", value)?);
            }
            other => return Err(SettingsError::Parse(format!("unknown key {other}"))),
        }
        Ok(())
    }

    /// Translate the settings into a builder.
    pub fn to_builder(&self) -> Result<ShipperBuilder, SettingsError> {
        let mut builder = ShipperBuilder::new();
        if let Some(host) = &self.host {
            builder = builder.with_endpoint(host.clone(), self.port.unwrap_or(0));
        }
        if let Some(name) = &self.server_name {
            builder = builder.with_server_name(name.clone());
        }
        if let Some(raw) = &self.delimiter {
            builder = builder.with_delimiter(parse_delimiter(raw)?);
        }
        if let Some(raw) = &self.verification {
            let verification =
                PeerVerification::parse(raw).ok_or_else(|| SettingsError::InvalidValue {
                    key: "verification",
                    value: raw.clone(),
                })?;
            builder = builder.with_verification(verification);
        }
        if let Some(capacity) = self.buffer_capacity_bytes.filter(|&capacity| capacity != 0) {
            builder = builder.with_buffer_capacity(capacity);
        }
        if let Some(ms) = self.connect_timeout_ms {
            builder = builder.with_connect_timeout_ms(ms);
        }
        if let Some(ms) = self.write_timeout_ms {
            builder = builder.with_write_timeout_ms(ms);
        }
        if let Some(ms) = self.warn_interval_ms {
            builder = builder.with_warn_interval_ms(ms);
        }
        if let Some(ms) = self.close_timeout_ms {
            builder = builder.with_close_timeout_ms(ms);
        }
        Ok(builder.with_backoff(self.backoff_overrides()))
    }

    fn backoff_overrides(&self) -> BackoffOverrides {
        let mut overrides = BackoffOverrides::new();
        if let Some(ms) = self.backoff_base_ms {
            overrides = overrides.with_base_ms(ms);
        }
        if let Some(ms) = self.backoff_cap_ms {
            overrides = overrides.with_cap_ms(ms);
        }
        if let Some(ms) = self.backoff_reset_after_ms {
            overrides = overrides.with_reset_after_ms(ms);
        }
        if let Some(jitter) = self.backoff_jitter {
            overrides = overrides.with_jitter(jitter);
        }
        overrides
    }

    /// Credential provider reading the configured PEM files.
    pub fn credentials(&self) -> Result<PemFiles, CredentialError> {
        let certificate = self
            .client_certificate
            .clone()
            .ok_or(CredentialError::Missing("client_certificate setting"))?;
        let key = self
            .client_key
            .clone()
            .ok_or(CredentialError::Missing("client_key setting"))?;
        let files = PemFiles::new(certificate, key);
        Ok(match &self.trusted_cas {
            Some(path) => files.with_trusted_cas(path.clone()),
            None => files,
        })
    }
}

fn read_settings_file(path: &Path) -> Result<String, SettingsError> {
    fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => SettingsError::NotFound {
            path: path.to_path_buf(),
        },
        _ => SettingsError::Read {
            path: path.to_path_buf(),
            source,
        },
    })
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, SettingsError> {
    value.parse().map_err(|_| SettingsError::InvalidValue {
        key,
        value: value.to_owned(),
    })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, SettingsError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::InvalidValue {
            key,
            value: value.to_owned(),
        }),
    }
}

/// Parse a delimiter written as a single ASCII character, an escape such as
/// `\n`, or a hex byte such as `0x1e`.
fn parse_delimiter(raw: &str) -> Result<u8, SettingsError> {
    let invalid = || SettingsError::InvalidValue {
        key: "delimiter",
        value: raw.to_owned(),
    };
    match raw {
        "\\n" => return Ok(b'\n'),
        "\\r" => return Ok(b'\r'),
        "\\t" => return Ok(b'\t'),
        "\\0" => return Ok(0),
        _ => {}
    }
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        return u8::from_str_radix(hex, 16).map_err(|_| invalid());
    }
    match raw.as_bytes() {
        [byte] if byte.is_ascii() => Ok(*byte),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;
    use rstest::rstest;
    use std::{io::Write, time::Duration};
    use tempfile::Builder;

    const INI: &str = r#"
[femtoship]
host = logs.internal
port = 6514
server_name = collector.internal
client_certificate = /etc/femtoship/client.pem
client_key = /etc/femtoship/client.key
trusted_cas = /etc/femtoship/ca.pem
delimiter = 0x1e
connect_timeout_ms = 250
buffer_capacity_bytes = 65536
verification = skip_hostname
backoff_base_ms = 50
backoff_cap_ms = 500
backoff_jitter = off
close_timeout_ms = 1500
"#;

    const JSON: &str = r#"{
        "host": "logs.internal",
        "port": 6514,
        "server_name": "collector.internal",
        "client_certificate": "/etc/femtoship/client.pem",
        "client_key": "/etc/femtoship/client.key",
        "trusted_cas": "/etc/femtoship/ca.pem",
        "delimiter": "0x1e",
        "connect_timeout_ms": 250,
        "buffer_capacity_bytes": 65536,
        "verification": "skip_hostname",
        "backoff_base_ms": 50,
        "backoff_cap_ms": 500,
        "backoff_jitter": false,
        "close_timeout_ms": 1500
    }"#;

    fn settings_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("create settings file");
        file.write_all(contents.as_bytes())
            .expect("write settings file");
        file
    }

    #[rstest]
    fn ini_and_json_produce_identical_settings() {
        let ini = ShipperSettings::from_ini_str(INI, DEFAULT_INI_SECTION).expect("parse ini");
        let json = ShipperSettings::from_json_str(JSON).expect("parse json");
        assert_eq!(ini, json);
        assert_eq!(
            ini.to_builder().expect("ini builder"),
            json.to_builder().expect("json builder")
        );
    }

    #[rstest]
    fn settings_flow_into_config() {
        let settings = ShipperSettings::from_json_str(JSON).expect("parse json");
        let config = settings
            .to_builder()
            .expect("builder")
            .build_config()
            .expect("valid config");
        assert_eq!(config.endpoint(), "logs.internal:6514");
        assert_eq!(config.server_name(), "collector.internal");
        assert_eq!(config.delimiter, 0x1e);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.buffer_capacity, 65536);
        assert_eq!(config.verification, PeerVerification::SkipHostname);
        assert_eq!(config.backoff.base, Duration::from_millis(50));
        assert_eq!(config.backoff.cap, Duration::from_millis(500));
        assert!(!config.backoff.jitter);
        assert_eq!(config.close_timeout, Duration::from_millis(1500));
    }

    #[rstest]
    #[case::ini(ShipperSettings::from_ini_str(
        "[femtoship]\nhost = localhost\nport = 6514\nbuffer_capacity_bytes = 0\n",
        DEFAULT_INI_SECTION,
    ))]
    #[case::json(ShipperSettings::from_json_str(
        r#"{"host": "localhost", "port": 6514, "buffer_capacity_bytes": 0}"#,
    ))]
    fn zero_capacity_selects_default(#[case] settings: Result<ShipperSettings, SettingsError>) {
        let config = settings
            .expect("parse settings")
            .to_builder()
            .expect("builder")
            .build_config()
            .expect("zero capacity is not an error");
        assert_eq!(config.buffer_capacity, crate::DEFAULT_BUFFER_CAPACITY);
    }

    #[rstest]
    fn credentials_reference_configured_paths() {
        let settings = ShipperSettings::from_ini_str(INI, DEFAULT_INI_SECTION).expect("parse ini");
        let files = settings.credentials().expect("credential paths");
        assert_eq!(files.certificate, PathBuf::from("/etc/femtoship/client.pem"));
        assert_eq!(files.key, PathBuf::from("/etc/femtoship/client.key"));
        assert_eq!(files.trusted_cas, Some(PathBuf::from("/etc/femtoship/ca.pem")));
    }

    #[rstest]
    fn missing_key_path_is_a_credential_error() {
        let settings = ShipperSettings {
            client_certificate: Some("/etc/femtoship/client.pem".into()),
            ..ShipperSettings::default()
        };
        assert!(matches!(
            settings.credentials(),
            Err(CredentialError::Missing("client_key setting"))
        ));
    }

    #[rstest]
    #[case("port = many", "port")]
    #[case("connect_timeout_ms = -1", "connect_timeout_ms")]
    #[case("backoff_jitter = sometimes", "backoff_jitter")]
    fn ini_reports_invalid_values_with_key(#[case] line: &str, #[case] expected: &str) {
        let text = format!("[femtoship]\nhost = localhost\n{line}\n");
        let err = ShipperSettings::from_ini_str(&text, DEFAULT_INI_SECTION)
            .expect_err("value must be rejected");
        assert!(matches!(err, SettingsError::InvalidValue { key, .. } if key == expected));
    }

    #[rstest]
    #[case("delimiter", "\"ab\"")]
    #[case("delimiter", "\"0xzz\"")]
    #[case("verification", "\"maybe\"")]
    fn builder_conversion_reports_invalid_values(#[case] key: &str, #[case] value: &str) {
        let text = format!("{{\"host\": \"localhost\", \"port\": 1, \"{key}\": {value}}}");
        let settings = ShipperSettings::from_json_str(&text).expect("parse json");
        let err = settings.to_builder().expect_err("value must be rejected");
        assert!(matches!(err, SettingsError::InvalidValue { key: k, .. } if k == key));
    }

    #[rstest]
    #[case(r"delimiter = \n", b'\n')]
    #[case(r"delimiter = \t", b'\t')]
    #[case(r"delimiter = \0", 0)]
    #[case("delimiter = 0x1e", 0x1e)]
    fn ini_delimiter_escapes_are_literal(#[case] line: &str, #[case] expected: u8) {
        let text = format!("[femtoship]\nhost = localhost\nport = 6514\n{line}\n");
        let config = ShipperSettings::from_ini_str(&text, DEFAULT_INI_SECTION)
            .expect("parse ini")
            .to_builder()
            .expect("builder")
            .build_config()
            .expect("valid config");
        assert_eq!(config.delimiter, expected);
    }

    #[rstest]
    fn ini_keeps_backslashes_in_paths() {
        let text = r"[femtoship]
client_certificate = C:\certs\new.pem
client_key = C:\certs\tls\client.key
";
        let settings =
            ShipperSettings::from_ini_str(text, DEFAULT_INI_SECTION).expect("parse ini");
        assert_eq!(
            settings.client_certificate,
            Some(PathBuf::from(r"C:\certs\new.pem"))
        );
        assert_eq!(
            settings.client_key,
            Some(PathBuf::from(r"C:\certs\tls\client.key"))
        );
    }

    #[rstest]
    #[case("\\n", b'\n')]
    #[case("\\0", 0)]
    #[case("|", b'|')]
    #[case("0X0A", b'\n')]
    fn parses_delimiters(#[case] raw: &str, #[case] expected: u8) {
        assert_eq!(parse_delimiter(raw).expect("valid delimiter"), expected);
    }

    #[rstest]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            ShipperSettings::from_ini_str("[femtoship]\ncolour = blue\n", DEFAULT_INI_SECTION),
            Err(SettingsError::Parse(msg)) if msg.contains("colour")
        ));
        assert!(matches!(
            ShipperSettings::from_json_str("{\"colour\": \"blue\"}"),
            Err(SettingsError::Parse(_))
        ));
    }

    #[rstest]
    fn missing_section_is_reported() {
        let err = ShipperSettings::from_ini_str("[other]\nhost = x\n", DEFAULT_INI_SECTION)
            .expect_err("section must exist");
        assert!(matches!(err, SettingsError::Parse(msg) if msg.contains("[femtoship]")));
    }

    #[rstest]
    fn missing_port_fails_builder_validation() {
        let settings = ShipperSettings::from_ini_str(
            "[femtoship]\nhost = localhost\n",
            DEFAULT_INI_SECTION,
        )
        .expect("parse ini");
        let err = settings
            .to_builder()
            .expect("builder")
            .build_config()
            .expect_err("port is required");
        assert!(matches!(err, BuildError::InvalidConfig(msg) if msg.contains("port")));
    }

    #[rstest]
    #[case(".ini", INI)]
    #[case(".json", JSON)]
    fn load_dispatches_on_extension(#[case] suffix: &str, #[case] contents: &str) {
        let file = settings_file(suffix, contents);
        let settings = ShipperSettings::load(file.path()).expect("load settings");
        assert_eq!(settings.host.as_deref(), Some("logs.internal"));
    }

    #[rstest]
    fn load_rejects_unknown_extension() {
        let file = settings_file(".yaml", "host: x");
        assert!(matches!(
            ShipperSettings::load(file.path()),
            Err(SettingsError::UnknownFormat { .. })
        ));
    }

    #[rstest]
    fn load_reports_missing_file() {
        assert!(matches!(
            ShipperSettings::load("/nonexistent/femtoship.ini"),
            Err(SettingsError::NotFound { .. })
        ));
    }
}
