//! Error types surfaced by the shipper.
//!
//! Construction failures are reported through [`BuildError`], write
//! rejections through [`WriteError`]. Connect and transport write failures
//! never reach callers; the pump absorbs them by reconnecting.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures loading or parsing client credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// A credential file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Required material was absent or empty.
    #[error("missing {0}")]
    Missing(&'static str),
    /// The certificate/key pair could not be turned into a TLS identity.
    #[error("invalid client identity: {0}")]
    InvalidIdentity(#[source] native_tls::Error),
    /// A certificate in the trusted-root bundle failed to parse.
    #[error("invalid trusted certificate at position {index}: {source}")]
    InvalidCertificate {
        index: usize,
        #[source]
        source: native_tls::Error,
    },
    /// The private key uses a PEM type that cannot be loaded.
    #[error(
        "unsupported private key format {label:?}; convert it to PKCS#8 with `openssl pkcs8 -topk8 -nocrypt`"
    )]
    UnsupportedKeyFormat { label: String },
    /// The body of a PEM private key is not valid base64.
    #[error("private key PEM body is not valid base64: {0}")]
    InvalidKeyEncoding(#[source] base64::DecodeError),
    /// A trusted-root bundle was supplied but contained no certificates.
    #[error("trusted CA bundle contains no certificates")]
    EmptyTrustBundle,
}

/// Errors that may occur while constructing a shipper.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Invalid user supplied configuration.
    #[error("invalid shipper configuration: {0}")]
    InvalidConfig(String),
    /// Credential material was missing or unparsable.
    #[error(transparent)]
    Credential(#[from] CredentialError),
    /// The TLS connector could not be assembled from valid material.
    #[error("failed to build tls connector: {0}")]
    Tls(#[source] native_tls::Error),
    /// The worker thread could not be spawned.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reasons a record was not accepted by [`FemtoShipper::write`](crate::FemtoShipper::write).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum WriteError {
    /// The framed record does not fit in the remaining buffer space.
    #[error("record buffer full: frame needs {needed} bytes, {available} available")]
    BufferFull { needed: usize, available: usize },
    /// The shipper has been closed.
    #[error("shipper is closed")]
    Closed,
}

impl From<WriteError> for io::Error {
    fn from(err: WriteError) -> Self {
        let kind = match err {
            WriteError::BufferFull { .. } => io::ErrorKind::WouldBlock,
            WriteError::Closed => io::ErrorKind::BrokenPipe,
        };
        io::Error::new(kind, err)
    }
}
