//! Client credential providers.
//!
//! The shipper always authenticates itself with a certificate/key pair.
//! Providers hand over PEM material; [`ClientCredentials::into_tls_material`]
//! turns it into the `native-tls` identity and trusted roots used by the
//! connector.
//!
//! Private keys may be PKCS#8 (`PRIVATE KEY`) or PKCS#1 RSA
//! (`RSA PRIVATE KEY`); the latter is rewrapped as PKCS#8 before loading.
//! Other key types are reported with the conversion they need.

use std::{
    borrow::Cow,
    fs,
    path::{Path, PathBuf},
};

use base64::{Engine, engine::general_purpose::STANDARD};
use native_tls::{Certificate, Identity};

use crate::error::CredentialError;

const PEM_CERT_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_CERT_END: &str = "-----END CERTIFICATE-----";
const PKCS8_LABEL: &str = "PRIVATE KEY";
const PKCS1_RSA_LABEL: &str = "RSA PRIVATE KEY";
/// `AlgorithmIdentifier` for rsaEncryption with NULL parameters.
const RSA_ALGORITHM_ID: [u8; 15] = [
    0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01, 0x05, 0x00,
];

/// Source of the client identity and optional trusted roots.
pub trait CredentialProvider {
    /// Load the PEM material for the next connection setup.
    fn load(&self) -> Result<ClientCredentials, CredentialError>;
}

/// PEM encoded client credentials held in memory.
#[derive(Clone, Default)]
pub struct ClientCredentials {
    /// Client certificate chain, leaf first.
    pub certificate_pem: Vec<u8>,
    /// PKCS#8 private key matching the certificate.
    pub key_pem: Vec<u8>,
    /// Optional bundle of trusted root certificates.
    pub trusted_roots_pem: Option<Vec<u8>>,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("certificate_pem", &self.certificate_pem.len())
            .field("key_pem", &"<redacted>")
            .field(
                "trusted_roots_pem",
                &self.trusted_roots_pem.as_ref().map(Vec::len),
            )
            .finish()
    }
}

/// Parsed credential material ready for a TLS connector.
pub(crate) struct TlsMaterial {
    pub(crate) identity: Identity,
    pub(crate) roots: Vec<Certificate>,
}

impl ClientCredentials {
    /// Construct credentials from a certificate and key.
    pub fn new(certificate_pem: impl Into<Vec<u8>>, key_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            certificate_pem: certificate_pem.into(),
            key_pem: key_pem.into(),
            trusted_roots_pem: None,
        }
    }

    /// Attach a PEM bundle of trusted root certificates.
    pub fn with_trusted_roots(mut self, bundle: impl Into<Vec<u8>>) -> Self {
        self.trusted_roots_pem = Some(bundle.into());
        self
    }

    pub(crate) fn into_tls_material(self) -> Result<TlsMaterial, CredentialError> {
        if is_blank(&self.certificate_pem) {
            return Err(CredentialError::Missing("client certificate"));
        }
        if is_blank(&self.key_pem) {
            return Err(CredentialError::Missing("client key"));
        }
        let key_pem = normalise_private_key(&self.key_pem)?;
        let identity = Identity::from_pkcs8(&self.certificate_pem, &key_pem)
            .map_err(CredentialError::InvalidIdentity)?;
        let roots = match self.trusted_roots_pem {
            Some(bundle) => parse_trust_bundle(&bundle)?,
            None => Vec::new(),
        };
        Ok(TlsMaterial { identity, roots })
    }
}

impl CredentialProvider for ClientCredentials {
    fn load(&self) -> Result<ClientCredentials, CredentialError> {
        Ok(self.clone())
    }
}

/// Credentials read from PEM files on each call to [`load`](CredentialProvider::load).
#[derive(Clone, Debug)]
pub struct PemFiles {
    pub certificate: PathBuf,
    pub key: PathBuf,
    pub trusted_cas: Option<PathBuf>,
}

impl PemFiles {
    /// Reference a certificate and key on disk.
    pub fn new(certificate: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            certificate: certificate.into(),
            key: key.into(),
            trusted_cas: None,
        }
    }

    /// Reference a trusted CA bundle on disk.
    pub fn with_trusted_cas(mut self, path: impl Into<PathBuf>) -> Self {
        self.trusted_cas = Some(path.into());
        self
    }
}

impl CredentialProvider for PemFiles {
    fn load(&self) -> Result<ClientCredentials, CredentialError> {
        let trusted_roots_pem = self.trusted_cas.as_deref().map(read_pem).transpose()?;
        Ok(ClientCredentials {
            certificate_pem: read_pem(&self.certificate)?,
            key_pem: read_pem(&self.key)?,
            trusted_roots_pem,
        })
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, CredentialError> {
    fs::read(path).map_err(|source| CredentialError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn is_blank(pem: &[u8]) -> bool {
    pem.iter().all(u8::is_ascii_whitespace)
}

fn pem_label(pem: &str) -> Option<&str> {
    let start = pem.find("-----BEGIN ")? + "-----BEGIN ".len();
    let len = pem[start..].find("-----")?;
    Some(&pem[start..start + len])
}

/// Bring the private key into the PKCS#8 form `native-tls` loads.
///
/// Material without a PEM header is passed through so the identity parser
/// reports it.
fn normalise_private_key(key_pem: &[u8]) -> Result<Cow<'_, [u8]>, CredentialError> {
    let text = String::from_utf8_lossy(key_pem);
    match pem_label(&text) {
        None | Some(PKCS8_LABEL) => Ok(Cow::Borrowed(key_pem)),
        // Encrypted legacy keys carry a Proc-Type header.
        Some(PKCS1_RSA_LABEL) if !text.contains("Proc-Type:") => {
            let pkcs1 = decode_pem_body(&text)?;
            Ok(Cow::Owned(rsa_pkcs1_to_pkcs8_pem(&pkcs1).into_bytes()))
        }
        Some(label) => Err(CredentialError::UnsupportedKeyFormat {
            label: label.to_owned(),
        }),
    }
}

fn decode_pem_body(pem: &str) -> Result<Vec<u8>, CredentialError> {
    let body: String = pem
        .lines()
        .skip_while(|line| !line.starts_with("-----BEGIN "))
        .skip(1)
        .take_while(|line| !line.starts_with("-----END "))
        .map(str::trim)
        .collect();
    STANDARD
        .decode(body)
        .map_err(CredentialError::InvalidKeyEncoding)
}

fn der_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    let mut out = vec![0x80 | (bytes.len() - skip) as u8];
    out.extend_from_slice(&bytes[skip..]);
    out
}

/// Wrap a DER `RSAPrivateKey` in a `PrivateKeyInfo` and PEM-encode it.
fn rsa_pkcs1_to_pkcs8_pem(pkcs1: &[u8]) -> String {
    let mut info = vec![0x02, 0x01, 0x00];
    info.extend_from_slice(&RSA_ALGORITHM_ID);
    info.push(0x04);
    info.extend(der_length(pkcs1.len()));
    info.extend_from_slice(pkcs1);

    let mut der = vec![0x30];
    der.extend(der_length(info.len()));
    der.extend(info);

    let encoded = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {PKCS8_LABEL}-----\n");
    for line in encoded.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {PKCS8_LABEL}-----\n"));
    pem
}

/// Split a PEM bundle into its individual certificate blocks.
fn split_pem_certificates(bundle: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = bundle;
    while let Some(start) = rest.find(PEM_CERT_BEGIN) {
        let Some(len) = rest[start..].find(PEM_CERT_END) else {
            // Truncated trailing block; hand it to the parser so it reports the error.
            blocks.push(&rest[start..]);
            break;
        };
        let end = start + len + PEM_CERT_END.len();
        blocks.push(&rest[start..end]);
        rest = &rest[end..];
    }
    blocks
}

fn parse_trust_bundle(bundle: &[u8]) -> Result<Vec<Certificate>, CredentialError> {
    let text = String::from_utf8_lossy(bundle);
    let blocks = split_pem_certificates(&text);
    if blocks.is_empty() {
        return Err(CredentialError::EmptyTrustBundle);
    }
    blocks
        .into_iter()
        .enumerate()
        .map(|(index, block)| {
            Certificate::from_pem(block.as_bytes())
                .map_err(|source| CredentialError::InvalidCertificate { index, source })
        })
        .collect()
}
