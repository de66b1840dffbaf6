//! Credential store.
//!
//! # Responsibilities
//! - Load the server certificate, the optional certificate chain and the DH
//!   parameters once per process
//! - Load the private key on behalf of each worker thread
//! - Substitute compiled-in material when operator files are missing or
//!   unusable, recording a warning for every substitution
//!
//! # Data Flow
//! ```text
//! CredentialPaths + Fallback
//!     → certificate file ──(unusable)──→ built-in certificate ──(absent)──→ fatal
//!     → chain file (only when the certificate file loaded) ──(unusable)──→ skipped
//!     → DH file ──(unusable)──→ RFC 5114 group
//!     → CredentialStore (read-only, shared by every thread)
//!     → load_private_key() per thread ──(unusable)──→ built-in key ──(absent)──→ fatal
//! ```
//!
//! # Design Decisions
//! - A built-in certificate is always paired with the built-in key
//! - PEM decoding is not enough: certificates are parsed as X.509 before use
//! - The store owns no key material; each thread holds its own copy

pub mod builtin;
pub mod dh;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;

use crate::config::CredentialPaths;
use crate::observability::metrics;

pub use builtin::Fallback;
pub use dh::{DhError, DhParams};

const BUILTIN_SOURCE: &str = "<built-in>";

/// Why one credential source could not be used.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("malformed PEM in {}: {source}", path.display())]
    Malformed { path: PathBuf, source: io::Error },

    #[error("no {section} section in {}", path.display())]
    Missing {
        path: PathBuf,
        section: &'static str,
    },

    #[error("invalid X.509 certificate in {}: {reason}", path.display())]
    InvalidCertificate { path: PathBuf, reason: String },

    #[error("invalid DH parameters in {}: {source}", path.display())]
    Dh { path: PathBuf, source: DhError },
}

/// Fatal credential failures.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no usable certificate: {0}")]
    NoCertificate(#[source] SourceError),

    #[error("no usable private key: {0}")]
    NoPrivateKey(#[source] SourceError),

    #[error("built-in DH group unusable: {0}")]
    DhFallback(#[source] DhError),

    #[error("private key rejected by crypto provider: {0}")]
    KeyRejected(#[source] rustls::Error),
}

/// A degraded-but-continue outcome.
#[derive(Debug)]
pub enum CredentialWarning {
    BuiltinCertificate(SourceError),
    ChainSkipped(SourceError),
    BuiltinDhParams(SourceError),
    BuiltinPrivateKey(SourceError),
}

impl fmt::Display for CredentialWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuiltinCertificate(e) => write!(f, "using built-in test certificate ({e})"),
            Self::ChainSkipped(e) => write!(f, "certificate chain skipped ({e})"),
            Self::BuiltinDhParams(e) => write!(f, "using built-in DH parameters ({e})"),
            Self::BuiltinPrivateKey(e) => write!(f, "using built-in test key ({e})"),
        }
    }
}

/// Warnings collected while loading the process-wide credentials.
#[derive(Debug, Default)]
pub struct LoadReport {
    warnings: Vec<CredentialWarning>,
}

impl LoadReport {
    pub fn warnings(&self) -> &[CredentialWarning] {
        &self.warnings
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    fn push(&mut self, warning: CredentialWarning) {
        tracing::warn!(warning = %warning, "[tls] Degraded credential");
        self.warnings.push(warning);
    }
}

/// A private key ready to hand to rustls.
#[derive(Debug)]
pub struct LoadedKey {
    pub key: PrivateKeyDer<'static>,
    pub used_fallback: bool,
}

/// Process-wide, read-only credential material.
#[derive(Debug)]
pub struct CredentialStore {
    certificates: Vec<CertificateDer<'static>>,
    chain: Vec<CertificateDer<'static>>,
    dh: DhParams,
    key_path: PathBuf,
    fallback: Fallback,
    builtin_certificate: bool,
    report: LoadReport,
}

impl CredentialStore {
    /// Load the certificate, chain and DH parameters.
    ///
    /// Fails only when no certificate can be obtained at all.
    pub fn load(paths: &CredentialPaths, fallback: &Fallback) -> Result<Self, CredentialError> {
        let mut report = LoadReport::default();
        let mut builtin_certificate = false;

        let certificates = match read_certificates(&paths.certificate) {
            Ok(certs) => certs,
            Err(e) => match fallback.certificate_pem() {
                Some(pem) => {
                    let certs = parse_certificates(pem.as_bytes(), Path::new(BUILTIN_SOURCE))
                        .map_err(CredentialError::NoCertificate)?;
                    report.push(CredentialWarning::BuiltinCertificate(e));
                    metrics::record_credential_fallback("certificate");
                    builtin_certificate = true;
                    certs
                }
                None => {
                    tracing::error!(error = %e, "[tls] Load certificate failed");
                    return Err(CredentialError::NoCertificate(e));
                }
            },
        };

        // A chain only makes sense on top of the operator's own certificate.
        let chain = match (&paths.certificate_chain, builtin_certificate) {
            (Some(path), false) => match read_certificates(path) {
                Ok(chain) => chain,
                Err(e) => {
                    report.push(CredentialWarning::ChainSkipped(e));
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };

        let dh = match read_dh_params(&paths.dh_parameters) {
            Ok(dh) => dh,
            Err(e) => {
                let dh = DhParams::rfc5114_modp_1024().map_err(|e| {
                    tracing::error!(error = %e, "[tls] Load DH parameter failed");
                    CredentialError::DhFallback(e)
                })?;
                report.push(CredentialWarning::BuiltinDhParams(e));
                metrics::record_credential_fallback("dh_parameters");
                dh
            }
        };

        tracing::info!(
            certificates = certificates.len(),
            chain = chain.len(),
            dh_bits = dh.prime_bits(),
            warnings = report.warnings().len(),
            "[tls] Credentials loaded"
        );

        Ok(Self {
            certificates,
            chain,
            dh,
            key_path: paths.private_key.clone(),
            fallback: *fallback,
            builtin_certificate,
            report,
        })
    }

    /// Load a private key for one worker thread.
    ///
    /// Every call yields an independent copy. A key the crypto provider
    /// cannot use is treated like a missing one.
    pub fn load_private_key(&self) -> Result<LoadedKey, CredentialError> {
        let operator = if self.builtin_certificate {
            Err(SourceError::Missing {
                path: self.key_path.clone(),
                section: "key matching the built-in certificate",
            })
        } else {
            read_private_key(&self.key_path).and_then(|key| check_key(key, &self.key_path))
        };

        match operator {
            Ok(key) => Ok(LoadedKey {
                key,
                used_fallback: false,
            }),
            Err(e) => {
                let Some(pem) = self.fallback.private_key_pem() else {
                    tracing::error!(error = %e, "[tls] Load private key failed");
                    return Err(CredentialError::NoPrivateKey(e));
                };
                let source = Path::new(BUILTIN_SOURCE);
                let key = parse_private_key(pem.as_bytes(), source)
                    .map_err(CredentialError::NoPrivateKey)?;
                rustls::crypto::ring::default_provider()
                    .key_provider
                    .load_private_key(key.clone_key())
                    .map_err(CredentialError::KeyRejected)?;
                tracing::warn!(warning = %CredentialWarning::BuiltinPrivateKey(e), "[tls] Degraded credential");
                metrics::record_credential_fallback("private_key");
                Ok(LoadedKey {
                    key,
                    used_fallback: true,
                })
            }
        }
    }

    /// Certificates presented to clients: the server certificate followed by the chain.
    pub fn served_chain(&self) -> Vec<CertificateDer<'static>> {
        self.certificates
            .iter()
            .chain(self.chain.iter())
            .cloned()
            .collect()
    }

    pub fn certificates(&self) -> &[CertificateDer<'static>] {
        &self.certificates
    }

    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    pub fn dh_params(&self) -> &DhParams {
        &self.dh
    }

    pub fn uses_builtin_certificate(&self) -> bool {
        self.builtin_certificate
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }
}

fn read_source(path: &Path) -> Result<Vec<u8>, SourceError> {
    fs::read(path).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, SourceError> {
    parse_certificates(&read_source(path)?, path)
}

fn parse_certificates(
    pem: &[u8],
    path: &Path,
) -> Result<Vec<CertificateDer<'static>>, SourceError> {
    let certs = rustls_pemfile::certs(&mut &*pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| SourceError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(SourceError::Missing {
            path: path.to_path_buf(),
            section: "CERTIFICATE",
        });
    }
    // rustls_pemfile only decodes base64.
    for cert in &certs {
        x509_parser::parse_x509_certificate(cert.as_ref()).map_err(|e| {
            SourceError::InvalidCertificate {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
    }
    Ok(certs)
}

fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, SourceError> {
    parse_private_key(&read_source(path)?, path)
}

fn parse_private_key(pem: &[u8], path: &Path) -> Result<PrivateKeyDer<'static>, SourceError> {
    match rustls_pemfile::private_key(&mut &*pem) {
        Ok(Some(key)) => Ok(key),
        Ok(None) => Err(SourceError::Missing {
            path: path.to_path_buf(),
            section: "PRIVATE KEY",
        }),
        Err(source) => Err(SourceError::Malformed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn check_key(key: PrivateKeyDer<'static>, path: &Path) -> Result<PrivateKeyDer<'static>, SourceError> {
    match rustls::crypto::ring::default_provider()
        .key_provider
        .load_private_key(key.clone_key())
    {
        Ok(_) => Ok(key),
        Err(e) => Err(SourceError::Malformed {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        }),
    }
}

fn read_dh_params(path: &Path) -> Result<DhParams, SourceError> {
    let pem = fs::read_to_string(path).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    DhParams::from_pem(&pem).map_err(|source| SourceError::Dh {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    fn paths(cert: &str, chain: Option<&str>, key: &str, dh: &str) -> CredentialPaths {
        CredentialPaths {
            certificate: fixture(cert),
            certificate_chain: chain.map(fixture),
            private_key: fixture(key),
            dh_parameters: fixture(dh),
        }
    }

    #[test]
    fn test_loads_operator_files() {
        let store = CredentialStore::load(
            &paths("server.pem", Some("chain.pem"), "server.key", "dhparam.pem"),
            &Fallback::none(),
        )
        .unwrap();

        assert!(store.report().is_clean());
        assert!(!store.uses_builtin_certificate());
        assert_eq!(store.certificates().len(), 1);
        assert_eq!(store.served_chain().len(), 2);
        assert_eq!(store.dh_params().prime_bits(), 2048);

        let key = store.load_private_key().unwrap();
        assert!(!key.used_fallback);
    }

    #[test]
    fn test_missing_certificate_without_fallback_is_fatal() {
        let err = CredentialStore::load(
            &paths("absent.pem", None, "server.key", "dhparam.pem"),
            &Fallback::none(),
        )
        .unwrap_err();
        assert!(matches!(err, CredentialError::NoCertificate(SourceError::Read { .. })));
    }

    #[test]
    fn test_corrupt_certificate_without_fallback_is_fatal() {
        let err = CredentialStore::load(
            &paths("corrupt.pem", None, "server.key", "dhparam.pem"),
            &Fallback::none(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CredentialError::NoCertificate(SourceError::InvalidCertificate { .. })
        ));
    }

    #[cfg(feature = "builtin-test-certs")]
    #[test]
    fn test_missing_certificate_falls_back_with_warning() {
        let store = CredentialStore::load(
            &paths("absent.pem", Some("chain.pem"), "server.key", "dhparam.pem"),
            &Fallback::builtin(),
        )
        .unwrap();

        assert!(store.uses_builtin_certificate());
        assert!(matches!(
            store.report().warnings(),
            [CredentialWarning::BuiltinCertificate(_)]
        ));
        // The chain belongs to the operator certificate, not the built-in one.
        assert!(store.chain().is_empty());

        let key = store.load_private_key().unwrap();
        assert!(key.used_fallback);
    }

    #[test]
    fn test_bad_chain_is_skipped() {
        let store = CredentialStore::load(
            &paths("server.pem", Some("empty.pem"), "server.key", "dhparam.pem"),
            &Fallback::none(),
        )
        .unwrap();
        assert!(matches!(
            store.report().warnings(),
            [CredentialWarning::ChainSkipped(SourceError::Missing { .. })]
        ));
        assert_eq!(store.served_chain().len(), 1);
    }

    #[test]
    fn test_bad_dh_file_uses_rfc5114_group() {
        let store = CredentialStore::load(
            &paths("server.pem", None, "server.key", "empty.pem"),
            &Fallback::none(),
        )
        .unwrap();
        assert_eq!(store.dh_params(), &DhParams::rfc5114_modp_1024().unwrap());
        assert!(matches!(
            store.report().warnings(),
            [CredentialWarning::BuiltinDhParams(SourceError::Dh { .. })]
        ));
    }

    #[test]
    fn test_missing_key_without_fallback_is_fatal() {
        let store = CredentialStore::load(
            &paths("server.pem", None, "absent.key", "dhparam.pem"),
            &Fallback::none(),
        )
        .unwrap();
        assert!(matches!(
            store.load_private_key(),
            Err(CredentialError::NoPrivateKey(SourceError::Read { .. }))
        ));
    }

    #[test]
    fn test_certificate_file_is_not_a_key() {
        let store = CredentialStore::load(
            &paths("server.pem", None, "server.pem", "dhparam.pem"),
            &Fallback::none(),
        )
        .unwrap();
        assert!(matches!(
            store.load_private_key(),
            Err(CredentialError::NoPrivateKey(SourceError::Missing { .. }))
        ));
    }
}
