//! Configuration schema definitions.
//!
//! This module defines the configuration structure read from `tls.toml`.
//! All types derive Serde traits for deserialization from config files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default certificate filename under the config directory.
pub const DEFAULT_CERTIFICATE_FILE: &str = "srv_cert.pem";

/// Default private key filename under the config directory.
pub const DEFAULT_PRIVATE_KEY_FILE: &str = "rsa.pem";

/// Default DH parameter filename under the config directory.
pub const DEFAULT_DH_PARAMETER_FILE: &str = "dhparam.pem";

/// Root configuration for the TLS network layer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PluginConfig {
    /// Credential paths and session settings.
    pub tls: TlsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// The `[tls]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Server certificate (PEM).
    pub certificate_file: Option<PathBuf>,

    /// Extra certificates appended to the served chain (PEM).
    pub certificate_chain_file: Option<PathBuf>,

    /// Server private key (PEM, PKCS#1/PKCS#8/SEC1).
    pub private_key_file: Option<PathBuf>,

    /// Diffie-Hellman parameters (PEM `DH PARAMETERS`).
    pub dh_parameter_file: Option<PathBuf>,

    /// Maximum number of cached sessions before the oldest is evicted.
    pub session_cache_capacity: usize,

    /// Lifetime of a cached session in seconds.
    pub session_cache_timeout_secs: u64,

    /// Issue stateless session tickets in addition to the session cache.
    pub session_tickets: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            certificate_file: None,
            certificate_chain_file: None,
            private_key_file: None,
            dh_parameter_file: None,
            session_cache_capacity: 50,
            session_cache_timeout_secs: 86_400,
            session_tickets: true,
        }
    }
}

impl TlsConfig {
    /// Resolve the configured paths against `config_dir`, filling in the
    /// conventional filenames for anything left unset.
    pub fn resolve_paths(&self, config_dir: &Path) -> CredentialPaths {
        let resolve = |path: &Path| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                config_dir.join(path)
            }
        };
        let or_default = |path: &Option<PathBuf>, default: &str| match path {
            Some(path) => resolve(path),
            None => config_dir.join(default),
        };

        CredentialPaths {
            certificate: or_default(&self.certificate_file, DEFAULT_CERTIFICATE_FILE),
            certificate_chain: self.certificate_chain_file.as_deref().map(resolve),
            private_key: or_default(&self.private_key_file, DEFAULT_PRIVATE_KEY_FILE),
            dh_parameters: or_default(&self.dh_parameter_file, DEFAULT_DH_PARAMETER_FILE),
        }
    }
}

/// Fully resolved credential file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPaths {
    pub certificate: PathBuf,
    pub certificate_chain: Option<PathBuf>,
    pub private_key: PathBuf,
    pub dh_parameters: PathBuf,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Prometheus listener address, if metrics should be exported.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_address: None,
        }
    }
}
