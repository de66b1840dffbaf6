//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (cache capacity and timeout > 0)
//! - Reject empty path strings before they reach the filesystem
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PluginConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::path::PathBuf;

use thiserror::Error;

use crate::config::schema::PluginConfig;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("tls.session_cache_capacity must be greater than zero")]
    ZeroCacheCapacity,

    #[error("tls.session_cache_timeout_secs must be greater than zero")]
    ZeroCacheTimeout,

    #[error("tls.{0} is set to an empty path")]
    EmptyPath(&'static str),

    #[error("observability.log_level '{0}' is not one of trace, debug, info, warn, error")]
    UnknownLogLevel(String),
}

/// Check a parsed configuration, collecting every problem.
pub fn validate_config(config: &PluginConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let tls = &config.tls;

    if tls.session_cache_capacity == 0 {
        errors.push(ValidationError::ZeroCacheCapacity);
    }
    if tls.session_cache_timeout_secs == 0 {
        errors.push(ValidationError::ZeroCacheTimeout);
    }

    let paths: [(&'static str, &Option<PathBuf>); 4] = [
        ("certificate_file", &tls.certificate_file),
        ("certificate_chain_file", &tls.certificate_chain_file),
        ("private_key_file", &tls.private_key_file),
        ("dh_parameter_file", &tls.dh_parameter_file),
    ];
    for (key, path) in paths {
        if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            errors.push(ValidationError::EmptyPath(key));
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
