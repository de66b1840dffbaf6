//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! <config_dir>/tls.toml
//!     → loader.rs (parse & deserialize, defaults when absent)
//!     → validation.rs (semantic checks)
//!     → PluginConfig (validated, immutable)
//!     → schema.rs resolves credential paths against the config dir
//!     → handed to the credential store at plugin init
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the credential store is built from it once
//! - All fields have defaults to allow minimal (or missing) configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_from_dir, ConfigError};
pub use schema::{CredentialPaths, ObservabilityConfig, PluginConfig, TlsConfig};
pub use validation::ValidationError;
