//! Host-facing plugin surface.
//!
//! # Responsibilities
//! - `plugin_init`: load `tls.toml`, the credentials and the shared services
//! - `worker_init`: build one [`ThreadContext`] per worker thread
//! - `plugin_exit`: retire every context and release the shared services
//! - Declare the network-layer hooks and the encrypted-socket capability
//!
//! # Data Flow
//! ```text
//! TlsPlugin::init(config_dir)
//!     → config (tls.toml, defaults)
//!     → CredentialStore::load (fallbacks, warnings)
//!     → EntropySource, SessionCache, optional ticketer, ThreadRegistry
//!     → TlsShared (immutable, behind an ArcSwapOption)
//!
//! worker thread
//!     → TlsPlugin::worker_init() → ThreadContext
//!     → TlsTransport hooks (read / write / writev / sendfile / close)
//!
//! TlsPlugin::exit()
//!     → registry.retire_all(), shared state dropped once workers let go
//! ```

use std::fs::File;
use std::io::IoSlice;
use std::os::fd::RawFd;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use rustls::server::ProducesTickets;
use thiserror::Error;

use crate::config::{self, ConfigError, PluginConfig};
use crate::credentials::{CredentialError, CredentialStore, Fallback};
use crate::crypto::{DrbgError, EntropySource};
use crate::net::{TlsTransport, Transfer, TransportError};
use crate::session::SessionCache;
use crate::worker::{ThreadContext, ThreadRegistry};

pub const SHORT_NAME: &str = "tls";
pub const NAME: &str = "TLS transport (rustls)";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Hook kind this plugin registers with the host.
pub const HOOK: &str = "network-layer";

/// Capability flags advertised to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Self = Self(0);
    /// Encrypted sockets: the host routes TLS listeners through this plugin.
    pub const SOCK_TLS: Self = Self(1 << 0);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Hooks the host calls in place of plain socket calls.
pub trait NetworkLayer {
    /// Per-worker state handed back on every call.
    type Worker;

    fn read(
        &self,
        worker: &mut Self::Worker,
        fd: RawFd,
        buf: &mut [u8],
    ) -> Result<Transfer, TransportError>;

    /// `Ready(n)` means `n` bytes reached the socket. After `WouldBlock` the
    /// caller retries with the same bytes.
    fn write(
        &self,
        worker: &mut Self::Worker,
        fd: RawFd,
        buf: &[u8],
    ) -> Result<Transfer, TransportError>;

    fn write_vectored(
        &self,
        worker: &mut Self::Worker,
        fd: RawFd,
        bufs: &[IoSlice<'_>],
    ) -> Result<Transfer, TransportError>;

    /// Send up to `count` bytes of `file` starting at `*offset` (`count == 0`
    /// means to end of file), advancing `*offset` by what was sent.
    fn send_file(
        &self,
        worker: &mut Self::Worker,
        fd: RawFd,
        file: &File,
        offset: &mut u64,
        count: usize,
    ) -> Result<Transfer, TransportError>;

    /// Shut the session down and close `fd`. Never fails; returns whether a
    /// session was bound.
    fn close(&self, worker: &mut Self::Worker, fd: RawFd) -> bool;

    /// Push output still queued for `fd`.
    fn flush(&self, worker: &mut Self::Worker, fd: RawFd) -> Result<Transfer, TransportError>;

    /// Largest useful buffer for a single call.
    fn buffer_size(&self) -> usize;
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("credentials: {0}")]
    Credentials(#[from] CredentialError),

    #[error("entropy source seeding failed: {0}")]
    Entropy(#[source] rand::Error),

    #[error("thread generator: {0}")]
    Drbg(#[from] DrbgError),

    #[error("TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("plugin has exited")]
    Exited,
}

/// Process-wide services shared by every worker.
#[derive(Debug)]
pub(crate) struct TlsShared {
    pub(crate) config: PluginConfig,
    pub(crate) credentials: Arc<CredentialStore>,
    pub(crate) cache: Arc<SessionCache>,
    pub(crate) entropy: Arc<EntropySource>,
    pub(crate) ticketer: Option<Arc<dyn ProducesTickets>>,
    pub(crate) registry: Arc<ThreadRegistry>,
}

/// The TLS network-layer plugin.
pub struct TlsPlugin {
    shared: ArcSwapOption<TlsShared>,
}

impl TlsPlugin {
    /// `plugin_init`: read `<config_dir>/tls.toml` and load the credentials.
    pub fn init(config_dir: &Path) -> Result<Self, InitError> {
        let config = config::load_from_dir(config_dir).map_err(|e| {
            tracing::error!(error = %e, dir = %config_dir.display(), "[tls] Configuration rejected");
            e
        })?;
        Self::from_config(config, config_dir, Fallback::builtin())
    }

    /// Build the plugin from an already loaded configuration.
    pub fn from_config(
        config: PluginConfig,
        config_dir: &Path,
        fallback: Fallback,
    ) -> Result<Self, InitError> {
        let paths = config.tls.resolve_paths(config_dir);
        let credentials = CredentialStore::load(&paths, &fallback)?;
        let entropy = EntropySource::new().map_err(InitError::Entropy)?;
        let cache = SessionCache::new(
            config.tls.session_cache_capacity,
            Duration::from_secs(config.tls.session_cache_timeout_secs),
        );
        let ticketer = if config.tls.session_tickets {
            Some(rustls::crypto::ring::Ticketer::new()?)
        } else {
            None
        };

        tracing::info!(
            name = NAME,
            version = VERSION,
            cache_capacity = cache.capacity(),
            session_tickets = ticketer.is_some(),
            builtin_certificate = credentials.uses_builtin_certificate(),
            "[tls] Plugin initialized"
        );

        Ok(Self {
            shared: ArcSwapOption::from_pointee(TlsShared {
                config,
                credentials: Arc::new(credentials),
                cache: Arc::new(cache),
                entropy: Arc::new(entropy),
                ticketer,
                registry: Arc::new(ThreadRegistry::new()),
            }),
        })
    }

    /// `worker_init`: state for the calling worker thread. A failure must
    /// abort that worker.
    pub fn worker_init(&self) -> Result<ThreadContext, InitError> {
        let shared = self.shared.load_full().ok_or(InitError::Exited)?;
        ThreadContext::init(&shared).map_err(|e| {
            tracing::error!(error = %e, "[tls] Worker init failed");
            e
        })
    }

    /// `plugin_exit`: retire every registered context and drop the shared
    /// services. Returns how many contexts were retired. Calling it again is
    /// a no-op.
    pub fn exit(&self) -> usize {
        match self.shared.swap(None) {
            Some(shared) => {
                let slots = shared.registry.total_slots();
                let retired = shared.registry.retire_all();
                tracing::info!(retired, slots, "[tls] Plugin exit");
                retired
            }
            None => 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.load().is_some()
    }

    pub fn transport(&self) -> TlsTransport {
        TlsTransport
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::SOCK_TLS
    }

    pub fn session_cache(&self) -> Option<Arc<SessionCache>> {
        self.shared.load_full().map(|s| Arc::clone(&s.cache))
    }

    pub fn credentials(&self) -> Option<Arc<CredentialStore>> {
        self.shared.load_full().map(|s| Arc::clone(&s.credentials))
    }

    pub fn config(&self) -> Option<PluginConfig> {
        self.shared.load_full().map(|s| s.config.clone())
    }

    /// Worker contexts currently registered.
    pub fn workers(&self) -> usize {
        self.shared.load_full().map_or(0, |s| s.registry.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixtures() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
    }

    fn fixture_config() -> PluginConfig {
        let mut config = PluginConfig::default();
        config.tls.certificate_file = Some("server.pem".into());
        config.tls.private_key_file = Some("server.key".into());
        config
    }

    #[test]
    fn test_capabilities() {
        let caps = Capabilities::SOCK_TLS;
        assert!(caps.contains(Capabilities::SOCK_TLS));
        assert!(!Capabilities::NONE.contains(Capabilities::SOCK_TLS));
        assert_eq!(SHORT_NAME, "tls");
    }

    #[test]
    fn test_worker_lifecycle() {
        let plugin = TlsPlugin::from_config(fixture_config(), &fixtures(), Fallback::none()).unwrap();
        assert_eq!(plugin.capabilities(), Capabilities::SOCK_TLS);
        assert_eq!(plugin.transport().buffer_size(), crate::net::BUFFER_SIZE);

        let ctx = plugin.worker_init().unwrap();
        assert_eq!(plugin.workers(), 1);
        assert!(!ctx.uses_fallback_key());
        ctx.teardown();
        assert_eq!(plugin.workers(), 0);
    }

    #[test]
    fn test_second_context_on_same_thread_fails() {
        let plugin = TlsPlugin::from_config(fixture_config(), &fixtures(), Fallback::none()).unwrap();
        let ctx = plugin.worker_init().unwrap();
        assert!(matches!(
            plugin.worker_init(),
            Err(InitError::Drbg(DrbgError::AlreadyInstalled))
        ));
        drop(ctx);
        assert!(plugin.worker_init().is_ok());
    }

    #[test]
    fn test_exit_retires_workers_and_rejects_new_ones() {
        let plugin = TlsPlugin::from_config(fixture_config(), &fixtures(), Fallback::none()).unwrap();
        let mut ctx = plugin.worker_init().unwrap();

        assert_eq!(plugin.exit(), 1);
        assert!(!plugin.is_active());
        assert!(ctx.is_retired());
        assert!(ctx.session(3).is_none());
        assert!(matches!(
            ctx.get_or_create_session(3),
            Err(TransportError::Retired)
        ));
        assert!(matches!(plugin.worker_init(), Err(InitError::Exited)));
        assert_eq!(plugin.exit(), 0);
    }

    #[test]
    fn test_missing_certificate_without_fallback_fails_init() {
        let mut config = fixture_config();
        config.tls.certificate_file = Some("absent.pem".into());
        assert!(matches!(
            TlsPlugin::from_config(config, &fixtures(), Fallback::none()),
            Err(InitError::Credentials(CredentialError::NoCertificate(_)))
        ));
    }

    #[test]
    fn test_init_reads_tls_toml() {
        // No tls.toml in the fixtures directory: conventional names apply,
        // and only dhparam.pem exists there under its default name.
        let result = TlsPlugin::init(&fixtures());
        if cfg!(feature = "builtin-test-certs") {
            let plugin = result.unwrap();
            assert!(plugin.credentials().unwrap().uses_builtin_certificate());
        } else {
            assert!(result.is_err());
        }
    }
}
