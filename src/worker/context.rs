//! Per-worker TLS state.
//!
//! # Responsibilities
//! - Install the thread's random generator and load its private key
//! - Build the thread's rustls configuration around the shared session cache
//! - Own the thread's session pool and resolve descriptors to sessions
//! - Tear everything down when the worker stops or the plugin exits
//!
//! # Design Decisions
//! - `ThreadContext` is `!Send`; the generator it installs is thread-local
//! - Plugin exit cannot reach into other threads, so it retires the registry
//!   entry and the owning thread drops its pool on its next call
//! - Nothing here locks on the per-call path; the session cache lock is
//!   taken inside rustls only while resuming or storing a session

use std::os::fd::RawFd;
use std::sync::Arc;

use rustls::{ServerConfig, ServerConnection};

use crate::crypto::{worker_provider, DrbgGuard};
use crate::net::TransportError;
use crate::observability::metrics;
use crate::plugin::{InitError, TlsShared};
use crate::session::{Binding, SessionPool, SlotId, TlsSession};
use crate::worker::registry::{ThreadRegistry, WorkerEntry};

/// TLS state owned by one worker thread.
pub struct ThreadContext {
    entry: Arc<WorkerEntry>,
    registry: Arc<ThreadRegistry>,
    config: Arc<ServerConfig>,
    pool: SessionPool,
    /// Reused by vectored writes and file sends.
    scratch: Vec<u8>,
    key_fallback: bool,
    _drbg: DrbgGuard,
}

impl ThreadContext {
    pub(crate) fn init(shared: &TlsShared) -> Result<Self, InitError> {
        let drbg = DrbgGuard::install(Arc::clone(&shared.entropy))?;
        let key = shared.credentials.load_private_key()?;

        let mut config = ServerConfig::builder_with_provider(Arc::new(worker_provider()))
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(shared.credentials.served_chain(), key.key)?;
        config.session_storage = shared.cache.clone();
        if let Some(ticketer) = &shared.ticketer {
            config.ticketer = Arc::clone(ticketer);
        }

        let entry = shared.registry.register();
        tracing::info!(
            worker = entry.id(),
            thread = entry.thread_name().unwrap_or("-"),
            key_fallback = key.used_fallback,
            "[tls] Thread context ready"
        );

        Ok(Self {
            entry,
            registry: Arc::clone(&shared.registry),
            config: Arc::new(config),
            pool: SessionPool::new(),
            scratch: Vec::new(),
            key_fallback: key.used_fallback,
            _drbg: drbg,
        })
    }

    pub fn id(&self) -> u64 {
        self.entry.id()
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    /// Whether this thread runs on the built-in test key.
    pub fn uses_fallback_key(&self) -> bool {
        self.key_fallback
    }

    pub fn is_retired(&self) -> bool {
        self.entry.is_retired()
    }

    /// Drop the pool if plugin exit retired this context. Returns whether it is retired.
    fn observe_retirement(&mut self) -> bool {
        if !self.entry.is_retired() {
            return false;
        }
        if !self.pool.is_empty() {
            tracing::info!(
                worker = self.entry.id(),
                slots = self.pool.len(),
                "[tls] Context retired, dropping sessions"
            );
            self.pool.clear();
            metrics::record_pool_slots(self.entry.id(), 0);
        }
        true
    }

    /// The session bound to `fd`, binding a fresh one if there is none.
    pub fn get_or_create_session(
        &mut self,
        fd: RawFd,
    ) -> Result<&mut ServerConnection, TransportError> {
        self.session_with_scratch(fd)
            .map(|(session, _)| session.connection_mut())
    }

    /// Like [`get_or_create_session`](Self::get_or_create_session), also
    /// lending out the thread's scratch buffer.
    pub(crate) fn session_with_scratch(
        &mut self,
        fd: RawFd,
    ) -> Result<(&mut TlsSession, &mut Vec<u8>), TransportError> {
        if self.observe_retirement() {
            return Err(TransportError::Retired);
        }

        let slots_before = self.pool.len();
        let config = &self.config;
        let entry = &self.entry;
        let (slot, binding, session) = self.pool.get_or_bind(fd, || {
            ServerConnection::new(Arc::clone(config)).map(TlsSession::new)
        })?;

        match binding {
            Binding::Existing => {}
            Binding::Reused => {
                metrics::record_session_reused();
                tracing::debug!(fd, slot = slot.index(), "[tls] Reusing free slot");
            }
            Binding::Created => {
                let slots = slots_before + 1;
                entry.publish_slots(slots);
                metrics::record_session_created();
                metrics::record_pool_slots(entry.id(), slots);
                tracing::debug!(fd, slot = slot.index(), slots, "[tls] New slot");
            }
        }
        Ok((session, &mut self.scratch))
    }

    /// The session bound to `fd`, if any.
    pub fn session(&mut self, fd: RawFd) -> Option<&mut ServerConnection> {
        self.tls_session(fd).map(TlsSession::connection_mut)
    }

    pub(crate) fn tls_session(&mut self, fd: RawFd) -> Option<&mut TlsSession> {
        if self.observe_retirement() {
            return None;
        }
        self.pool.lookup(fd)
    }

    pub fn slot_of(&self, fd: RawFd) -> Option<SlotId> {
        if self.entry.is_retired() {
            return None;
        }
        self.pool.slot_of(fd)
    }

    /// Unbind `fd` so its slot can serve another connection.
    pub fn release_session(&mut self, fd: RawFd) -> bool {
        if self.observe_retirement() {
            return false;
        }
        match self.pool.release(fd) {
            Some(slot) => {
                metrics::record_session_released();
                tracing::debug!(fd, slot = slot.index(), "[tls] Slot released");
                true
            }
            None => {
                tracing::error!(fd, "[tls] Context already unset");
                false
            }
        }
    }

    /// Decrypted bytes already buffered for `fd` and not yet read.
    pub fn buffered(&mut self, fd: RawFd) -> usize {
        // A failed connection keeps reporting its error; the next read surfaces it.
        self.session(fd)
            .and_then(|conn| conn.process_new_packets().ok())
            .map_or(0, |state| state.plaintext_bytes_to_read())
    }

    /// Total slots in the pool.
    pub fn slots(&self) -> usize {
        self.pool.len()
    }

    /// Slots bound to a live descriptor.
    pub fn active_sessions(&self) -> usize {
        self.pool.active()
    }

    pub fn free_slots(&self) -> usize {
        self.pool.free()
    }

    /// Destroy every session and deregister the context.
    pub fn teardown(self) {
        drop(self);
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        let id = self.entry.id();
        let slots = self.pool.len();
        self.pool.clear();
        let registered = self.registry.deregister(id);
        metrics::record_pool_slots(id, 0);
        tracing::info!(
            worker = id,
            slots,
            retired = !registered,
            "[tls] Thread context torn down"
        );
    }
}
