//! Per-thread random generator and its rustls glue.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rustls::crypto::{CryptoProvider, GetRandomFailed, SecureRandom};
use thiserror::Error;

use super::entropy::EntropySource;

const SEED_LEN: usize = 32;

/// Output volume after which a generator pulls a fresh seed.
const RESEED_AFTER: usize = 1 << 20;

thread_local! {
    static THREAD_DRBG: RefCell<Option<Drbg>> = const { RefCell::new(None) };
}

#[derive(Debug, Error)]
pub enum DrbgError {
    #[error("seeding from entropy source failed: {0}")]
    Seed(#[from] rand::Error),

    #[error("a generator is already installed on this thread")]
    AlreadyInstalled,
}

/// A generator owned by one worker thread.
pub struct Drbg {
    rng: StdRng,
    entropy: Arc<EntropySource>,
    generated: usize,
}

impl Drbg {
    pub fn new(entropy: Arc<EntropySource>) -> Result<Self, rand::Error> {
        let mut seed = [0u8; SEED_LEN];
        entropy.draw(&mut seed)?;
        Ok(Self {
            rng: StdRng::from_seed(seed),
            entropy,
            generated: 0,
        })
    }

    pub fn fill(&mut self, out: &mut [u8]) -> Result<(), rand::Error> {
        if self.generated >= RESEED_AFTER {
            self.reseed()?;
        }
        self.rng.try_fill_bytes(out)?;
        self.generated = self.generated.saturating_add(out.len());
        Ok(())
    }

    fn reseed(&mut self) -> Result<(), rand::Error> {
        let mut seed = [0u8; SEED_LEN];
        self.entropy.draw(&mut seed)?;
        self.rng = StdRng::from_seed(seed);
        self.generated = 0;
        tracing::trace!("[tls] Thread generator reseeded");
        Ok(())
    }
}

/// Keeps a [`Drbg`] installed on the current thread.
///
/// Not `Send`: the generator belongs to the thread that installed it.
#[derive(Debug)]
pub struct DrbgGuard {
    _thread_bound: PhantomData<*const ()>,
}

impl DrbgGuard {
    pub fn install(entropy: Arc<EntropySource>) -> Result<Self, DrbgError> {
        THREAD_DRBG.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                return Err(DrbgError::AlreadyInstalled);
            }
            *slot = Some(Drbg::new(entropy)?);
            Ok(Self {
                _thread_bound: PhantomData,
            })
        })
    }

    /// Whether the calling thread has a generator installed.
    pub fn is_installed() -> bool {
        THREAD_DRBG
            .try_with(|slot| slot.borrow().is_some())
            .unwrap_or(false)
    }
}

impl Drop for DrbgGuard {
    fn drop(&mut self) {
        // Fails only during thread-local destruction, when the slot is gone anyway.
        let _ = THREAD_DRBG.try_with(|slot| slot.borrow_mut().take());
    }
}

/// `SecureRandom` backed by the calling thread's generator.
#[derive(Debug)]
pub struct ThreadRandom;

pub static THREAD_RANDOM: ThreadRandom = ThreadRandom;

impl SecureRandom for ThreadRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), GetRandomFailed> {
        THREAD_DRBG
            .try_with(|slot| match slot.borrow_mut().as_mut() {
                Some(drbg) => drbg.fill(buf).map_err(|_| GetRandomFailed),
                None => Err(GetRandomFailed),
            })
            .unwrap_or(Err(GetRandomFailed))
    }
}

/// The ring provider with randomness drawn from the worker's generator.
pub fn worker_provider() -> CryptoProvider {
    CryptoProvider {
        secure_random: &THREAD_RANDOM,
        ..rustls::crypto::ring::default_provider()
    }
}
