//! Process-wide entropy source.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

/// Draws between reseeds of the pooled generator from the OS.
const RESEED_INTERVAL: u32 = 1024;

struct Pool {
    rng: StdRng,
    since_reseed: u32,
}

/// Seed material for every worker's generator.
///
/// All callers are serialized through one mutex, held for a single draw.
pub struct EntropySource {
    pool: Mutex<Pool>,
    draws: AtomicU64,
}

impl EntropySource {
    pub fn new() -> Result<Self, rand::Error> {
        Ok(Self {
            pool: Mutex::new(Pool {
                rng: StdRng::from_rng(OsRng)?,
                since_reseed: 0,
            }),
            draws: AtomicU64::new(0),
        })
    }

    /// Fill `out` with seed material.
    pub fn draw(&self, out: &mut [u8]) -> Result<(), rand::Error> {
        {
            let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
            if pool.since_reseed >= RESEED_INTERVAL {
                pool.rng = StdRng::from_rng(OsRng)?;
                pool.since_reseed = 0;
            }
            pool.rng.try_fill_bytes(out)?;
            pool.since_reseed += 1;
        }
        self.draws.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Number of successful draws so far.
    pub fn draws(&self) -> u64 {
        self.draws.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for EntropySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntropySource")
            .field("draws", &self.draws())
            .finish_non_exhaustive()
    }
}
