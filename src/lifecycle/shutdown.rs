//! Shutdown coordination for worker threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Coordinator for graceful shutdown.
///
/// Cloned into every worker; workers poll it between connections.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_is_seen_by_clones() {
        let shutdown = Shutdown::new();
        let worker = shutdown.clone();
        assert!(!worker.is_triggered());

        shutdown.trigger();
        assert!(worker.is_triggered());
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn test_trigger_crosses_threads() {
        let shutdown = Shutdown::new();
        let worker = shutdown.clone();
        let handle = std::thread::spawn(move || {
            while !worker.is_triggered() {
                std::thread::yield_now();
            }
        });
        shutdown.trigger();
        handle.join().unwrap();
    }
}
