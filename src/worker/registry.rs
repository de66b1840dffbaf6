//! Process-wide registry of worker thread contexts.
//!
//! # Responsibilities
//! - Track every live thread context so plugin exit can reach them
//! - Let plugin exit retire contexts owned by threads it cannot touch
//!
//! # Design Decisions
//! - The registry holds shared entries, never the contexts themselves;
//!   contexts stay owned by their threads
//! - Retirement is a flag the owning thread observes on its next call
//! - Deregistering an entry that is already gone is a no-op

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// Registry view of one worker's context.
#[derive(Debug)]
pub struct WorkerEntry {
    id: u64,
    thread_name: Option<String>,
    retired: AtomicBool,
    slots: AtomicUsize,
}

impl WorkerEntry {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn thread_name(&self) -> Option<&str> {
        self.thread_name.as_deref()
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    /// Pool size last published by the owning thread.
    pub fn slots(&self) -> usize {
        self.slots.load(Ordering::Relaxed)
    }

    pub fn publish_slots(&self, slots: usize) {
        self.slots.store(slots, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
pub struct ThreadRegistry {
    entries: DashMap<u64, Arc<WorkerEntry>>,
    next_id: AtomicU64,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the calling thread.
    pub fn register(&self) -> Arc<WorkerEntry> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(WorkerEntry {
            id,
            thread_name: std::thread::current().name().map(str::to_owned),
            retired: AtomicBool::new(false),
            slots: AtomicUsize::new(0),
        });
        self.entries.insert(id, Arc::clone(&entry));
        entry
    }

    /// Remove an entry. Returns `false` if it was already removed.
    pub fn deregister(&self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Retire and remove every registered entry. Returns how many were retired.
    pub fn retire_all(&self) -> usize {
        let ids: Vec<u64> = self.entries.iter().map(|e| *e.key()).collect();
        let mut retired = 0;
        for id in ids {
            if let Some((_, entry)) = self.entries.remove(&id) {
                entry.retire();
                retired += 1;
            }
        }
        retired
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total pool slots across registered workers.
    pub fn total_slots(&self) -> usize {
        self.entries.iter().map(|e| e.value().slots()).sum()
    }
}
