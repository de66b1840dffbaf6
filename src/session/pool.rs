//! Per-thread pool of session slots.
//!
//! # Responsibilities
//! - Map a live descriptor to the slot holding its session
//! - Recycle released slots for the next descriptor
//! - Grow only when every existing slot is bound
//!
//! # Design Decisions
//! - Arena of slots addressed by index; released indices go on a free stack
//! - A slot is never removed, so the pool size only grows within a thread's life
//! - Releasing a slot drops its session at once; rustls has no in-place reset,
//!   so a rebound slot always gets a freshly built one
//! - Sessions are boxed so taking one in and out of its slot moves a pointer

use std::collections::HashMap;
use std::os::fd::RawFd;

use crate::session::TlsSession;

/// Stable index of a slot within one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// How `get_or_bind` satisfied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// The descriptor was already bound.
    Existing,
    /// A released slot was recycled.
    Reused,
    /// The pool grew by one slot.
    Created,
}

/// Slots owned by one worker thread. A free slot holds no session.
pub struct SessionPool<S = TlsSession> {
    slots: Vec<Option<Box<S>>>,
    index: HashMap<RawFd, usize>,
    free: Vec<usize>,
}

impl<S> Default for SessionPool<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> SessionPool<S> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            free: Vec::new(),
        }
    }

    pub fn lookup(&mut self, fd: RawFd) -> Option<&mut S> {
        let idx = *self.index.get(&fd)?;
        self.slots[idx].as_deref_mut()
    }

    pub fn slot_of(&self, fd: RawFd) -> Option<SlotId> {
        self.index.get(&fd).copied().map(SlotId)
    }

    /// Return the session bound to `fd`, binding a new one from `make` if
    /// there is none. `make` runs only when a slot has to be (re)filled; if it
    /// fails the pool is left unchanged.
    pub fn get_or_bind<E>(
        &mut self,
        fd: RawFd,
        make: impl FnOnce() -> Result<S, E>,
    ) -> Result<(SlotId, Binding, &mut S), E> {
        let bound = self.index.get(&fd).copied();
        let taken = bound.and_then(|idx| self.slots[idx].take());

        let (idx, binding, session) = match (bound, taken) {
            (Some(idx), Some(session)) => (idx, Binding::Existing, session),
            (bound, _) => {
                let session = Box::new(make()?);
                let (idx, binding) = match bound.or_else(|| self.free.pop()) {
                    Some(idx) => (idx, Binding::Reused),
                    None => {
                        self.slots.push(None);
                        (self.slots.len() - 1, Binding::Created)
                    }
                };
                self.index.insert(fd, idx);
                (idx, binding, session)
            }
        };
        Ok((SlotId(idx), binding, &mut **self.slots[idx].insert(session)))
    }

    /// Unbind `fd` and drop its session. Returns the freed slot, or `None`
    /// if `fd` was not bound.
    pub fn release(&mut self, fd: RawFd) -> Option<SlotId> {
        let idx = self.index.remove(&fd)?;
        self.slots[idx] = None;
        self.free.push(idx);
        Some(SlotId(idx))
    }

    /// Drop every session and slot.
    pub fn clear(&mut self) {
        self.index.clear();
        self.free.clear();
        self.slots.clear();
    }

    /// Total slots, bound or free.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots currently bound to a descriptor.
    pub fn active(&self) -> usize {
        self.index.len()
    }

    /// Slots waiting for reuse.
    pub fn free(&self) -> usize {
        self.free.len()
    }
}
