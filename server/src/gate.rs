//! The gate: a non-reentrant mutual-exclusion lock over the entity
//! set. The simulation loop holds it for a full step; the network
//! loop holds it while executing commands and serializing snapshots.
//!
//! Re-acquisition by the thread that already holds the gate is a
//! programming error and panics immediately instead of deadlocking.
//! Release happens on every exit path through the guard's `Drop`.
//! All gate-protected work is synchronous and CPU-only; a guard must
//! never be held across an await point.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, ThreadId};

#[derive(Debug)]
pub struct Gate<T> {
    owner: Mutex<Option<ThreadId>>,
    data: Mutex<T>,
}

impl<T> Gate<T> {
    pub fn new(value: T) -> Self {
        Self {
            owner: Mutex::new(None),
            data: Mutex::new(value),
        }
    }

    /// Acquires the gate, blocking until it is free.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread already holds the gate, or if a
    /// previous holder panicked while inside it.
    pub fn lock(&self) -> GateGuard<'_, T> {
        let me = thread::current().id();
        let reentry = {
            let owner = self.owner.lock().expect("gate owner state poisoned");
            *owner == Some(me)
        };
        if reentry {
            panic!("gate re-entered by thread {:?}; the gate is non-reentrant", me);
        }

        let guard = self.data.lock().expect("gate poisoned by a panicking holder");
        *self.owner.lock().expect("gate owner state poisoned") = Some(me);

        GateGuard { gate: self, guard }
    }
}

/// Scoped access to the gated value; releases the gate on drop.
pub struct GateGuard<'a, T> {
    gate: &'a Gate<T>,
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for GateGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for GateGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for GateGuard<'_, T> {
    fn drop(&mut self) {
        if let Ok(mut owner) = self.gate.owner.lock() {
            *owner = None;
        }
    }
}
