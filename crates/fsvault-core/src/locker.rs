//! Per-key mutual exclusion.
//!
//! Work for one key runs serially while work for other keys proceeds
//! concurrently. Entries are created on first acquisition and removed as soon
//! as no caller holds or waits for the key.

use std::{collections::HashMap, sync::Arc};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

/// Table of per-key locks. Cloning shares the same table.
#[derive(Debug, Clone, Default)]
pub struct KeyLocker {
    table: Arc<LockTable>,
}

#[derive(Debug, Default)]
struct LockTable {
    slots: Mutex<HashMap<String, Slot>>,
}

#[derive(Debug)]
struct Slot {
    gate: Arc<Gate>,
    /// Holders plus waiters.
    refs: usize,
}

/// The exclusive primitive for one key.
#[derive(Debug, Default)]
struct Gate {
    held: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    fn close(&self) {
        let mut held = self.held.lock();
        while *held {
            self.opened.wait(&mut held);
        }
        *held = true;
    }

    fn open(&self) {
        *self.held.lock() = false;
        self.opened.notify_one();
    }
}

impl KeyLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the caller exclusively owns `key`.
    pub fn acquire(&self, key: &str) -> KeyLock {
        let gate = {
            let mut slots = self.table.slots.lock();
            let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
                gate: Arc::new(Gate::default()),
                refs: 0,
            });
            slot.refs += 1;
            Arc::clone(&slot.gate)
        };

        // Waiting happens outside the table lock so other keys are unaffected.
        gate.close();
        trace!(key, "key lock acquired");

        KeyLock {
            key: key.to_string(),
            table: Arc::clone(&self.table),
            released: false,
        }
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.table.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LockTable {
    fn release(&self, key: &str) {
        let gate = {
            let mut slots = self.slots.lock();
            let Some(slot) = slots.get_mut(key) else {
                panic!("unlock requested for key={key} but no lock entry found");
            };
            slot.refs -= 1;
            let gate = Arc::clone(&slot.gate);
            if slot.refs == 0 {
                slots.remove(key);
            }
            gate
        };

        // The slot is settled before the gate opens, so a waiter never wakes
        // into an entry that a newcomer has already replaced.
        gate.open();
        trace!(key, "key lock released");
    }
}

/// A held lock on one key. Dropping the handle releases it.
#[must_use = "the key is unlocked as soon as the handle is dropped"]
#[derive(Debug)]
pub struct KeyLock {
    key: String,
    table: Arc<LockTable>,
    released: bool,
}

impl KeyLock {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock now rather than at end of scope.
    pub fn release(mut self) {
        self.unlock();
    }

    fn unlock(&mut self) {
        if !self.released {
            self.released = true;
            self.table.release(&self.key);
        }
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        self.unlock();
    }
}
