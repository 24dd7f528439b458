//! In-process target locks
//!
//! Locks are keyed by target checksum: two locks whose targets hash the same
//! contend for the same resource regardless of their names.

use crate::error::{Error, Result};
use crate::target::TargetLock;
use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Tracks which target checksums are currently held
#[derive(Debug, Default)]
pub struct LockManager {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a checksum is currently held by anyone
    pub fn is_held(&self, checksum: &str) -> bool {
        self.held_set().contains(checksum)
    }

    /// Acquire every lock, in checksum order
    ///
    /// Sorting gives every caller the same total order, so two callers with
    /// overlapping lock sets cannot deadlock. If any lock times out, the
    /// locks already taken are released before the error is returned.
    pub fn acquire_all(&self, locks: &[TargetLock]) -> Result<LockSet<'_>> {
        let mut ordered: Vec<&TargetLock> = locks.iter().collect();
        ordered.sort_by(|a, b| a.checksum().cmp(b.checksum()));

        let mut set = LockSet {
            manager: self,
            checksums: Vec::with_capacity(ordered.len()),
        };
        for lock in ordered {
            self.acquire(lock)?;
            set.checksums.push(lock.checksum().to_string());
        }
        Ok(set)
    }

    fn acquire(&self, lock: &TargetLock) -> Result<()> {
        let started = Instant::now();
        let deadline = started + lock.timeout;
        let mut held = self.held_set();

        while held.contains(lock.checksum()) {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::LockTimeout {
                    target: lock.target.name().to_string(),
                    checksum: lock.checksum().to_string(),
                    waited: started.elapsed(),
                });
            }
            held = self
                .released
                .wait_timeout(held, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        log::trace!("acquired lock on {}", lock.target);
        held.insert(lock.checksum().to_string());
        Ok(())
    }

    fn release(&self, checksum: &str) {
        self.held_set().remove(checksum);
        self.released.notify_all();
    }

    fn held_set(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Guard over a set of acquired locks
///
/// Dropping the set releases every lock in reverse acquisition order.
#[derive(Debug)]
pub struct LockSet<'a> {
    manager: &'a LockManager,
    checksums: Vec<String>,
}

impl LockSet<'_> {
    /// Checksums held, in acquisition order
    pub fn checksums(&self) -> &[String] {
        &self.checksums
    }

    pub fn len(&self) -> usize {
        self.checksums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checksums.is_empty()
    }
}

impl Drop for LockSet<'_> {
    fn drop(&mut self) {
        while let Some(checksum) = self.checksums.pop() {
            self.manager.release(&checksum);
        }
    }
}
