//! Per-branch writer locks
//!
//! Commits on the same branch must serialise: without this lock, two writers
//! could both resolve the same head, and the loser's ref update would be
//! rejected every time. Writers on different branches proceed in parallel.
//! Fair ordering is not guaranteed.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Named mutual exclusion keyed by branch name.
#[derive(Default)]
pub struct BranchLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl BranchLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the branch's lock.
    ///
    /// The lock entry is cloned out of the table before locking so the
    /// table shard is never held across `f`.
    pub fn with_lock<T>(&self, branch: &str, f: impl FnOnce() -> T) -> T {
        let lock = self
            .locks
            .entry(branch.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();
        f()
    }

    /// Drop the lock entry for a branch (e.g. after branch deletion).
    /// Safe to call at any time; the entry is lazily re-created on next use.
    pub fn remove(&self, branch: &str) {
        self.locks.remove(branch);
    }
}
