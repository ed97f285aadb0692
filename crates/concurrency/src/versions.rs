//! Version tracking
//!
//! A mapping from `(document_id, branch)` to a non-negative counter,
//! incremented once per completed mutation. Counters live in process memory
//! and reset to zero on restart; conflict detection is in-process only.

use chronicle_core::{Error, Result};
use dashmap::DashMap;

/// Per-`(document, branch)` version counters.
#[derive(Default)]
pub struct VersionTracker {
    versions: DashMap<(String, String), u64>,
}

impl VersionTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Current version; `0` when the pair has never been written
    pub fn get_version(&self, id: &str, branch: &str) -> u64 {
        self.versions
            .get(&(id.to_string(), branch.to_string()))
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// Atomically bump the version, returning the new value
    pub fn increment_version(&self, id: &str, branch: &str) -> u64 {
        let mut entry = self
            .versions
            .entry((id.to_string(), branch.to_string()))
            .or_insert(0);
        *entry += 1;
        *entry
    }

    /// Succeed only when the current version equals `expected`
    pub fn verify_version(&self, id: &str, branch: &str, expected: u64) -> Result<()> {
        let actual = self.get_version(id, branch);
        if actual == expected {
            Ok(())
        } else {
            Err(Error::VersionConflict {
                id: id.to_string(),
                branch: branch.to_string(),
                expected,
                actual,
            })
        }
    }
}
