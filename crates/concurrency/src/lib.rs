//! Optimistic concurrency control for Chronicle
//!
//! Three primitives:
//! - [`BranchLocks`]: named mutual exclusion keyed by branch, so at most one
//!   writer mutates a branch at a time (readers never take it)
//! - [`VersionTracker`]: per-`(document, branch)` version counters backing
//!   compare-and-swap semantics
//! - [`with_occ_retry`]: bounded retry with exponential backoff and jitter
//!   around version conflicts and rejected ref updates

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod locks;
pub mod retry;
pub mod versions;

pub use locks::BranchLocks;
pub use retry::{with_occ_retry, RetryConfig};
pub use versions::VersionTracker;
