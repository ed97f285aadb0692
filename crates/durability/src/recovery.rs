//! Recovery planning
//!
//! Recovery walks the non-terminal entries in timestamp order and resolves
//! each according to how far its pipeline got before the crash:
//!
//! - `pending`: no side effect is visible; conservatively roll back (the
//!   caller can retry at a higher level)
//! - `git-committed`: the ref advanced but the index may lag; re-apply the
//!   index update (idempotent) and complete
//! - `index-committed`: only the final marker is missing; complete
//! - terminal states: truncation candidates
//!
//! The sweep is idempotent and safe to run repeatedly: the driver in the
//! engine crate executes these actions and then truncates.

use crate::entry::{WalEntry, WalState};

/// Resolution for one WAL entry during the startup sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Mark the entry `rolled-back`; nothing was applied
    RollBack,
    /// Re-apply the index update, then mark `completed`
    ReapplyIndex,
    /// Mark `completed`; all side effects already applied
    Complete,
    /// Entry is terminal; remove it during truncation
    Truncate,
}

/// Decide how to resolve an entry found at startup
pub fn plan(entry: &WalEntry) -> RecoveryAction {
    match entry.state {
        WalState::Pending => RecoveryAction::RollBack,
        WalState::GitCommitted => RecoveryAction::ReapplyIndex,
        WalState::IndexCommitted => RecoveryAction::Complete,
        WalState::Completed | WalState::RolledBack => RecoveryAction::Truncate,
    }
}
