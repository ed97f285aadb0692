//! Durable composite storage
//!
//! Wraps a base storage with the WAL, the index, and optimistic concurrency
//! control. Every mutation runs the pipeline:
//!
//! ```text
//! with_occ_retry:
//!   with_branch_lock(branch):
//!     append WAL entry (pending)
//!     base mutation              -> mark git-committed
//!     index update               -> mark index-committed
//!                                   (failure logged; recovery reconciles)
//!     mark completed
//!     bump version counter
//! ```
//!
//! A base failure marks the entry `rolled-back` and rethrows; rejected ref
//! updates and version conflicts are retried by the OCC wrapper with a
//! fresh WAL entry per attempt. Reads bypass the WAL and OCC entirely.

use chronicle_concurrency::{with_occ_retry, BranchLocks, RetryConfig, VersionTracker};
use chronicle_core::{Document, Error, Result, TransactionContext};
use chronicle_durability::{FileWal, WalEntry, WalState};
use chronicle_search::Index;
use chronicle_storage::{HistoryEntry, Storage};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::recovery::{self, RecoveryReport};

/// Storage composite enforcing WAL-first mutations with OCC and index
/// maintenance.
pub struct DurableStorage {
    base: Arc<dyn Storage>,
    wal: Arc<FileWal>,
    index: Arc<dyn Index>,
    locks: BranchLocks,
    versions: VersionTracker,
    retry: RetryConfig,
}

impl DurableStorage {
    /// Compose a base storage with a WAL and an index, using the default
    /// retry policy
    pub fn new(base: Arc<dyn Storage>, wal: Arc<FileWal>, index: Arc<dyn Index>) -> Self {
        Self::with_retry(base, wal, index, RetryConfig::new())
    }

    /// Compose with an explicit retry policy
    pub fn with_retry(
        base: Arc<dyn Storage>,
        wal: Arc<FileWal>,
        index: Arc<dyn Index>,
        retry: RetryConfig,
    ) -> Self {
        DurableStorage {
            base,
            wal,
            index,
            locks: BranchLocks::new(),
            versions: VersionTracker::new(),
            retry,
        }
    }

    /// Per-`(document, branch)` version counters
    pub fn versions(&self) -> &VersionTracker {
        &self.versions
    }

    /// The wrapped index
    pub fn index(&self) -> &Arc<dyn Index> {
        &self.index
    }

    /// The write-ahead log
    pub fn wal(&self) -> &Arc<FileWal> {
        &self.wal
    }

    /// Run the startup recovery sweep over unresolved WAL entries
    pub fn recover(&self) -> Result<RecoveryReport> {
        recovery::run(&self.wal, self.index.as_ref())
    }

    fn rollback_entry(&self, entry_id: Uuid) {
        if let Err(e) = self.wal.mark_state(entry_id, WalState::RolledBack) {
            warn!(entry = %entry_id, error = %e, "failed to roll back WAL entry");
        }
    }

    /// Drive one mutation through the WAL state machine.
    ///
    /// `index_update` must be idempotent: recovery may re-run it.
    fn pipeline<T>(
        &self,
        entry: WalEntry,
        branch: &str,
        mutate: impl FnOnce() -> Result<T>,
        index_update: impl FnOnce(&T) -> Result<()>,
        bump: impl FnOnce(&T) -> Option<String>,
    ) -> Result<T> {
        let entry_id = self.wal.append(entry)?;
        match mutate() {
            Ok(outcome) => {
                self.wal.mark_state(entry_id, WalState::GitCommitted)?;
                match index_update(&outcome) {
                    Ok(()) => {
                        self.wal.mark_state(entry_id, WalState::IndexCommitted)?;
                    }
                    Err(e) => {
                        warn!(branch, error = %e, "index update failed; recovery will reconcile");
                    }
                }
                self.wal.mark_state(entry_id, WalState::Completed)?;
                if let Some(id) = bump(&outcome) {
                    self.versions.increment_version(&id, branch);
                }
                Ok(outcome)
            }
            Err(e) => {
                self.rollback_entry(entry_id);
                Err(e)
            }
        }
    }
}

impl Storage for DurableStorage {
    fn save(
        &self,
        doc: Document,
        branch: &str,
        tx: Option<&TransactionContext>,
    ) -> Result<Document> {
        doc.validate()?;
        with_occ_retry(&self.retry, || {
            self.locks.with_lock(branch, || {
                let mut staged = doc.clone();
                staged.ensure_table();
                let id = staged.validate()?.to_string();
                self.pipeline(
                    WalEntry::save(&staged, branch),
                    branch,
                    || self.base.save(staged.clone(), branch, tx),
                    |stored| self.index.index(stored, branch),
                    |_| Some(id.clone()),
                )
            })
        })
    }

    fn get(&self, id: &str, branch: &str) -> Result<Option<Document>> {
        self.base.get(id, branch)
    }

    fn delete(&self, id: &str, branch: &str, tx: Option<&TransactionContext>) -> Result<bool> {
        with_occ_retry(&self.retry, || {
            self.locks.with_lock(branch, || {
                self.pipeline(
                    WalEntry::delete(id, branch),
                    branch,
                    || self.base.delete(id, branch, tx),
                    |_| self.index.delete(id, branch).map(|_| ()),
                    // A delete of an absent document completes the pipeline
                    // but is not a new version of anything
                    |deleted| deleted.then(|| id.to_string()),
                )
            })
        })
    }

    fn list_by_prefix(&self, prefix: &str, branch: &str) -> Result<Vec<Document>> {
        self.base.list_by_prefix(prefix, branch)
    }

    fn list_by_table(&self, table: &str, branch: &str) -> Result<Vec<Document>> {
        self.base.list_by_table(table, branch)
    }

    fn get_history(&self, id: &str, branch: &str) -> Result<Vec<HistoryEntry>> {
        self.base.get_history(id, branch)
    }

    fn get_at(&self, id: &str, commit: &str) -> Result<Option<Document>> {
        self.base.get_at(id, commit)
    }

    fn restore(
        &self,
        id: &str,
        commit: &str,
        branch: &str,
        tx: Option<&TransactionContext>,
    ) -> Result<Document> {
        let historical = self
            .base
            .get_at(id, commit)?
            .ok_or_else(|| Error::NotFound(format!("document {id} at commit {commit}")))?;
        with_occ_retry(&self.retry, || {
            self.locks.with_lock(branch, || {
                self.pipeline(
                    WalEntry::save(&historical, branch),
                    branch,
                    || self.base.restore(id, commit, branch, tx),
                    |stored| self.index.index(stored, branch),
                    |_| Some(id.to_string()),
                )
            })
        })
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        self.base.list_branches()
    }

    fn create_branch(&self, name: &str, from: &str) -> Result<()> {
        self.base.create_branch(name, from)
    }

    fn close(&self) -> Result<()> {
        self.index.close()?;
        self.wal.close()?;
        self.base.close()
    }
}
