//! Storage contract
//!
//! Every backend (Git, in-memory, and the durable composite that wraps them)
//! implements [`Storage`]. Mutations accept an optional transaction context
//! which the Git backend projects onto commit notes; readers never take it.

use chronicle_core::{Document, Result, TransactionContext};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One historical version of a document.
///
/// `document` is `None` for commits that removed the document.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    /// Commit oid, hex-encoded
    pub commit_id: String,
    /// Commit timestamp (UTC)
    pub commit_time: DateTime<Utc>,
    /// Commit message
    pub commit_message: String,
    /// Committer name
    pub committer_name: String,
    /// Committer email
    pub committer_email: String,
    /// Document content at this commit, absent for deletions
    pub document: Option<Document>,
}

/// Contract implemented by every storage backend.
pub trait Storage: Send + Sync {
    /// Save a document on a branch, creating the branch on first write.
    /// Returns the stored document (with `_table` stamped).
    fn save(
        &self,
        doc: Document,
        branch: &str,
        tx: Option<&TransactionContext>,
    ) -> Result<Document>;

    /// Fetch a document by id. Missing documents and empty branches both
    /// yield `None`.
    fn get(&self, id: &str, branch: &str) -> Result<Option<Document>>;

    /// Delete a document. Returns `false` when the document was absent
    /// (no commit is produced).
    fn delete(&self, id: &str, branch: &str, tx: Option<&TransactionContext>) -> Result<bool>;

    /// Documents whose identifier starts with `prefix`
    fn list_by_prefix(&self, prefix: &str, branch: &str) -> Result<Vec<Document>>;

    /// Documents belonging to `table`
    fn list_by_table(&self, table: &str, branch: &str) -> Result<Vec<Document>>;

    /// Versions of a document, newest first; includes deletion commits
    fn get_history(&self, id: &str, branch: &str) -> Result<Vec<HistoryEntry>>;

    /// Document content as of an arbitrary commit
    fn get_at(&self, id: &str, commit: &str) -> Result<Option<Document>>;

    /// Re-save the content a document had at `commit` as a new commit on
    /// `branch`. History is never rewritten.
    fn restore(
        &self,
        id: &str,
        commit: &str,
        branch: &str,
        tx: Option<&TransactionContext>,
    ) -> Result<Document>;

    /// Names of all local branches
    fn list_branches(&self) -> Result<Vec<String>>;

    /// Create a branch pointing at the head of `from`
    fn create_branch(&self, name: &str, from: &str) -> Result<()>;

    /// Release the handle; subsequent calls fail with `RepositoryClosed`
    fn close(&self) -> Result<()>;
}
