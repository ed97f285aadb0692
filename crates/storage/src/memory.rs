//! In-memory storage backend
//!
//! Reference implementation of the [`Storage`] contract with synthesized
//! commit history. Used by unit tests and anywhere the Git substrate is not
//! wanted; semantics (branch creation on first write, delete-returns-false,
//! history newest-first including deletions) match the Git engine.

use crate::traits::{HistoryEntry, Storage};
use chronicle_core::{Document, Error, Result, TransactionContext};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

const COMMITTER_NAME: &str = "memory";
const COMMITTER_EMAIL: &str = "memory@localhost";

#[derive(Clone)]
struct MemCommit {
    id: String,
    time: DateTime<Utc>,
    message: String,
    document_id: String,
    document: Option<Document>,
}

#[derive(Default, Clone)]
struct BranchState {
    docs: HashMap<String, Document>,
    commits: Vec<MemCommit>,
}

/// In-memory backend with per-branch document maps and a synthesized
/// commit log for history and time travel.
#[derive(Default)]
pub struct InMemoryStorage {
    branches: DashMap<String, BranchState>,
    closed: AtomicBool,
}

impl InMemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::RepositoryClosed);
        }
        Ok(())
    }

    fn record(
        &self,
        branch: &str,
        message: String,
        document_id: &str,
        document: Option<Document>,
    ) {
        let mut state = self.branches.entry(branch.to_string()).or_default();
        match &document {
            Some(doc) => {
                state.docs.insert(document_id.to_string(), doc.clone());
            }
            None => {
                state.docs.remove(document_id);
            }
        }
        state.commits.push(MemCommit {
            id: Uuid::new_v4().simple().to_string(),
            time: Utc::now(),
            message,
            document_id: document_id.to_string(),
            document,
        });
    }
}

impl Storage for InMemoryStorage {
    fn save(
        &self,
        mut doc: Document,
        branch: &str,
        tx: Option<&TransactionContext>,
    ) -> Result<Document> {
        self.ensure_open()?;
        doc.validate()?;
        doc.ensure_table();
        let id = doc.doc_id()?;
        self.record(
            branch,
            format!("Save document {id}"),
            id.as_str(),
            Some(doc.clone()),
        );
        if let Some(ctx) = tx {
            ctx.record_commit();
        }
        Ok(doc)
    }

    fn get(&self, id: &str, branch: &str) -> Result<Option<Document>> {
        self.ensure_open()?;
        Ok(self
            .branches
            .get(branch)
            .and_then(|state| state.docs.get(id).cloned()))
    }

    fn delete(&self, id: &str, branch: &str, tx: Option<&TransactionContext>) -> Result<bool> {
        self.ensure_open()?;
        let exists = self
            .branches
            .get(branch)
            .is_some_and(|state| state.docs.contains_key(id));
        if !exists {
            return Ok(false);
        }
        self.record(branch, format!("Delete document {id}"), id, None);
        if let Some(ctx) = tx {
            ctx.record_commit();
        }
        Ok(true)
    }

    fn list_by_prefix(&self, prefix: &str, branch: &str) -> Result<Vec<Document>> {
        self.ensure_open()?;
        let Some(state) = self.branches.get(branch) else {
            return Ok(Vec::new());
        };
        let mut docs: Vec<Document> = state
            .docs
            .iter()
            .filter(|(id, _)| id.starts_with(prefix))
            .map(|(_, doc)| doc.clone())
            .collect();
        docs.sort_by(|a, b| a.id().cmp(&b.id()));
        Ok(docs)
    }

    fn list_by_table(&self, table: &str, branch: &str) -> Result<Vec<Document>> {
        self.ensure_open()?;
        let Some(state) = self.branches.get(branch) else {
            return Ok(Vec::new());
        };
        let mut docs: Vec<Document> = state
            .docs
            .values()
            .filter(|doc| doc.table() == Some(table))
            .cloned()
            .collect();
        docs.sort_by(|a, b| a.id().cmp(&b.id()));
        Ok(docs)
    }

    fn get_history(&self, id: &str, branch: &str) -> Result<Vec<HistoryEntry>> {
        self.ensure_open()?;
        let Some(state) = self.branches.get(branch) else {
            return Ok(Vec::new());
        };
        Ok(state
            .commits
            .iter()
            .rev()
            .filter(|commit| commit.document_id == id)
            .map(|commit| HistoryEntry {
                commit_id: commit.id.clone(),
                commit_time: commit.time,
                commit_message: commit.message.clone(),
                committer_name: COMMITTER_NAME.to_string(),
                committer_email: COMMITTER_EMAIL.to_string(),
                document: commit.document.clone(),
            })
            .collect())
    }

    fn get_at(&self, id: &str, commit: &str) -> Result<Option<Document>> {
        self.ensure_open()?;
        for state in self.branches.iter() {
            if let Some(found) = state
                .commits
                .iter()
                .find(|c| c.id == commit && c.document_id == id)
            {
                return Ok(found.document.clone());
            }
        }
        Err(Error::NotFound(format!("commit {commit}")))
    }

    fn restore(
        &self,
        id: &str,
        commit: &str,
        branch: &str,
        tx: Option<&TransactionContext>,
    ) -> Result<Document> {
        self.ensure_open()?;
        let doc = self
            .get_at(id, commit)?
            .ok_or_else(|| Error::NotFound(format!("document {id} at commit {commit}")))?;
        self.record(
            branch,
            format!("Restore document {id} to version {commit}"),
            id,
            Some(doc.clone()),
        );
        if let Some(ctx) = tx {
            ctx.record_commit();
        }
        Ok(doc)
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let mut names: Vec<String> = self.branches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    fn create_branch(&self, name: &str, from: &str) -> Result<()> {
        self.ensure_open()?;
        let source = self
            .branches
            .get(from)
            .map(|state| state.clone())
            .ok_or_else(|| Error::NotFound(format!("branch {from}")))?;
        self.branches.insert(name.to_string(), source);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, value: i64) -> Document {
        let mut d = Document::new();
        d.set("id", json!(id));
        d.set("value", json!(value));
        d
    }

    #[test]
    fn test_save_get_delete() {
        let storage = InMemoryStorage::new();
        storage.save(doc("user:1", 1), "main", None).unwrap();
        assert!(storage.get("user:1", "main").unwrap().is_some());
        assert!(storage.delete("user:1", "main", None).unwrap());
        assert!(!storage.delete("user:1", "main", None).unwrap());
        assert!(storage.get("user:1", "main").unwrap().is_none());
    }

    #[test]
    fn test_history_and_restore() {
        let storage = InMemoryStorage::new();
        storage.save(doc("abc", 123), "main", None).unwrap();
        storage.save(doc("abc", 1234), "main", None).unwrap();

        let history = storage.get_history("abc", "main").unwrap();
        assert_eq!(history.len(), 2);
        let first = history[1].commit_id.clone();

        let restored = storage.restore("abc", &first, "main", None).unwrap();
        assert_eq!(restored.get("value"), Some(&json!(123)));
        assert_eq!(storage.get_history("abc", "main").unwrap().len(), 3);
    }

    #[test]
    fn test_branch_isolation() {
        let storage = InMemoryStorage::new();
        storage.save(doc("x", 1), "main", None).unwrap();
        storage.save(doc("x", 2), "dev", None).unwrap();
        assert_eq!(
            storage.get("x", "main").unwrap().unwrap().get("value"),
            Some(&json!(1))
        );
        assert_eq!(
            storage.get("x", "dev").unwrap().unwrap().get("value"),
            Some(&json!(2))
        );
    }

    #[test]
    fn test_table_listing() {
        let storage = InMemoryStorage::new();
        storage.save(doc("user:1", 1), "main", None).unwrap();
        storage.save(doc("order:1", 1), "main", None).unwrap();
        let users = storage.list_by_table("user", "main").unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id(), Some("user:1"));
    }
}
