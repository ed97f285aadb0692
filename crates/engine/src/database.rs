//! Database handle
//!
//! Wires the Git engine, the WAL, the inverted index and the durable
//! composite together, runs recovery, and exposes the contract the protocol
//! servers consume: `put`/`get`/`delete`, prefix and table listings,
//! history and time travel, AST queries (with a transparent LRU+TTL result
//! cache), and a last-error slot for null-returning callers.
//!
//! The handle is a process-wide singleton with an explicit [`close`]; the
//! WAL directory is exclusive to one process.
//!
//! [`close`]: Database::close

use chronicle_core::{
    DatabaseConfig, Document, Error, Result, TransactionContext, TransactionOptions,
};
use chronicle_durability::FileWal;
use chronicle_search::{Index, InvertedIndex, Query, QueryCache, QueryOptions};
use chronicle_storage::{GitStorage, HistoryEntry, Storage};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use crate::durable::DurableStorage;
use crate::recovery::RecoveryReport;

/// Handle over one Chronicle database.
pub struct Database {
    config: DatabaseConfig,
    storage: Arc<DurableStorage>,
    index: Arc<InvertedIndex>,
    cache: QueryCache,
    last_error: Mutex<Option<String>>,
}

impl Database {
    /// Open (creating when absent) the database described by `config`.
    ///
    /// Initialises the bare repository, the WAL directory and the index,
    /// clears stale locks, and runs the recovery sweep before returning.
    pub fn open(config: DatabaseConfig) -> Result<Database> {
        config.validate()?;
        let git = Arc::new(GitStorage::open(config.clone())?);
        let wal = Arc::new(FileWal::open(config.wal_dir())?);
        let index = Arc::new(InvertedIndex::persistent(&config.index_dir)?);
        let storage = Arc::new(DurableStorage::new(git, wal, index.clone()));
        let report: RecoveryReport = storage.recover()?;
        info!(
            data_dir = %config.data_dir.display(),
            rolled_back = report.rolled_back,
            reindexed = report.reindexed,
            "database opened"
        );
        Ok(Database {
            config,
            storage,
            index,
            cache: QueryCache::with_defaults(),
            last_error: Mutex::new(None),
        })
    }

    /// The configuration this handle was opened with
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The durable storage composite (trait-level access)
    pub fn storage(&self) -> &Arc<DurableStorage> {
        &self.storage
    }

    fn branch<'a>(&'a self, branch: Option<&'a str>) -> &'a str {
        branch.unwrap_or(&self.config.default_branch)
    }

    fn record<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            *self.last_error.lock() = Some(e.to_string());
        }
        result
    }

    /// Last recorded error, cleared by this read
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().take()
    }

    /// Store a JSON document under `id`. The document may omit `id`; a
    /// mismatching embedded id is rejected.
    pub fn put(
        &self,
        id: &str,
        json_doc: &str,
        branch: Option<&str>,
        opts: Option<&TransactionOptions>,
    ) -> Result<Document> {
        let result = self.put_inner(id, json_doc, branch, opts);
        self.record(result)
    }

    fn put_inner(
        &self,
        id: &str,
        json_doc: &str,
        branch: Option<&str>,
        opts: Option<&TransactionOptions>,
    ) -> Result<Document> {
        let branch = self.branch(branch);
        let mut doc = Document::from_json(json_doc)?;
        match doc.id() {
            None => doc.set("id", serde_json::Value::String(id.to_string())),
            Some(embedded) if embedded != id => {
                return Err(Error::DocumentInvalid(format!(
                    "document id {embedded} does not match key {id}"
                )))
            }
            Some(_) => {}
        }
        let stored = match opts {
            Some(opts) => {
                let ctx = TransactionContext::new(opts);
                self.storage.save(doc, branch, Some(&ctx))?
            }
            None => self.storage.save(doc, branch, None)?,
        };
        self.cache.invalidate_branch(branch);
        Ok(stored)
    }

    /// Fetch a document
    pub fn get(&self, id: &str, branch: Option<&str>) -> Result<Option<Document>> {
        let result = self.storage.get(id, self.branch(branch));
        self.record(result)
    }

    /// Delete a document; `false` when it was absent
    pub fn delete(
        &self,
        id: &str,
        branch: Option<&str>,
        opts: Option<&TransactionOptions>,
    ) -> Result<bool> {
        let branch_name = self.branch(branch);
        let result = match opts {
            Some(opts) => {
                let ctx = TransactionContext::new(opts);
                self.storage.delete(id, branch_name, Some(&ctx))
            }
            None => self.storage.delete(id, branch_name, None),
        };
        if matches!(result, Ok(true)) {
            self.cache.invalidate_branch(branch_name);
        }
        self.record(result)
    }

    /// Documents whose id starts with `prefix`
    pub fn list_by_prefix(&self, prefix: &str, branch: Option<&str>) -> Result<Vec<Document>> {
        let result = self.storage.list_by_prefix(prefix, self.branch(branch));
        self.record(result)
    }

    /// Documents belonging to `table`
    pub fn list_by_table(&self, table: &str, branch: Option<&str>) -> Result<Vec<Document>> {
        let result = self.storage.list_by_table(table, self.branch(branch));
        self.record(result)
    }

    /// Versions of a document, newest first
    pub fn history(&self, id: &str, branch: Option<&str>) -> Result<Vec<HistoryEntry>> {
        let result = self.storage.get_history(id, self.branch(branch));
        self.record(result)
    }

    /// Document content at an arbitrary commit
    pub fn get_at(&self, id: &str, commit: &str) -> Result<Option<Document>> {
        let result = self.storage.get_at(id, commit);
        self.record(result)
    }

    /// Re-save the content a document had at `commit` as a new commit
    pub fn restore(
        &self,
        id: &str,
        commit: &str,
        branch: Option<&str>,
        opts: Option<&TransactionOptions>,
    ) -> Result<Document> {
        let branch_name = self.branch(branch);
        let result = match opts {
            Some(opts) => {
                let ctx = TransactionContext::new(opts);
                self.storage.restore(id, commit, branch_name, Some(&ctx))
            }
            None => self.storage.restore(id, commit, branch_name, None),
        };
        if result.is_ok() {
            self.cache.invalidate_branch(branch_name);
        }
        self.record(result)
    }

    /// Legacy field search; returns rehydrated documents
    pub fn search(
        &self,
        field: &str,
        query: &str,
        branch: Option<&str>,
    ) -> Result<Vec<Document>> {
        let branch = self.branch(branch);
        let result = self
            .index
            .search(field, query, branch)
            .and_then(|ids| self.rehydrate(&ids, branch));
        self.record(result)
    }

    /// Evaluate a clause AST given as JSON; returns rehydrated documents
    pub fn query(&self, ast: &serde_json::Value, branch: Option<&str>) -> Result<Vec<Document>> {
        self.query_with(ast, branch, &QueryOptions::default())
    }

    /// [`query`](Self::query) with explicit pagination/sort options
    pub fn query_with(
        &self,
        ast: &serde_json::Value,
        branch: Option<&str>,
        opts: &QueryOptions,
    ) -> Result<Vec<Document>> {
        let result = self.query_inner(ast, branch, opts);
        self.record(result)
    }

    fn query_inner(
        &self,
        ast: &serde_json::Value,
        branch: Option<&str>,
        opts: &QueryOptions,
    ) -> Result<Vec<Document>> {
        let branch = self.branch(branch);
        let query: Query = serde_json::from_value(ast.clone())
            .map_err(|e| Error::ParseError(format!("query AST: {e}")))?;
        let ids = match self.cache.get(&query, branch, opts) {
            Some(ids) => ids,
            None => {
                let ids = self.index.search_query(&query, branch, opts)?;
                self.cache.put(&query, branch, opts, ids.clone());
                ids
            }
        };
        self.rehydrate(&ids, branch)
    }

    fn rehydrate(&self, ids: &[String], branch: &str) -> Result<Vec<Document>> {
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = self.storage.get(id, branch)? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    /// Names of all branches
    pub fn list_branches(&self) -> Result<Vec<String>> {
        let result = self.storage.list_branches();
        self.record(result)
    }

    /// Create a branch pointing at the head of `from`
    pub fn create_branch(&self, name: &str, from: Option<&str>) -> Result<()> {
        let result = self.storage.create_branch(name, self.branch(from));
        self.record(result)
    }

    /// Close the handle: snapshot the index, close the WAL and the
    /// repository. Later calls fail with `RepositoryClosed`.
    pub fn close(&self) -> Result<()> {
        self.storage.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::new(dir.path().join("db"), dir.path().join("idx"));
        let db = Database::open(config).unwrap();
        (dir, db)
    }

    #[test]
    fn test_put_get_round_trip() {
        let (_dir, db) = open_db();
        db.put("user:1", r#"{"name":"Alice"}"#, None, None).unwrap();
        let doc = db.get("user:1", None).unwrap().unwrap();
        assert_eq!(doc.id(), Some("user:1"));
        assert_eq!(doc.get("name"), Some(&json!("Alice")));
        assert_eq!(doc.get("_table"), Some(&json!("user")));
    }

    #[test]
    fn test_put_rejects_mismatched_id() {
        let (_dir, db) = open_db();
        let err = db
            .put("user:1", r#"{"id":"user:2"}"#, None, None)
            .unwrap_err();
        assert!(matches!(err, Error::DocumentInvalid(_)));
        // The failure landed in the last-error slot, which clears on read
        assert!(db.last_error().unwrap().contains("user:2"));
        assert!(db.last_error().is_none());
    }

    #[test]
    fn test_query_returns_documents() {
        let (_dir, db) = open_db();
        db.put("user:1", r#"{"name":"Alice"}"#, None, None).unwrap();
        db.put("user:2", r#"{"name":"Bob"}"#, None, None).unwrap();

        let docs = db
            .query(&json!({"type": "term", "field": "name", "value": "Alice"}), None)
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id(), Some("user:1"));
    }

    #[test]
    fn test_query_cache_invalidated_by_put() {
        let (_dir, db) = open_db();
        let ast = json!({"type": "match_all"});
        db.put("user:1", r#"{"name":"Alice"}"#, None, None).unwrap();
        assert_eq!(db.query(&ast, None).unwrap().len(), 1);
        // A second writer on the same branch must be visible immediately
        db.put("user:2", r#"{"name":"Bob"}"#, None, None).unwrap();
        assert_eq!(db.query(&ast, None).unwrap().len(), 2);
        db.delete("user:1", None, None).unwrap();
        assert_eq!(db.query(&ast, None).unwrap().len(), 1);
    }

    #[test]
    fn test_query_rejects_malformed_ast() {
        let (_dir, db) = open_db();
        let err = db.query(&json!({"type": "no_such_clause"}), None).unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }

    #[test]
    fn test_transaction_options_flow_into_notes() {
        let (_dir, db) = open_db();
        let opts = TransactionOptions::with_origin("rest").user("alice");
        db.put("user:1", r#"{"name":"Alice"}"#, None, Some(&opts))
            .unwrap();
        let history = db.history("user:1", None).unwrap();
        assert_eq!(history.len(), 1);
        // The note is attached under refs/notes/chrondb; origin comes from
        // the options rather than the "unknown" fallback
        let repo = git2::Repository::open(db.config().data_dir.clone()).unwrap();
        let oid = git2::Oid::from_str(&history[0].commit_id).unwrap();
        let note = repo
            .find_note(Some(chronicle_core::NOTES_REF), oid)
            .unwrap();
        let payload: serde_json::Value =
            serde_json::from_str(note.message().unwrap()).unwrap();
        assert_eq!(payload["origin"], "rest");
        assert_eq!(payload["user"], "alice");
    }

    #[test]
    fn test_default_branch_override() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::new(dir.path().join("db"), dir.path().join("idx"))
            .with_default_branch("trunk");
        let db = Database::open(config).unwrap();
        db.put("x", r#"{"v":1}"#, None, None).unwrap();
        assert!(db.get("x", Some("trunk")).unwrap().is_some());
        assert!(db.get("x", Some("main")).unwrap().is_none());
    }

    #[test]
    fn test_close_then_error() {
        let (_dir, db) = open_db();
        db.close().unwrap();
        assert!(matches!(db.get("x", None), Err(Error::RepositoryClosed)));
    }

    #[test]
    fn test_reopen_recovers_index_from_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::new(dir.path().join("db"), dir.path().join("idx"));
        {
            let db = Database::open(config.clone()).unwrap();
            db.put("user:1", r#"{"name":"Alice"}"#, None, None).unwrap();
            db.close().unwrap();
        }
        let db = Database::open(config).unwrap();
        let docs = db
            .query(&json!({"type": "term", "field": "name", "value": "Alice"}), None)
            .unwrap();
        assert_eq!(docs.len(), 1);
    }
}
