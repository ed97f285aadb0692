//! Git object engine
//!
//! Commits are *virtual*: document bytes go straight into the object
//! database, the new tree is assembled through an in-memory index loaded
//! from the current head, and the branch ref is advanced with
//! compare-and-swap semantics. No working tree is ever materialised.
//!
//! ## Commit sequence
//!
//! ```text
//! 1. Resolve head = refs/heads/<branch> (absent ref -> no parent)
//! 2. Insert blob, overlay the in-memory index, write the tree
//! 3. Create the commit object without touching any ref
//! 4. CAS-advance refs/heads/<branch>; a ref moved by a concurrent
//!    writer fails with RefUpdateRejected (the OCC layer retries)
//! 5. Attach the transaction note; on failure restore the prior ref
//!    value and fail the mutation (the commit object dangles until GC)
//! 6. Optionally push the branch to origin (failure logged, never fatal)
//! ```

mod history;

use crate::notes;
use crate::path;
use crate::traits::{HistoryEntry, Storage};
use chronicle_core::{
    CommitMeta, DatabaseConfig, Document, DocumentId, Error, Result, TransactionContext,
};
use chrono::Utc;
use git2::{Oid, Repository, Signature};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Locks older than this are considered stale leftovers of a crashed process
const STALE_LOCK_AGE: Duration = Duration::from_secs(60);

pub(crate) fn git_err(e: git2::Error) -> Error {
    Error::Git(e.message().to_string())
}

/// Storage backend over a bare Git repository.
///
/// The repository handle lives behind a mutex (libgit2 handles are not
/// `Sync`); writers additionally serialise per branch one layer up, in the
/// durable composite.
pub struct GitStorage {
    repo: Mutex<Repository>,
    config: DatabaseConfig,
    closed: AtomicBool,
}

impl GitStorage {
    /// Open the repository at `config.data_dir`, initialising a bare
    /// repository with an initial empty commit on the default branch when
    /// none exists. Stale ref locks from a crashed process are removed.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let exists = config.data_dir.join("HEAD").exists();
        let repo = if exists {
            Repository::open(&config.data_dir).map_err(git_err)?
        } else {
            std::fs::create_dir_all(&config.data_dir)?;
            let mut opts = git2::RepositoryInitOptions::new();
            opts.bare(true);
            opts.initial_head(&config.default_branch);
            Repository::init_opts(&config.data_dir, &opts).map_err(git_err)?
        };

        remove_stale_locks(repo.path());

        // Signing would break virtual commits; keep it off at the repo level
        let mut git_config = repo.config().map_err(git_err)?;
        git_config
            .set_bool("commit.gpgsign", false)
            .map_err(git_err)?;

        let storage = GitStorage {
            repo: Mutex::new(repo),
            config,
            closed: AtomicBool::new(false),
        };
        storage.ensure_initial_commit()?;
        Ok(storage)
    }

    /// The configuration this engine honours
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::RepositoryClosed);
        }
        Ok(())
    }

    fn signature(&self) -> Result<Signature<'static>> {
        let time = git2::Time::new(Utc::now().timestamp(), 0);
        Signature::new(
            &self.config.committer_name,
            &self.config.committer_email,
            &time,
        )
        .map_err(git_err)
    }

    fn resolve_branch<'r>(
        repo: &'r Repository,
        branch: &str,
    ) -> Result<Option<git2::Commit<'r>>> {
        match repo.find_reference(&format!("refs/heads/{branch}")) {
            Ok(reference) => Ok(Some(reference.peel_to_commit().map_err(git_err)?)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(git_err(e)),
        }
    }

    fn ensure_initial_commit(&self) -> Result<()> {
        let repo = self.repo.lock();
        if Self::resolve_branch(&repo, &self.config.default_branch)?.is_some() {
            return Ok(());
        }
        let tree_id = {
            let mut index = git2::Index::new().map_err(git_err)?;
            index.write_tree_to(&repo).map_err(git_err)?
        };
        let tree = repo.find_tree(tree_id).map_err(git_err)?;
        let sig = self.signature()?;
        let refname = format!("refs/heads/{}", self.config.default_branch);
        repo.commit(Some(&refname), &sig, &sig, "Initial empty commit", &tree, &[])
            .map_err(git_err)?;
        debug!(branch = %self.config.default_branch, "created initial empty commit");
        Ok(())
    }

    /// Apply one document change as a virtual commit on `branch`.
    ///
    /// `content` is the new document bytes, or `None` to remove `tree_path`.
    #[allow(clippy::too_many_arguments)]
    fn commit_change(
        &self,
        repo: &Repository,
        branch: &str,
        tree_path: &str,
        content: Option<&[u8]>,
        message: &str,
        document_id: &str,
        operation: &str,
        tx: Option<&TransactionContext>,
        extra_flags: &[&str],
    ) -> Result<Oid> {
        path::validate_path(tree_path)?;
        let head = Self::resolve_branch(repo, branch)?;

        // Overlay the change on an in-memory index seeded from head's tree
        let mut index = git2::Index::new().map_err(git_err)?;
        if let Some(head_commit) = &head {
            index
                .read_tree(&head_commit.tree().map_err(git_err)?)
                .map_err(git_err)?;
        }
        match content {
            Some(bytes) => {
                let blob_id = repo.blob(bytes).map_err(git_err)?;
                let entry = git2::IndexEntry {
                    ctime: git2::IndexTime::new(0, 0),
                    mtime: git2::IndexTime::new(0, 0),
                    dev: 0,
                    ino: 0,
                    mode: 0o100644,
                    uid: 0,
                    gid: 0,
                    file_size: bytes.len() as u32,
                    id: blob_id,
                    flags: 0,
                    flags_extended: 0,
                    path: tree_path.as_bytes().to_vec(),
                };
                index.add(&entry).map_err(git_err)?;
            }
            None => {
                index.remove(Path::new(tree_path), 0).map_err(git_err)?;
            }
        }
        let tree_id = index.write_tree_to(repo).map_err(git_err)?;
        let tree = repo.find_tree(tree_id).map_err(git_err)?;

        let sig = self.signature()?;
        let parents: Vec<&git2::Commit> = head.iter().collect();
        let commit_id = repo
            .commit(None, &sig, &sig, message, &tree, &parents)
            .map_err(git_err)?;

        // CAS ref update: the expected old value is the head we built on
        let refname = format!("refs/heads/{branch}");
        let expected = head.as_ref().map(|c| c.id());
        let current = repo
            .find_reference(&refname)
            .ok()
            .and_then(|r| r.target());
        if current != expected {
            return Err(Error::RefUpdateRejected {
                branch: branch.to_string(),
                expected: oid_display(expected),
                actual: oid_display(current),
            });
        }
        repo.reference(&refname, commit_id, true, message)
            .map_err(git_err)?;

        // Note attachment is part of the mutation: failure abandons the
        // commit by restoring the prior ref value.
        let fallback;
        let ctx = match tx {
            Some(ctx) => ctx,
            None => {
                fallback = TransactionContext::unknown();
                &fallback
            }
        };
        let commit_hex = commit_id.to_string();
        let mut payload = ctx.to_note(&CommitMeta {
            commit_id: &commit_hex,
            commit_message: message,
            branch,
            path: tree_path,
            document_id,
            operation,
        });
        for flag in extra_flags {
            if !payload.flags.iter().any(|f| f == flag) {
                payload.flags.push((*flag).to_string());
            }
        }
        if let Err(e) = notes::write_note(repo, &sig, commit_id, payload) {
            match expected {
                Some(old) => {
                    let _ = repo.reference(&refname, old, true, "abandon commit: note failed");
                }
                None => {
                    if let Ok(mut reference) = repo.find_reference(&refname) {
                        let _ = reference.delete();
                    }
                }
            }
            return Err(e);
        }

        ctx.record_commit();
        debug!(branch, path = tree_path, commit = %commit_hex, operation, "virtual commit");

        if self.config.push_on_commit {
            self.push_branch(repo, branch);
        }
        Ok(commit_id)
    }

    fn push_branch(&self, repo: &Repository, branch: &str) {
        let mut remote = match repo.find_remote("origin") {
            Ok(remote) => remote,
            Err(_) => return,
        };
        let refspec = format!("+refs/heads/{branch}:refs/heads/{branch}");
        if let Err(e) = remote.push(&[refspec.as_str()], None) {
            warn!(branch, error = %e.message(), "push to origin failed");
        }
    }

    fn read_doc_at(
        repo: &Repository,
        tree: &git2::Tree<'_>,
        tree_path: &str,
    ) -> Result<Option<Document>> {
        let entry = match tree.get_path(Path::new(tree_path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(git_err(e)),
        };
        let object = entry.to_object(repo).map_err(git_err)?;
        let blob = object
            .as_blob()
            .ok_or_else(|| Error::ParseError(format!("{tree_path} is not a blob")))?;
        let value: serde_json::Value = serde_json::from_slice(blob.content())?;
        let mut doc = Document::from_value(value)?;
        doc.ensure_table();
        Ok(Some(doc))
    }

    fn collect_docs(
        repo: &Repository,
        tree: &git2::Tree<'_>,
        path_prefix: &str,
    ) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(git2::ObjectType::Blob) {
                let full = format!("{root}{}", entry.name().unwrap_or_default());
                if full.starts_with(path_prefix) && full.ends_with(".json") {
                    match Self::read_doc_at(repo, tree, &full) {
                        Ok(Some(doc)) => docs.push(doc),
                        Ok(None) => {}
                        Err(e) => warn!(path = %full, error = %e, "skipping unreadable document"),
                    }
                }
            }
            git2::TreeWalkResult::Ok
        })
        .map_err(git_err)?;
        Ok(docs)
    }

    fn list_at(&self, branch: &str, path_prefix: &str) -> Result<Vec<Document>> {
        self.ensure_open()?;
        let repo = self.repo.lock();
        let head = match Self::resolve_branch(&repo, branch)? {
            Some(commit) => commit,
            None => return Ok(Vec::new()),
        };
        let tree = head.tree().map_err(git_err)?;
        Self::collect_docs(&repo, &tree, path_prefix)
    }
}

fn oid_display(oid: Option<Oid>) -> String {
    oid.unwrap_or_else(Oid::zero).to_string()
}

/// Remove `*.lock` files older than [`STALE_LOCK_AGE`] under `dir`.
///
/// Crashed processes can leave ref locks behind; anything old enough cannot
/// belong to a live writer since the WAL directory is single-process.
pub fn remove_stale_locks(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            remove_stale_locks(&path);
            continue;
        }
        if path.extension().is_some_and(|ext| ext == "lock") {
            let stale = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.elapsed().ok())
                .is_some_and(|age| age > STALE_LOCK_AGE);
            if stale {
                warn!(path = %path.display(), "removing stale lock file");
                let _ = std::fs::remove_file(&path);
            }
        }
    }
}

impl Storage for GitStorage {
    fn save(
        &self,
        mut doc: Document,
        branch: &str,
        tx: Option<&TransactionContext>,
    ) -> Result<Document> {
        self.ensure_open()?;
        doc.validate()?;
        doc.ensure_table();
        let doc_id = doc.doc_id()?;
        let tree_path = path::doc_path(&doc_id);
        let content = serde_json::to_vec(&doc)?;
        let message = format!("Save document {doc_id}");
        let repo = self.repo.lock();
        self.commit_change(
            &repo,
            branch,
            &tree_path,
            Some(&content),
            &message,
            doc_id.as_str(),
            "save",
            tx,
            &[],
        )?;
        Ok(doc)
    }

    fn get(&self, id: &str, branch: &str) -> Result<Option<Document>> {
        self.ensure_open()?;
        let doc_id = DocumentId::parse(id)?;
        let repo = self.repo.lock();
        let head = match Self::resolve_branch(&repo, branch)? {
            Some(commit) => commit,
            None => return Ok(None),
        };
        let tree = head.tree().map_err(git_err)?;
        Self::read_doc_at(&repo, &tree, &path::doc_path(&doc_id))
    }

    fn delete(&self, id: &str, branch: &str, tx: Option<&TransactionContext>) -> Result<bool> {
        self.ensure_open()?;
        let doc_id = DocumentId::parse(id)?;
        let tree_path = path::doc_path(&doc_id);
        let repo = self.repo.lock();
        let exists = match Self::resolve_branch(&repo, branch)? {
            Some(head) => head
                .tree()
                .map_err(git_err)?
                .get_path(Path::new(&tree_path))
                .is_ok(),
            None => false,
        };
        if !exists {
            return Ok(false);
        }
        let message = format!("Delete document {doc_id}");
        self.commit_change(
            &repo, branch, &tree_path, None, &message, id, "delete", tx, &[],
        )?;
        Ok(true)
    }

    fn list_by_prefix(&self, prefix: &str, branch: &str) -> Result<Vec<Document>> {
        self.list_at(branch, &path::prefix_path(prefix))
    }

    fn list_by_table(&self, table: &str, branch: &str) -> Result<Vec<Document>> {
        self.list_at(branch, &path::table_path(table))
    }

    fn get_history(&self, id: &str, branch: &str) -> Result<Vec<HistoryEntry>> {
        self.history_inner(id, branch)
    }

    fn get_at(&self, id: &str, commit: &str) -> Result<Option<Document>> {
        self.get_at_inner(id, commit)
    }

    fn restore(
        &self,
        id: &str,
        commit: &str,
        branch: &str,
        tx: Option<&TransactionContext>,
    ) -> Result<Document> {
        self.ensure_open()?;
        let mut doc = self
            .get_at_inner(id, commit)?
            .ok_or_else(|| Error::NotFound(format!("document {id} at commit {commit}")))?;
        doc.ensure_table();
        let doc_id = doc.doc_id()?;
        let tree_path = path::doc_path(&doc_id);
        let content = serde_json::to_vec(&doc)?;
        let message = format!("Restore document {id} to version {commit}");
        let repo = self.repo.lock();
        self.commit_change(
            &repo,
            branch,
            &tree_path,
            Some(&content),
            &message,
            id,
            "save",
            tx,
            &["rollback"],
        )?;
        Ok(doc)
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let repo = self.repo.lock();
        let mut names = Vec::new();
        for branch in repo
            .branches(Some(git2::BranchType::Local))
            .map_err(git_err)?
        {
            let (branch, _) = branch.map_err(git_err)?;
            if let Some(name) = branch.name().map_err(git_err)? {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn create_branch(&self, name: &str, from: &str) -> Result<()> {
        self.ensure_open()?;
        let repo = self.repo.lock();
        let head = Self::resolve_branch(&repo, from)?
            .ok_or_else(|| Error::NotFound(format!("branch {from}")))?;
        repo.reference(
            &format!("refs/heads/{name}"),
            head.id(),
            false,
            &format!("Create branch {name}"),
        )
        .map_err(git_err)?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
