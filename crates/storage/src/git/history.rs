//! History traversal and time travel
//!
//! History walks commits reachable from the branch tip in commit-time order
//! and keeps those whose tree differs from their parent's at the document's
//! canonical path. Because documents are only ever stored at the canonical
//! path derived from their identifier, deleted documents retain browsable
//! history: the walk runs from the constructed path whether or not the
//! current tree still contains it.

use super::{git_err, GitStorage};
use crate::path;
use crate::traits::HistoryEntry;
use chronicle_core::{Document, DocumentId, Error, Result};
use chrono::{DateTime, Utc};
use std::path::Path;

impl GitStorage {
    pub(crate) fn history_inner(&self, id: &str, branch: &str) -> Result<Vec<HistoryEntry>> {
        self.ensure_open()?;
        let doc_id = DocumentId::parse(id)?;
        let tree_path_str = path::doc_path(&doc_id);
        let tree_path = Path::new(&tree_path_str);

        let repo = self.repo.lock();
        let head = match Self::resolve_branch(&repo, branch)? {
            Some(commit) => commit,
            None => return Ok(Vec::new()),
        };

        let mut walk = repo.revwalk().map_err(git_err)?;
        walk.push(head.id()).map_err(git_err)?;
        walk.set_sorting(git2::Sort::TIME).map_err(git_err)?;

        let mut entries = Vec::new();
        for oid in walk {
            let oid = oid.map_err(git_err)?;
            let commit = repo.find_commit(oid).map_err(git_err)?;
            let tree = commit.tree().map_err(git_err)?;
            let current = tree.get_path(tree_path).ok().map(|e| e.id());
            let previous = match commit.parent(0) {
                Ok(parent) => parent
                    .tree()
                    .map_err(git_err)?
                    .get_path(tree_path)
                    .ok()
                    .map(|e| e.id()),
                Err(_) => None,
            };
            if current == previous {
                continue;
            }
            let document = match current {
                Some(_) => Self::read_doc_at(&repo, &tree, &tree_path_str)?,
                None => None,
            };
            let committer = commit.committer();
            entries.push(HistoryEntry {
                commit_id: oid.to_string(),
                commit_time: commit_time(&commit),
                commit_message: commit.message().unwrap_or_default().trim_end().to_string(),
                committer_name: committer.name().unwrap_or_default().to_string(),
                committer_email: committer.email().unwrap_or_default().to_string(),
                document,
            });
        }
        Ok(entries)
    }

    pub(crate) fn get_at_inner(&self, id: &str, commit: &str) -> Result<Option<Document>> {
        self.ensure_open()?;
        let doc_id = DocumentId::parse(id)?;
        let oid = git2::Oid::from_str(commit)
            .map_err(|_| Error::ParseError(format!("invalid commit id: {commit}")))?;
        let repo = self.repo.lock();
        let commit = match repo.find_commit(oid) {
            Ok(commit) => commit,
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                return Err(Error::NotFound(format!("commit {oid}")))
            }
            Err(e) => return Err(git_err(e)),
        };
        let tree = commit.tree().map_err(git_err)?;
        Self::read_doc_at(&repo, &tree, &path::doc_path(&doc_id))
    }
}

fn commit_time(commit: &git2::Commit<'_>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(commit.time().seconds(), 0)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
