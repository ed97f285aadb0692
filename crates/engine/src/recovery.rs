//! Startup recovery driver
//!
//! Executes the recovery plan over every unresolved WAL entry, in intent
//! order, then truncates terminal entries. Index re-application is
//! idempotent (saves overwrite by id, deleting an absent id is a no-op), so
//! running recovery repeatedly is safe.

use chronicle_core::{Document, Result};
use chronicle_durability::{plan, FileWal, RecoveryAction, WalOperation, WalState};
use chronicle_search::Index;
use tracing::{info, warn};

/// What the startup sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// `pending` entries conservatively rolled back
    pub rolled_back: usize,
    /// `git-committed` entries whose index update was re-applied
    pub reindexed: usize,
    /// `index-committed` entries marked completed
    pub completed: usize,
    /// Terminal entries removed by truncation
    pub truncated: usize,
}

/// Sweep the WAL and resolve every non-terminal entry.
pub fn run(wal: &FileWal, index: &dyn Index) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();
    for entry in wal.pending()? {
        match plan(&entry) {
            RecoveryAction::RollBack => {
                wal.mark_state(entry.id, WalState::RolledBack)?;
                report.rolled_back += 1;
            }
            RecoveryAction::ReapplyIndex => {
                match entry.operation {
                    WalOperation::Save => match entry.content.clone().map(Document::from_value) {
                        Some(Ok(doc)) => {
                            if let Err(e) = index.index(&doc, &entry.branch) {
                                warn!(id = %entry.document_id, error = %e, "recovery index update failed");
                            }
                        }
                        _ => warn!(id = %entry.document_id, "save entry without usable content"),
                    },
                    WalOperation::Delete => {
                        if let Err(e) = index.delete(&entry.document_id, &entry.branch) {
                            warn!(id = %entry.document_id, error = %e, "recovery index delete failed");
                        }
                    }
                }
                wal.mark_state(entry.id, WalState::Completed)?;
                report.reindexed += 1;
            }
            RecoveryAction::Complete => {
                wal.mark_state(entry.id, WalState::Completed)?;
                report.completed += 1;
            }
            // pending() never yields terminal entries; truncation below
            RecoveryAction::Truncate => {}
        }
    }
    report.truncated = wal.truncate()?;
    if report != RecoveryReport::default() {
        info!(
            rolled_back = report.rolled_back,
            reindexed = report.reindexed,
            completed = report.completed,
            truncated = report.truncated,
            "WAL recovery finished"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_durability::WalEntry;
    use chronicle_search::{InvertedIndex, Query, QueryOptions};
    use serde_json::json;

    fn setup() -> (tempfile::TempDir, FileWal, InvertedIndex) {
        let dir = tempfile::tempdir().unwrap();
        let wal = FileWal::open(dir.path().join("wal")).unwrap();
        (dir, wal, InvertedIndex::ephemeral())
    }

    fn entry(id: &str, state: WalState) -> WalEntry {
        let doc = Document::from_value(json!({"id": id, "name": "Alice"})).unwrap();
        let mut entry = WalEntry::save(&doc, "main");
        entry.state = state;
        entry
    }

    #[test]
    fn test_pending_entries_roll_back() {
        let (_dir, wal, index) = setup();
        let id = wal.append(entry("user:1", WalState::Pending)).unwrap();

        let report = run(&wal, &index).unwrap();
        assert_eq!(report.rolled_back, 1);
        // Rolled back this sweep, truncated by it as well
        assert_eq!(report.truncated, 1);
        assert!(wal.get(id).unwrap().is_none());
        // Nothing reached the index
        assert!(index
            .search_query(&Query::MatchAll, "main", &QueryOptions::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_git_committed_entries_reindex() {
        let (_dir, wal, index) = setup();
        wal.append(entry("user:1", WalState::GitCommitted)).unwrap();

        let report = run(&wal, &index).unwrap();
        assert_eq!(report.reindexed, 1);
        let ids = index
            .search_query(&Query::MatchAll, "main", &QueryOptions::default())
            .unwrap();
        assert_eq!(ids, vec!["user:1".to_string()]);
    }

    #[test]
    fn test_git_committed_delete_reapplies() {
        let (_dir, wal, index) = setup();
        let doc = Document::from_value(json!({"id": "user:1"})).unwrap();
        index.index(&doc, "main").unwrap();
        let mut del = WalEntry::delete("user:1", "main");
        del.state = WalState::GitCommitted;
        wal.append(del).unwrap();

        run(&wal, &index).unwrap();
        assert!(index
            .search_query(&Query::MatchAll, "main", &QueryOptions::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_index_committed_entries_complete() {
        let (_dir, wal, index) = setup();
        wal.append(entry("user:1", WalState::IndexCommitted))
            .unwrap();
        let report = run(&wal, &index).unwrap();
        assert_eq!(report.completed, 1);
        assert!(wal.pending().unwrap().is_empty());
    }

    #[test]
    fn test_recovery_is_idempotent() {
        let (_dir, wal, index) = setup();
        wal.append(entry("user:1", WalState::GitCommitted)).unwrap();
        wal.append(entry("user:2", WalState::Pending)).unwrap();

        let first = run(&wal, &index).unwrap();
        assert_eq!(first.reindexed, 1);
        assert_eq!(first.rolled_back, 1);

        let second = run(&wal, &index).unwrap();
        assert_eq!(second, RecoveryReport::default());
        let ids = index
            .search_query(&Query::MatchAll, "main", &QueryOptions::default())
            .unwrap();
        assert_eq!(ids, vec!["user:1".to_string()]);
    }
}
