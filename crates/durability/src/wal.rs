//! File-backed WAL
//!
//! One `<uuid>.wal` file per entry. Appends open-create-truncate-write-fsync;
//! state transitions rewrite the whole file and fsync again. The directory is
//! exclusive to a single process.

use crate::entry::{WalEntry, WalState};
use chronicle_core::{Error, Result};
use chrono::Utc;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;
use uuid::Uuid;

const WAL_EXT: &str = "wal";

/// Append-only log of intended mutations, one file per entry.
pub struct FileWal {
    dir: PathBuf,
    closed: AtomicBool,
}

impl FileWal {
    /// Open (creating if needed) the WAL directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(FileWal {
            dir,
            closed: AtomicBool::new(false),
        })
    }

    /// The WAL directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::RepositoryClosed);
        }
        Ok(())
    }

    fn entry_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.{WAL_EXT}"))
    }

    fn write_entry(&self, entry: &WalEntry) -> Result<()> {
        let bytes = serde_json::to_vec(entry)?;
        let path = self.entry_path(entry.id);
        let mut file =
            File::create(&path).map_err(|e| Error::WalWriteFailed(format!("{}: {e}", path.display())))?;
        file.write_all(&bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| Error::WalWriteFailed(format!("{}: {e}", path.display())))?;
        Ok(())
    }

    fn read_entry(&self, path: &Path) -> Result<WalEntry> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::WalParseError(format!("{}: {e}", path.display())))
    }

    /// Record an intended mutation. The entry is durable when this returns.
    pub fn append(&self, entry: WalEntry) -> Result<Uuid> {
        self.ensure_open()?;
        let id = entry.id;
        self.write_entry(&entry)?;
        Ok(id)
    }

    /// Advance an entry to `state`, rewriting and fsyncing its file.
    pub fn mark_state(&self, id: Uuid, state: WalState) -> Result<WalEntry> {
        self.ensure_open()?;
        let path = self.entry_path(id);
        if !path.exists() {
            return Err(Error::NotFound(format!("WAL entry {id}")));
        }
        let mut entry = self.read_entry(&path)?;
        entry.state = state;
        entry.updated_at = Utc::now();
        self.write_entry(&entry)?;
        Ok(entry)
    }

    /// Fetch one entry by id
    pub fn get(&self, id: Uuid) -> Result<Option<WalEntry>> {
        self.ensure_open()?;
        let path = self.entry_path(id);
        if !path.exists() {
            return Ok(None);
        }
        self.read_entry(&path).map(Some)
    }

    /// All entries not in a terminal state, ordered by intent timestamp.
    ///
    /// Unparsable files (torn writes) are skipped with a warning; they are
    /// removed by [`truncate`](Self::truncate). An entry that never parsed
    /// cannot have advanced any ref, so skipping is the rolled-back outcome.
    pub fn pending(&self) -> Result<Vec<WalEntry>> {
        self.ensure_open()?;
        let mut entries = Vec::new();
        for path in self.entry_files()? {
            match self.read_entry(&path) {
                Ok(entry) if !entry.is_terminal() => entries.push(entry),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "corrupt WAL entry"),
            }
        }
        entries.sort_by_key(|entry| entry.timestamp);
        Ok(entries)
    }

    /// Delete all entries in terminal states (and corrupt files). Returns
    /// how many files were removed.
    pub fn truncate(&self) -> Result<usize> {
        self.ensure_open()?;
        let mut removed = 0;
        for path in self.entry_files()? {
            let deletable = match self.read_entry(&path) {
                Ok(entry) => entry.is_terminal(),
                Err(_) => true,
            };
            if deletable {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Release the handle
    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dirent in fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            if path.extension().is_some_and(|ext| ext == WAL_EXT) {
                files.push(path);
            }
        }
        Ok(files)
    }
}
