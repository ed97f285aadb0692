//! Chronicle: a chronological document database on a bare Git repository
//!
//! Documents are schemaless JSON keyed by `table:id` identifiers. Every
//! mutation becomes a commit on a named branch, produced without a working
//! tree; every historical version stays reachable by walking commit
//! history. Durability comes from a write-ahead log, consistency from
//! per-branch writer serialisation with optimistic concurrency control, and
//! search from an accent-folding inverted index kept in step with storage.
//!
//! ```no_run
//! use chronicledb::{Database, DatabaseConfig};
//!
//! # fn main() -> chronicledb::Result<()> {
//! let config = DatabaseConfig::new("/var/lib/chronicle/db", "/var/lib/chronicle/idx");
//! let db = Database::open(config)?;
//!
//! db.put("user:1", r#"{"name":"Alice"}"#, None, None)?;
//! let doc = db.get("user:1", None)?.expect("just stored");
//! assert_eq!(doc.get("name").and_then(|v| v.as_str()), Some("Alice"));
//!
//! for version in db.history("user:1", None)? {
//!     println!("{} {}", version.commit_id, version.commit_message);
//! }
//! db.close()?;
//! # Ok(())
//! # }
//! ```

pub use chronicle_core::{
    CommitMeta, DatabaseConfig, Document, DocumentId, Error, NotePayload, Result, Transaction,
    TransactionContext, TransactionOptions, TxStatus, DATA_PREFIX, ID_FIELD, NOTES_REF,
    TABLE_FIELD,
};

pub use chronicle_storage::{GitStorage, HistoryEntry, InMemoryStorage, Storage};

pub use chronicle_durability::{FileWal, RecoveryAction, WalEntry, WalOperation, WalState};

pub use chronicle_concurrency::{with_occ_retry, BranchLocks, RetryConfig, VersionTracker};

pub use chronicle_search::{
    Index, InvertedIndex, Query, QueryCache, QueryOptions, RangeBound, Sort, SortOrder,
};

pub use chronicle_engine::{Database, DurableStorage, RecoveryReport};
