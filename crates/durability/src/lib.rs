//! Write-ahead log for Chronicle
//!
//! Every mutation records its intent in the WAL before any side effect, then
//! advances the entry through `pending -> git-committed -> index-committed ->
//! completed` as the pipeline progresses (`rolled-back` terminates failed
//! mutations). Recovery at startup resolves whatever states a crash left
//! behind.
//!
//! The log is a directory of one self-describing JSON file per entry
//! (`<uuid>.wal`); appends and state transitions rewrite the whole file and
//! fsync, so a torn write surfaces as an unparsable file rather than a
//! half-applied state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entry;
pub mod recovery;
pub mod wal;

pub use entry::{WalEntry, WalOperation, WalState};
pub use recovery::{plan, RecoveryAction};
pub use wal::FileWal;
