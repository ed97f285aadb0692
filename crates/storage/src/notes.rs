//! Commit notes
//!
//! Notes are JSON payloads stored under `refs/notes/chrondb` against a commit
//! oid. A write merges with any payload already present: incoming string
//! fields override, flags are set-unioned, metadata merges field-wise with
//! the incoming side winning. Reads return `None` for absent or unparseable
//! notes (with a warning), so a commit left un-annotated by a crash degrades
//! gracefully and heals on the next write that touches it.

use chronicle_core::{Error, NotePayload, Result, NOTES_REF};
use git2::{Oid, Repository, Signature};
use tracing::warn;

/// Read the note payload attached to a commit, if any.
pub fn read_note(repo: &Repository, commit_id: Oid) -> Option<NotePayload> {
    let note = repo.find_note(Some(NOTES_REF), commit_id).ok()?;
    let message = note.message()?;
    match serde_json::from_str(message) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(commit = %commit_id, error = %e, "unparseable note payload");
            None
        }
    }
}

/// Attach a payload to a commit, merging over any existing note.
pub fn write_note(
    repo: &Repository,
    sig: &Signature<'_>,
    commit_id: Oid,
    payload: NotePayload,
) -> Result<()> {
    let merged = match read_note(repo, commit_id) {
        Some(existing) => payload.merge_over(existing),
        None => payload,
    };
    let json = serde_json::to_string(&merged)?;
    repo.note(sig, sig, Some(NOTES_REF), commit_id, &json, true)
        .map_err(|e| Error::NoteWriteFailed {
            commit_id: commit_id.to_string(),
            reason: e.message().to_string(),
        })?;
    Ok(())
}
