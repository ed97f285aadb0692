//! WAL entry model

use chronicle_core::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mutation kind recorded in an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalOperation {
    /// Create or overwrite a document
    Save,
    /// Remove a document
    Delete,
}

/// Per-entry pipeline state.
///
/// `Completed` and `RolledBack` are terminal; everything else is resolved by
/// recovery after a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WalState {
    /// Intent recorded, no side effect yet
    Pending,
    /// The Git ref has advanced
    GitCommitted,
    /// The index reflects the mutation
    IndexCommitted,
    /// Pipeline finished
    Completed,
    /// Mutation failed or was abandoned by recovery
    RolledBack,
}

impl WalState {
    /// Terminal states are candidates for truncation
    pub fn is_terminal(self) -> bool {
        matches!(self, WalState::Completed | WalState::RolledBack)
    }
}

/// One intended mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    /// Entry identifier; also the file name stem
    pub id: Uuid,
    /// Intent timestamp, orders recovery
    pub timestamp: DateTime<Utc>,
    /// Mutation kind
    pub operation: WalOperation,
    /// Target document identifier
    pub document_id: String,
    /// Target branch
    pub branch: String,
    /// Table of the document, when it has one
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub table: Option<String>,
    /// Document content for saves; absent for deletes
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<serde_json::Value>,
    /// Pipeline state
    pub state: WalState,
    /// When the entry was appended
    pub created_at: DateTime<Utc>,
    /// Last state transition
    pub updated_at: DateTime<Utc>,
}

impl WalEntry {
    /// Entry recording an intended save
    pub fn save(doc: &Document, branch: &str) -> Self {
        let now = Utc::now();
        WalEntry {
            id: Uuid::new_v4(),
            timestamp: now,
            operation: WalOperation::Save,
            document_id: doc.id().unwrap_or_default().to_string(),
            branch: branch.to_string(),
            table: doc.table().map(str::to_string),
            content: Some(doc.to_value()),
            state: WalState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Entry recording an intended delete
    pub fn delete(document_id: &str, branch: &str) -> Self {
        let now = Utc::now();
        WalEntry {
            id: Uuid::new_v4(),
            timestamp: now,
            operation: WalOperation::Delete,
            document_id: document_id.to_string(),
            branch: branch.to_string(),
            table: document_id
                .split_once(':')
                .map(|(table, _)| table.to_string())
                .filter(|t| !t.is_empty()),
            content: None,
            state: WalState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the entry is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
