//! Core types for Chronicle
//!
//! This crate defines the foundational types used throughout the system:
//! - Document: schemaless JSON document keyed by a `table:id` identifier
//! - DocumentId: identifier parsing (`table` prefix split on the first `:`)
//! - Error: error type hierarchy
//! - DatabaseConfig: immutable configuration passed into constructors
//! - Transaction context: metadata describing the active logical transaction,
//!   projected onto Git notes one payload per commit

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod document;
pub mod error;
pub mod tx;

pub use config::{DatabaseConfig, DATA_PREFIX, NOTES_REF};
pub use document::{Document, DocumentId, ID_FIELD, TABLE_FIELD};
pub use error::{Error, Result};
pub use tx::{
    CommitMeta, NotePayload, Transaction, TransactionContext, TransactionOptions, TxStatus,
};
