//! Transaction context and note payloads
//!
//! A transaction is a scoped acquisition: [`Transaction::run`] builds a
//! context from the caller's options, invokes the body with a reference to
//! it, and transitions the context to `committed` (or `rolled-back`, adding
//! the `rollback` flag) when the scope exits. Every commit produced while the
//! context is active emits one note payload via [`TransactionContext::to_note`].
//!
//! Contexts are passed explicitly: mutation entry points accept
//! `Option<&TransactionContext>` and thread it down to the Git engine. A
//! commit made with no active context emits a note from a freshly minted
//! context with `origin = "unknown"`.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Lifecycle state of a transaction context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TxStatus {
    /// Scope is live; commits are being produced
    Active,
    /// Scope exited normally
    Committed,
    /// Scope exited with an error
    RolledBack,
}

/// Completion callback: receives the final context and the error, if any
pub type OnComplete = Box<dyn FnOnce(&TransactionContext, Option<&Error>) + Send>;

/// Options recognised when opening a transaction scope.
#[derive(Default)]
pub struct TransactionOptions {
    /// Logical origin of the mutation (protocol name, subsystem, ...)
    pub origin: Option<String>,
    /// Acting user, when known
    pub user: Option<String>,
    /// Explicit transaction timestamp; defaults to now
    pub timestamp: Option<DateTime<Utc>>,
    /// Free-form metadata merged into every note
    pub metadata: BTreeMap<String, String>,
    /// Flags unioned into every note
    pub flags: BTreeSet<String>,
    /// Invoked once when the scope exits, after the status transition
    pub on_complete: Option<OnComplete>,
}

impl std::fmt::Debug for TransactionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionOptions")
            .field("origin", &self.origin)
            .field("user", &self.user)
            .field("timestamp", &self.timestamp)
            .field("metadata", &self.metadata)
            .field("flags", &self.flags)
            .field("on_complete", &self.on_complete.as_ref().map(|_| "..."))
            .finish()
    }
}

impl TransactionOptions {
    /// Options with a known origin
    pub fn with_origin(origin: impl Into<String>) -> Self {
        TransactionOptions {
            origin: Some(origin.into()),
            ..Default::default()
        }
    }

    /// Set the acting user
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Add a flag
    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.insert(flag.into());
        self
    }

    /// Add a metadata entry
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the completion callback
    pub fn on_complete(mut self, callback: OnComplete) -> Self {
        self.on_complete = Some(callback);
        self
    }
}

/// Metadata describing the active logical transaction.
///
/// The `commit_count` uses interior mutability so the Git engine can record
/// commits through a shared reference while the scope owns the context.
#[derive(Debug)]
pub struct TransactionContext {
    /// Unique transaction identifier
    pub tx_id: String,
    /// Logical origin; `"unknown"` when no scope was opened
    pub origin: String,
    /// Acting user, when known
    pub user: Option<String>,
    /// Transaction timestamp
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata
    pub metadata: BTreeMap<String, String>,
    /// Flags carried into every note
    pub flags: BTreeSet<String>,
    /// Lifecycle state
    pub status: TxStatus,
    /// When the scope was entered
    pub started_at: DateTime<Utc>,
    /// When the scope exited, once it has
    pub ended_at: Option<DateTime<Utc>>,
    commit_count: AtomicU64,
}

impl TransactionContext {
    /// Build a context from options
    pub fn new(opts: &TransactionOptions) -> Self {
        let now = Utc::now();
        TransactionContext {
            tx_id: Uuid::new_v4().to_string(),
            origin: opts.origin.clone().unwrap_or_else(|| "unknown".to_string()),
            user: opts.user.clone(),
            timestamp: opts.timestamp.unwrap_or(now),
            metadata: opts.metadata.clone(),
            flags: opts.flags.clone(),
            status: TxStatus::Active,
            started_at: now,
            ended_at: None,
            commit_count: AtomicU64::new(0),
        }
    }

    /// Context for commits made with no active scope
    pub fn unknown() -> Self {
        Self::new(&TransactionOptions::default())
    }

    /// Derive a nested context: options merge over this context, the
    /// transaction identity is kept so commits are never split by nesting.
    pub fn nested(&self, opts: &TransactionOptions) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.extend(opts.metadata.clone());
        let mut flags = self.flags.clone();
        flags.extend(opts.flags.iter().cloned());
        TransactionContext {
            tx_id: self.tx_id.clone(),
            origin: opts.origin.clone().unwrap_or_else(|| self.origin.clone()),
            user: opts.user.clone().or_else(|| self.user.clone()),
            timestamp: opts.timestamp.unwrap_or(self.timestamp),
            metadata,
            flags,
            status: TxStatus::Active,
            started_at: self.started_at,
            ended_at: None,
            commit_count: AtomicU64::new(0),
        }
    }

    /// Record one produced commit
    pub fn record_commit(&self) {
        self.commit_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a nested scope's commits back into this context
    pub fn absorb(&self, nested: &TransactionContext) {
        self.commit_count
            .fetch_add(nested.commit_count(), Ordering::Relaxed);
    }

    /// Number of commits produced in this scope so far
    pub fn commit_count(&self) -> u64 {
        self.commit_count.load(Ordering::Relaxed)
    }

    /// Project this context onto a note payload for one commit.
    ///
    /// Empty `flags` and `metadata` are omitted from the payload.
    pub fn to_note(&self, meta: &CommitMeta<'_>) -> NotePayload {
        NotePayload {
            tx_id: self.tx_id.clone(),
            origin: self.origin.clone(),
            user: self.user.clone(),
            timestamp: self.timestamp,
            metadata: if self.metadata.is_empty() {
                None
            } else {
                Some(self.metadata.clone())
            },
            flags: self.flags.iter().cloned().collect(),
            status: self.status,
            commit_id: meta.commit_id.to_string(),
            commit_message: meta.commit_message.to_string(),
            branch: meta.branch.to_string(),
            path: meta.path.to_string(),
            document_id: meta.document_id.to_string(),
            operation: meta.operation.to_string(),
        }
    }
}

/// Per-commit overrides composed with the active context into a note
#[derive(Debug, Clone, Copy)]
pub struct CommitMeta<'a> {
    /// Oid of the commit the note annotates
    pub commit_id: &'a str,
    /// Commit message
    pub commit_message: &'a str,
    /// Branch the commit landed on
    pub branch: &'a str,
    /// Repository-relative document path
    pub path: &'a str,
    /// Document identifier
    pub document_id: &'a str,
    /// `save` or `delete`
    pub operation: &'a str,
}

/// JSON payload attached to a commit under the notes reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotePayload {
    /// Transaction identifier
    pub tx_id: String,
    /// Logical origin
    pub origin: String,
    /// Acting user, when known
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user: Option<String>,
    /// Transaction timestamp
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata; absent when empty
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metadata: Option<BTreeMap<String, String>>,
    /// Flags; absent when empty
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub flags: Vec<String>,
    /// Context status at commit time
    pub status: TxStatus,
    /// Oid of the annotated commit
    pub commit_id: String,
    /// Commit message
    pub commit_message: String,
    /// Branch the commit landed on
    pub branch: String,
    /// Repository-relative document path
    pub path: String,
    /// Document identifier
    pub document_id: String,
    /// `save` or `delete`
    pub operation: String,
}

impl NotePayload {
    /// Merge this payload over an existing one: string fields from `self`
    /// override, `flags` are set-unioned, `metadata` merges field-wise with
    /// `self` winning.
    pub fn merge_over(mut self, existing: NotePayload) -> NotePayload {
        let mut flags: BTreeSet<String> = existing.flags.into_iter().collect();
        flags.extend(self.flags.drain(..));
        self.flags = flags.into_iter().collect();

        self.metadata = match (existing.metadata, self.metadata.take()) {
            (Some(mut old), Some(new)) => {
                old.extend(new);
                Some(old)
            }
            (old, new) => new.or(old),
        };

        if self.user.is_none() {
            self.user = existing.user;
        }
        self
    }
}

/// Scoped transaction entry points.
pub struct Transaction;

impl Transaction {
    /// Run `f` inside a transaction scope.
    ///
    /// The context transitions to `committed` when `f` returns `Ok`, and to
    /// `rolled-back` (with the `rollback` flag added) when it returns `Err`.
    /// The `on_complete` callback, when given, observes the final context.
    pub fn run<T>(
        mut opts: TransactionOptions,
        f: impl FnOnce(&TransactionContext) -> Result<T>,
    ) -> Result<T> {
        let on_complete = opts.on_complete.take();
        let mut ctx = TransactionContext::new(&opts);
        let result = f(&ctx);
        Self::finish(&mut ctx, &result);
        if let Some(callback) = on_complete {
            callback(&ctx, result.as_ref().err());
        }
        result
    }

    /// Run `f` inside a scope nested in `outer`.
    ///
    /// The nested context merges `opts` over the outer context and keeps its
    /// transaction identity; commits made inside are folded back into the
    /// outer context when the scope exits, and the outer context is left
    /// otherwise untouched.
    pub fn run_nested<T>(
        outer: &TransactionContext,
        mut opts: TransactionOptions,
        f: impl FnOnce(&TransactionContext) -> Result<T>,
    ) -> Result<T> {
        let on_complete = opts.on_complete.take();
        let mut ctx = outer.nested(&opts);
        let result = f(&ctx);
        Self::finish(&mut ctx, &result);
        outer.absorb(&ctx);
        if let Some(callback) = on_complete {
            callback(&ctx, result.as_ref().err());
        }
        result
    }

    fn finish<T>(ctx: &mut TransactionContext, result: &Result<T>) {
        ctx.ended_at = Some(Utc::now());
        match result {
            Ok(_) => ctx.status = TxStatus::Committed,
            Err(_) => {
                ctx.status = TxStatus::RolledBack;
                ctx.flags.insert("rollback".to_string());
            }
        }
    }
}
