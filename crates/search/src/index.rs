//! Inverted index
//!
//! Documents are flattened to scalar field values, tokenized, and posted
//! into per-branch term dictionaries. Named full-text fields (`name`,
//! `description`, `content`, `text`, `location`, and anything ending in
//! `_fts`) additionally index an accent-folded `_fts` shadow variant so
//! diacritic-insensitive matches succeed. The primary key field `id` is
//! stored verbatim.
//!
//! Updates are visible to the next search as soon as the call returns
//! (near-real-time semantics; there is no refresh contract). Deletes are
//! tombstoned: the document leaves the live set immediately, while posting
//! lists are filtered lazily and compacted once enough tombstones pile up.
//! Searches return document ids only; callers rehydrate from storage.
//!
//! A persistent index snapshots its live document set to `index.json` on
//! close, guarded by a `write.lock` file; stale locks from crashed
//! processes are cleared on open.

use crate::ast::{Query, QueryOptions, RangeBound, SortOrder};
use crate::normalize;
use crate::tokenizer::tokenize;
use chronicle_core::{Document, Error, Result};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

/// Field names that receive a folded `_fts` shadow variant
pub const FTS_FIELDS: &[&str] = &["name", "description", "content", "text", "location"];

const SNAPSHOT_FILE: &str = "index.json";
const WRITE_LOCK: &str = "write.lock";
const STALE_LOCK_AGE: Duration = Duration::from_secs(60);
const TOMBSTONE_SWEEP_THRESHOLD: usize = 256;

/// Index capability implemented by every index backend.
pub trait Index: Send + Sync {
    /// Insert or overwrite a document in the branch's index
    fn index(&self, doc: &Document, branch: &str) -> Result<()>;

    /// Remove a document; returns `false` when it was not indexed
    fn delete(&self, id: &str, branch: &str) -> Result<bool>;

    /// Legacy substring/prefix search over one field. Queries without
    /// wildcards are widened: terms shorter than four characters become
    /// `*term*`, longer ones get a trailing `*`.
    fn search(&self, field: &str, query: &str, branch: &str) -> Result<Vec<String>>;

    /// Evaluate a clause AST; returns matching document ids
    fn search_query(&self, query: &Query, branch: &str, opts: &QueryOptions)
        -> Result<Vec<String>>;

    /// Release the handle, persisting the snapshot when the index is durable
    fn close(&self) -> Result<()>;
}

fn is_fts_field(field: &str) -> bool {
    FTS_FIELDS.contains(&field) || field.ends_with("_fts")
}

fn fts_field_name(field: &str) -> String {
    if field.ends_with("_fts") {
        field.to_string()
    } else {
        format!("{field}_fts")
    }
}

/// Widen a bare term per the wildcard search contract
fn widen(term: &str) -> String {
    if term.contains('*') || term.contains('?') {
        term.to_string()
    } else if term.chars().count() < 4 {
        format!("*{term}*")
    } else {
        format!("{term}*")
    }
}

/// Glob match supporting `*` and `?`, with backtracking
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[derive(Debug, Clone)]
struct FieldValue {
    text: String,
    number: Option<f64>,
}

impl FieldValue {
    fn from_value(value: &Value) -> Option<FieldValue> {
        match value {
            Value::String(s) => Some(FieldValue {
                text: s.clone(),
                number: None,
            }),
            Value::Number(n) => Some(FieldValue {
                text: n.to_string(),
                number: n.as_f64(),
            }),
            Value::Bool(b) => Some(FieldValue {
                text: b.to_string(),
                number: None,
            }),
            _ => None,
        }
    }
}

fn flatten_into(prefix: &str, value: &Value, out: &mut BTreeMap<String, Vec<FieldValue>>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(&path, nested, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_into(prefix, item, out);
            }
        }
        scalar => {
            if let Some(fv) = FieldValue::from_value(scalar) {
                out.entry(prefix.to_string()).or_default().push(fv);
            }
        }
    }
}

/// Mirror of a storage document restricted to id + indexed fields
#[derive(Debug, Clone)]
struct IndexDoc {
    source: Value,
    fields: BTreeMap<String, Vec<FieldValue>>,
    tokens: BTreeMap<String, BTreeSet<String>>,
}

fn analyze(doc: &Document) -> IndexDoc {
    let source = doc.to_value();
    let mut fields = BTreeMap::new();
    flatten_into("", &source, &mut fields);

    let mut tokens: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (field, values) in &fields {
        let terms = tokens.entry(field.clone()).or_default();
        for value in values {
            terms.insert(value.text.to_lowercase());
            for token in tokenize(&value.text) {
                terms.insert(token);
            }
        }
    }

    // Folded shadow variants for the named full-text fields
    let shadows: Vec<(String, Vec<String>)> = fields
        .iter()
        .filter(|(field, _)| is_fts_field(field))
        .map(|(field, values)| {
            (
                fts_field_name(field),
                values.iter().map(|v| normalize::fold(&v.text)).collect(),
            )
        })
        .collect();
    for (shadow, texts) in shadows {
        let terms = tokens.entry(shadow).or_default();
        for text in texts {
            terms.insert(text.clone());
            for token in tokenize(&text) {
                terms.insert(token);
            }
        }
    }

    IndexDoc {
        source,
        fields,
        tokens,
    }
}

fn eval(doc: &IndexDoc, query: &Query) -> bool {
    match query {
        Query::MatchAll => true,
        Query::Term { field, value } => doc
            .fields
            .get(field)
            .is_some_and(|values| values.iter().any(|v| v.text == *value)),
        Query::Wildcard { field, pattern } => {
            let pattern = pattern.to_lowercase();
            let on_values = doc.fields.get(field).is_some_and(|values| {
                values
                    .iter()
                    .any(|v| wildcard_match(&pattern, &v.text.to_lowercase()))
            });
            on_values
                || doc
                    .tokens
                    .get(field)
                    .is_some_and(|terms| terms.iter().any(|t| wildcard_match(&pattern, t)))
        }
        Query::Range {
            field,
            lower,
            upper,
            include_lower,
            include_upper,
        } => doc.fields.get(field).is_some_and(|values| {
            values
                .iter()
                .any(|v| in_range(v, lower.as_ref(), upper.as_ref(), *include_lower, *include_upper))
        }),
        Query::Fts { field, query } => {
            let shadow = fts_field_name(field);
            let Some(terms) = doc.tokens.get(&shadow).or_else(|| doc.tokens.get(field)) else {
                return false;
            };
            let query_tokens = tokenize(&normalize::fold(query));
            if query_tokens.is_empty() {
                return false;
            }
            query_tokens.iter().all(|qt| {
                terms.iter().any(|t| {
                    let folded = normalize::fold(t);
                    folded == *qt || folded.starts_with(qt.as_str())
                })
            })
        }
        Query::Exists { field } => doc.fields.contains_key(field),
        Query::Missing { field } => !doc.fields.contains_key(field),
        Query::Boolean {
            must,
            should,
            must_not,
            filter,
        } => {
            must.iter().all(|q| eval(doc, q))
                && filter.iter().all(|q| eval(doc, q))
                && (should.is_empty() || should.iter().any(|q| eval(doc, q)))
                && !must_not.iter().any(|q| eval(doc, q))
        }
        Query::Not { clause } => !eval(doc, clause),
    }
}

fn in_range(
    value: &FieldValue,
    lower: Option<&RangeBound>,
    upper: Option<&RangeBound>,
    include_lower: bool,
    include_upper: bool,
) -> bool {
    let check = |bound: &RangeBound, is_lower: bool, inclusive: bool| -> bool {
        match (bound.as_number(), value.number) {
            (Some(b), Some(n)) => match (is_lower, inclusive) {
                (true, true) => n >= b,
                (true, false) => n > b,
                (false, true) => n <= b,
                (false, false) => n < b,
            },
            _ => {
                let b = match bound {
                    RangeBound::Str(s) => s.clone(),
                    RangeBound::Long(i) => i.to_string(),
                    RangeBound::Double(d) => d.to_string(),
                };
                let t = value.text.as_str();
                match (is_lower, inclusive) {
                    (true, true) => t >= b.as_str(),
                    (true, false) => t > b.as_str(),
                    (false, true) => t <= b.as_str(),
                    (false, false) => t < b.as_str(),
                }
            }
        }
    };
    lower.map_or(true, |b| check(b, true, include_lower))
        && upper.map_or(true, |b| check(b, false, include_upper))
}

#[derive(Default)]
struct BranchIndex {
    live: HashMap<String, IndexDoc>,
    postings: HashMap<(String, String), HashSet<String>>,
    tombstones: HashSet<String>,
}

impl BranchIndex {
    fn insert(&mut self, id: &str, doc: IndexDoc) {
        for (field, terms) in &doc.tokens {
            for term in terms {
                self.postings
                    .entry((field.clone(), term.clone()))
                    .or_default()
                    .insert(id.to_string());
            }
        }
        self.tombstones.remove(id);
        self.live.insert(id.to_string(), doc);
    }

    /// Tombstone a document: it leaves the live set now, posting lists are
    /// compacted lazily once enough tombstones accumulate.
    fn remove(&mut self, id: &str) -> bool {
        if self.live.remove(id).is_none() {
            return false;
        }
        self.tombstones.insert(id.to_string());
        if self.tombstones.len() >= TOMBSTONE_SWEEP_THRESHOLD {
            self.sweep();
        }
        true
    }

    fn sweep(&mut self) {
        let tombstones = std::mem::take(&mut self.tombstones);
        self.postings.retain(|_, ids| {
            for dead in &tombstones {
                ids.remove(dead);
            }
            !ids.is_empty()
        });
    }

    fn posting_ids_exact(&self, field: &str, term: &str) -> HashSet<String> {
        self.postings
            .get(&(field.to_string(), term.to_string()))
            .map(|ids| {
                ids.iter()
                    .filter(|id| self.live.contains_key(*id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn posting_ids_prefix(&self, field: &str, prefix: &str) -> HashSet<String> {
        let mut out = HashSet::new();
        for ((f, term), ids) in &self.postings {
            if f.as_str() == field && term.starts_with(prefix) {
                out.extend(ids.iter().filter(|id| self.live.contains_key(*id)).cloned());
            }
        }
        out
    }

    /// Posting-list candidate narrowing for clauses with exact-token shape.
    /// `None` means "scan the live set"; candidates are always re-verified
    /// against the live document, so a stale posting can never produce a
    /// false hit.
    fn candidates(&self, query: &Query) -> Option<HashSet<String>> {
        match query {
            Query::Term { field, value } => {
                Some(self.posting_ids_exact(field, &value.to_lowercase()))
            }
            Query::Fts { field, query } => {
                let first = tokenize(&normalize::fold(query)).into_iter().next()?;
                Some(self.posting_ids_prefix(&fts_field_name(field), &first))
            }
            Query::Boolean { must, filter, .. } => {
                must.iter().chain(filter).find_map(|q| self.candidates(q))
            }
            _ => None,
        }
    }
}

/// Per-branch inverted index with optional snapshot persistence.
pub struct InvertedIndex {
    dir: Option<PathBuf>,
    branches: DashMap<String, BranchIndex>,
    closed: AtomicBool,
}

impl InvertedIndex {
    /// Purely in-memory index (no snapshot on close)
    pub fn ephemeral() -> Self {
        InvertedIndex {
            dir: None,
            branches: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Index persisted under `dir`: loads the previous snapshot and clears
    /// a stale `write.lock` left by a crashed process.
    pub fn persistent(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        clear_stale_write_lock(&dir)?;
        let index = InvertedIndex {
            dir: Some(dir),
            branches: DashMap::new(),
            closed: AtomicBool::new(false),
        };
        index.load_snapshot()?;
        Ok(index)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::RepositoryClosed);
        }
        Ok(())
    }

    /// Number of live documents indexed for a branch
    pub fn doc_count(&self, branch: &str) -> usize {
        self.branches
            .get(branch)
            .map(|b| b.live.len())
            .unwrap_or(0)
    }

    fn load_snapshot(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let path = dir.join(SNAPSHOT_FILE);
        if !path.exists() {
            return Ok(());
        }
        let raw = fs::read(&path)?;
        let snapshot: BTreeMap<String, BTreeMap<String, Value>> = serde_json::from_slice(&raw)
            .map_err(|e| Error::IndexUpdateFailed(format!("snapshot: {e}")))?;
        for (branch, docs) in snapshot {
            for (id, source) in docs {
                match Document::from_value(source) {
                    Ok(doc) => {
                        self.branches
                            .entry(branch.clone())
                            .or_default()
                            .insert(&id, analyze(&doc));
                    }
                    Err(e) => warn!(%branch, %id, error = %e, "dropping bad snapshot entry"),
                }
            }
        }
        Ok(())
    }

    fn write_snapshot(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let lock_path = dir.join(WRITE_LOCK);
        fs::write(&lock_path, std::process::id().to_string())?;

        let mut snapshot: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
        for entry in self.branches.iter() {
            let docs: BTreeMap<String, Value> = entry
                .live
                .iter()
                .map(|(id, doc)| (id.clone(), doc.source.clone()))
                .collect();
            snapshot.insert(entry.key().clone(), docs);
        }

        let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        fs::write(&tmp, serde_json::to_vec(&snapshot)?)?;
        fs::rename(&tmp, dir.join(SNAPSHOT_FILE))?;
        let _ = fs::remove_file(&lock_path);
        Ok(())
    }
}

fn clear_stale_write_lock(dir: &Path) -> Result<()> {
    let lock_path = dir.join(WRITE_LOCK);
    if !lock_path.exists() {
        return Ok(());
    }
    let stale = fs::metadata(&lock_path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|age| age > STALE_LOCK_AGE);
    if stale {
        warn!(path = %lock_path.display(), "removing stale index write lock");
        let _ = fs::remove_file(&lock_path);
        Ok(())
    } else {
        Err(Error::IndexUpdateFailed(
            "index write lock held by another process".to_string(),
        ))
    }
}

impl Index for InvertedIndex {
    fn index(&self, doc: &Document, branch: &str) -> Result<()> {
        self.ensure_open()?;
        let id = doc.validate()?.to_string();
        self.branches
            .entry(branch.to_string())
            .or_default()
            .insert(&id, analyze(doc));
        Ok(())
    }

    fn delete(&self, id: &str, branch: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self
            .branches
            .get_mut(branch)
            .map(|mut b| b.remove(id))
            .unwrap_or(false))
    }

    fn search(&self, field: &str, query: &str, branch: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let Some(branch_index) = self.branches.get(branch) else {
            return Ok(Vec::new());
        };
        let pattern = widen(&query.to_lowercase());
        let folded_pattern = normalize::fold(&pattern);
        let shadow = fts_field_name(field);

        let mut ids: HashSet<String> = HashSet::new();
        for ((f, term), posting) in &branch_index.postings {
            let hit = (f.as_str() == field && wildcard_match(&pattern, term))
                || (*f == shadow && wildcard_match(&folded_pattern, term));
            if hit {
                ids.extend(
                    posting
                        .iter()
                        .filter(|id| branch_index.live.contains_key(*id))
                        .cloned(),
                );
            }
        }
        let mut out: Vec<String> = ids.into_iter().collect();
        out.sort();
        Ok(out)
    }

    fn search_query(
        &self,
        query: &Query,
        branch: &str,
        opts: &QueryOptions,
    ) -> Result<Vec<String>> {
        self.ensure_open()?;
        let Some(branch_index) = self.branches.get(branch) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<String> = match branch_index.candidates(query) {
            Some(candidates) => candidates
                .into_iter()
                .filter(|id| {
                    branch_index
                        .live
                        .get(id)
                        .is_some_and(|doc| eval(doc, query))
                })
                .collect(),
            None => branch_index
                .live
                .iter()
                .filter(|(_, doc)| eval(doc, query))
                .map(|(id, _)| id.clone())
                .collect(),
        };

        match &opts.sort {
            Some(sort) => {
                let key = |id: &String| -> (Option<f64>, String) {
                    branch_index
                        .live
                        .get(id)
                        .and_then(|doc| doc.fields.get(&sort.field))
                        .and_then(|values| values.first())
                        .map(|v| (v.number, v.text.clone()))
                        .unwrap_or((None, String::new()))
                };
                matched.sort_by(|a, b| {
                    let (na, ta) = key(a);
                    let (nb, tb) = key(b);
                    let ordering = match (na, nb) {
                        (Some(x), Some(y)) => {
                            x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal)
                        }
                        _ => ta.cmp(&tb),
                    };
                    ordering.then_with(|| a.cmp(b))
                });
                if sort.order == SortOrder::Desc {
                    matched.reverse();
                }
            }
            None => matched.sort(),
        }

        if let Some(cursor) = &opts.cursor {
            if let Some(pos) = matched.iter().position(|id| id == cursor) {
                matched.drain(..=pos);
            }
        }
        if opts.offset > 0 {
            matched.drain(..opts.offset.min(matched.len()));
        }
        if let Some(limit) = opts.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.write_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Sort;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn populated() -> InvertedIndex {
        let index = InvertedIndex::ephemeral();
        index
            .index(
                &doc(json!({"id": "user:1", "name": "José Silva", "age": 30})),
                "main",
            )
            .unwrap();
        index
            .index(
                &doc(json!({"id": "user:2", "name": "Alice Jones", "age": 25})),
                "main",
            )
            .unwrap();
        index
            .index(
                &doc(json!({"id": "user:3", "name": "Bob", "nick": "bobby"})),
                "main",
            )
            .unwrap();
        index
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("al*", "alice"));
        assert!(wildcard_match("*ice", "alice"));
        assert!(wildcard_match("a?ice", "alice"));
        assert!(wildcard_match("*lic*", "alice"));
        assert!(!wildcard_match("al", "alice"));
        assert!(!wildcard_match("a?ice", "ace"));
        assert!(wildcard_match("*", ""));
    }

    #[test]
    fn test_widen() {
        assert_eq!(widen("ab"), "*ab*");
        assert_eq!(widen("abc"), "*abc*");
        assert_eq!(widen("abcd"), "abcd*");
        assert_eq!(widen("ab*"), "ab*");
        assert_eq!(widen("a?c"), "a?c");
    }

    #[test]
    fn test_term_query() {
        let index = populated();
        let q = Query::Term {
            field: "name".into(),
            value: "Bob".into(),
        };
        assert_eq!(
            index.search_query(&q, "main", &QueryOptions::default()).unwrap(),
            vec!["user:3".to_string()]
        );
    }

    #[test]
    fn test_term_on_id_is_verbatim() {
        let index = populated();
        let q = Query::Term {
            field: "id".into(),
            value: "user:2".into(),
        };
        assert_eq!(
            index.search_query(&q, "main", &QueryOptions::default()).unwrap(),
            vec!["user:2".to_string()]
        );
    }

    #[test]
    fn test_fts_is_accent_insensitive() {
        let index = populated();
        let q = Query::Fts {
            field: "name".into(),
            query: "jose".into(),
        };
        assert_eq!(
            index.search_query(&q, "main", &QueryOptions::default()).unwrap(),
            vec!["user:1".to_string()]
        );
        // And the accented form finds the same document
        let q = Query::Fts {
            field: "name".into(),
            query: "josé".into(),
        };
        assert_eq!(
            index.search_query(&q, "main", &QueryOptions::default()).unwrap(),
            vec!["user:1".to_string()]
        );
    }

    #[test]
    fn test_fts_prefix_semantics() {
        let index = populated();
        let q = Query::Fts {
            field: "name".into(),
            query: "jon".into(),
        };
        // "jon" prefixes "jones"
        assert_eq!(
            index.search_query(&q, "main", &QueryOptions::default()).unwrap(),
            vec!["user:2".to_string()]
        );
    }

    #[test]
    fn test_wildcard_query_leading_star() {
        let index = populated();
        let q = Query::Wildcard {
            field: "name".into(),
            pattern: "*ones".into(),
        };
        assert_eq!(
            index.search_query(&q, "main", &QueryOptions::default()).unwrap(),
            vec!["user:2".to_string()]
        );
    }

    #[test]
    fn test_range_numeric() {
        let index = populated();
        let q = Query::Range {
            field: "age".into(),
            lower: Some(RangeBound::Long(26)),
            upper: None,
            include_lower: true,
            include_upper: true,
        };
        assert_eq!(
            index.search_query(&q, "main", &QueryOptions::default()).unwrap(),
            vec!["user:1".to_string()]
        );
        // Exclusive bound drops the boundary value
        let q = Query::Range {
            field: "age".into(),
            lower: Some(RangeBound::Long(25)),
            upper: None,
            include_lower: false,
            include_upper: true,
        };
        assert_eq!(
            index.search_query(&q, "main", &QueryOptions::default()).unwrap(),
            vec!["user:1".to_string()]
        );
    }

    #[test]
    fn test_exists_missing() {
        let index = populated();
        let q = Query::Exists {
            field: "nick".into(),
        };
        assert_eq!(
            index.search_query(&q, "main", &QueryOptions::default()).unwrap(),
            vec!["user:3".to_string()]
        );
        let q = Query::Missing {
            field: "age".into(),
        };
        assert_eq!(
            index.search_query(&q, "main", &QueryOptions::default()).unwrap(),
            vec!["user:3".to_string()]
        );
    }

    #[test]
    fn test_boolean_combination() {
        let index = populated();
        let q = Query::Boolean {
            must: vec![Query::Exists {
                field: "age".into(),
            }],
            should: vec![],
            must_not: vec![Query::Term {
                field: "name".into(),
                value: "Alice Jones".into(),
            }],
            filter: vec![Query::MatchAll],
        };
        assert_eq!(
            index.search_query(&q, "main", &QueryOptions::default()).unwrap(),
            vec!["user:1".to_string()]
        );
    }

    #[test]
    fn test_not_clause() {
        let index = populated();
        let q = Query::Not {
            clause: Box::new(Query::Exists {
                field: "age".into(),
            }),
        };
        assert_eq!(
            index.search_query(&q, "main", &QueryOptions::default()).unwrap(),
            vec!["user:3".to_string()]
        );
    }

    #[test]
    fn test_sort_and_pagination() {
        let index = populated();
        let opts = QueryOptions {
            sort: Some(Sort {
                field: "age".into(),
                order: SortOrder::Desc,
            }),
            ..Default::default()
        };
        let ids = index.search_query(&Query::MatchAll, "main", &opts).unwrap();
        // user:3 has no age; empty key sorts last under Desc after reverse
        assert_eq!(ids[0], "user:1");
        assert_eq!(ids[1], "user:2");

        let opts = QueryOptions {
            limit: Some(1),
            offset: 1,
            ..Default::default()
        };
        let ids = index.search_query(&Query::MatchAll, "main", &opts).unwrap();
        assert_eq!(ids, vec!["user:2".to_string()]);

        let opts = QueryOptions {
            cursor: Some("user:1".into()),
            ..Default::default()
        };
        let ids = index.search_query(&Query::MatchAll, "main", &opts).unwrap();
        assert_eq!(ids, vec!["user:2".to_string(), "user:3".to_string()]);
    }

    #[test]
    fn test_delete_is_tombstoned() {
        let index = populated();
        assert!(index.delete("user:2", "main").unwrap());
        assert!(!index.delete("user:2", "main").unwrap());
        let ids = index
            .search_query(&Query::MatchAll, "main", &QueryOptions::default())
            .unwrap();
        assert_eq!(ids, vec!["user:1".to_string(), "user:3".to_string()]);
        // Stale postings never produce hits
        let q = Query::Term {
            field: "name".into(),
            value: "Alice Jones".into(),
        };
        assert!(index.search_query(&q, "main", &QueryOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_reindex_overwrites() {
        let index = populated();
        index
            .index(&doc(json!({"id": "user:3", "name": "Robert"})), "main")
            .unwrap();
        let q = Query::Term {
            field: "name".into(),
            value: "Robert".into(),
        };
        assert_eq!(
            index.search_query(&q, "main", &QueryOptions::default()).unwrap(),
            vec!["user:3".to_string()]
        );
        // The old value no longer matches
        let q = Query::Term {
            field: "name".into(),
            value: "Bob".into(),
        };
        assert!(index.search_query(&q, "main", &QueryOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_branch_segmentation() {
        let index = InvertedIndex::ephemeral();
        index
            .index(&doc(json!({"id": "x", "v": "main-side"})), "main")
            .unwrap();
        index
            .index(&doc(json!({"id": "x", "v": "dev-side"})), "dev")
            .unwrap();
        let q = Query::Term {
            field: "v".into(),
            value: "dev-side".into(),
        };
        assert!(index.search_query(&q, "main", &QueryOptions::default()).unwrap().is_empty());
        assert_eq!(
            index.search_query(&q, "dev", &QueryOptions::default()).unwrap(),
            vec!["x".to_string()]
        );
    }

    #[test]
    fn test_legacy_search_widening() {
        let index = populated();
        // Short term is widened to *bob* and matches tokens of user:3
        let ids = index.search("name", "bob", "main").unwrap();
        assert_eq!(ids, vec!["user:3".to_string()]);
        // Longer term gets a trailing star: prefix search
        let ids = index.search("name", "alic", "main").unwrap();
        assert_eq!(ids, vec!["user:2".to_string()]);
        // Accent-folded matching through the shadow field
        let ids = index.search("name", "jose", "main").unwrap();
        assert_eq!(ids, vec!["user:1".to_string()]);
    }

    #[test]
    fn test_unknown_branch_is_empty() {
        let index = populated();
        assert!(index
            .search_query(&Query::MatchAll, "ghost", &QueryOptions::default())
            .unwrap()
            .is_empty());
        assert!(index.search("name", "bob", "ghost").unwrap().is_empty());
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = InvertedIndex::persistent(dir.path()).unwrap();
            index
                .index(&doc(json!({"id": "user:1", "name": "Alice"})), "main")
                .unwrap();
            index.close().unwrap();
        }
        let index = InvertedIndex::persistent(dir.path()).unwrap();
        assert_eq!(index.doc_count("main"), 1);
        let q = Query::Term {
            field: "name".into(),
            value: "Alice".into(),
        };
        assert_eq!(
            index.search_query(&q, "main", &QueryOptions::default()).unwrap(),
            vec!["user:1".to_string()]
        );
    }

    #[test]
    fn test_fresh_write_lock_blocks_open() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(WRITE_LOCK), "123").unwrap();
        assert!(matches!(
            InvertedIndex::persistent(dir.path()),
            Err(Error::IndexUpdateFailed(_))
        ));
    }
}
