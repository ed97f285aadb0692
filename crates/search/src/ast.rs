//! Query AST
//!
//! Clause tree consumed by [`crate::index::InvertedIndex::search_query`].
//! Clauses are serde-tagged so protocol servers can hand the engine a JSON
//! form directly. Combinators short-circuit and are commutative.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// One bound of a range clause: string, long or double
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RangeBound {
    /// Integer bound
    Long(i64),
    /// Floating-point bound
    Double(f64),
    /// Lexicographic string bound
    Str(String),
}

impl RangeBound {
    /// Numeric view of the bound, when it has one
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RangeBound::Long(v) => Some(*v as f64),
            RangeBound::Double(v) => Some(*v),
            RangeBound::Str(_) => None,
        }
    }
}

/// Search clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Query {
    /// Matches every document
    MatchAll,
    /// Exact value match on a field
    Term {
        /// Field name
        field: String,
        /// Exact value
        value: String,
    },
    /// Glob match with `*` and `?`; leading wildcards permitted
    Wildcard {
        /// Field name
        field: String,
        /// Glob pattern
        pattern: String,
    },
    /// Bounded range over string, long or double values
    Range {
        /// Field name
        field: String,
        /// Lower bound, unbounded when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lower: Option<RangeBound>,
        /// Upper bound, unbounded when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        upper: Option<RangeBound>,
        /// Whether the lower bound is inclusive
        #[serde(default = "default_true")]
        include_lower: bool,
        /// Whether the upper bound is inclusive
        #[serde(default = "default_true")]
        include_upper: bool,
    },
    /// Accent-insensitive full-text match; every query token must match
    Fts {
        /// Field name
        field: String,
        /// Query string, tokenized and folded
        query: String,
    },
    /// Field is present with a non-null value
    Exists {
        /// Field name
        field: String,
    },
    /// Field is absent or null
    Missing {
        /// Field name
        field: String,
    },
    /// Boolean combination of sub-clauses
    Boolean {
        /// All must match
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        must: Vec<Query>,
        /// At least one must match, when any are given
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        should: Vec<Query>,
        /// None may match
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        must_not: Vec<Query>,
        /// All must match (scoring-neutral variant of `must`)
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        filter: Vec<Query>,
    },
    /// Negation of a clause
    Not {
        /// The negated clause
        clause: Box<Query>,
    },
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending
    Asc,
    /// Descending
    Desc,
}

/// Result ordering by one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    /// Field to sort by
    pub field: String,
    /// Direction
    pub order: SortOrder,
}

/// Pagination and ordering options for [`Query`] evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Maximum number of ids returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Ids skipped before the first returned one
    #[serde(default)]
    pub offset: usize,
    /// Result ordering; document id ascending when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
    /// Resume after this document id (applied before offset/limit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}
