//! Full-text search for Chronicle
//!
//! An inverted index over documents, keyed by document id and segmented by
//! branch so that searches stay consistent with per-branch storage. Queries
//! arrive either as the legacy `(field, query)` substring/prefix form or as
//! a clause AST ([`ast::Query`]). Accent-insensitive matching is provided by
//! NFD normalisation at both index and query time.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod cache;
pub mod index;
pub mod normalize;
pub mod tokenizer;

pub use ast::{Query, QueryOptions, RangeBound, Sort, SortOrder};
pub use cache::QueryCache;
pub use index::{Index, InvertedIndex};
