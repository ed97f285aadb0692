//! Document model
//!
//! A document is a schemaless JSON object with a mandatory string `id` and an
//! optional `_table` marker. Identifiers have the form `table:id`; the table
//! is everything before the first `:`, and identifiers without a `:` belong
//! to no table.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Mandatory identifier field
pub const ID_FIELD: &str = "id";

/// System-added table marker field
pub const TABLE_FIELD: &str = "_table";

/// A schemaless JSON document.
///
/// Thin wrapper over a JSON object map. The only structural requirements are
/// a string `id`; `_table` is derived from the id's `table:` prefix when the
/// document does not carry it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document (invalid until an `id` is set)
    pub fn new() -> Self {
        Document(Map::new())
    }

    /// Wrap a JSON value; fails unless it is an object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Document(map)),
            other => Err(Error::DocumentInvalid(format!(
                "expected a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }

    /// Parse a document from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Unwrap into a JSON value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// View as a JSON value
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// The document identifier, if present and a string
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// The table marker: explicit `_table` field, else derived from the id
    pub fn table(&self) -> Option<&str> {
        if let Some(table) = self.0.get(TABLE_FIELD).and_then(Value::as_str) {
            return Some(table);
        }
        self.id().and_then(table_of)
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Set a field value
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    /// Iterate over `(field, value)` pairs
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the document has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validate the document and return its id.
    ///
    /// A document is valid when it carries a non-empty string `id`.
    pub fn validate(&self) -> Result<&str> {
        match self.id() {
            Some(id) if !id.is_empty() => Ok(id),
            Some(_) => Err(Error::DocumentInvalid("empty id".to_string())),
            None => Err(Error::DocumentInvalid(
                "document has no string id".to_string(),
            )),
        }
    }

    /// Parse the identifier of this document
    pub fn doc_id(&self) -> Result<DocumentId> {
        DocumentId::parse(self.validate()?)
    }

    /// Stamp `_table` from the id prefix when the field is absent
    pub fn ensure_table(&mut self) {
        if self.0.contains_key(TABLE_FIELD) {
            return;
        }
        if let Some(table) = self.id().and_then(table_of).map(str::to_string) {
            self.0.insert(TABLE_FIELD.to_string(), Value::String(table));
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn table_of(id: &str) -> Option<&str> {
    match id.split_once(':') {
        Some((table, _)) if !table.is_empty() => Some(table),
        _ => None,
    }
}

/// A parsed document identifier.
///
/// The raw form is the full identifier string (`user:1`); the table is the
/// segment before the first `:`. Identifiers with no `:` (or an empty
/// segment before it) have no table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentId {
    raw: String,
    table: Option<String>,
}

impl DocumentId {
    /// Parse an identifier; fails on the empty string
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::DocumentInvalid("empty id".to_string()));
        }
        let table = table_of(raw).map(str::to_string);
        Ok(DocumentId {
            raw: raw.to_string(),
            table,
        })
    }

    /// The full identifier string
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The table segment, when present
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for DocumentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_from_json() {
        let doc = Document::from_json(r#"{"id":"user:1","name":"Alice"}"#).unwrap();
        assert_eq!(doc.id(), Some("user:1"));
        assert_eq!(doc.get("name"), Some(&json!("Alice")));
    }

    #[test]
    fn test_document_rejects_non_object() {
        assert!(Document::from_value(json!([1, 2])).is_err());
        assert!(Document::from_value(json!("str")).is_err());
        assert!(Document::from_value(json!(null)).is_err());
    }

    #[test]
    fn test_table_derived_from_id() {
        let doc = Document::from_value(json!({"id": "user:1"})).unwrap();
        assert_eq!(doc.table(), Some("user"));
    }

    #[test]
    fn test_explicit_table_wins() {
        let doc = Document::from_value(json!({"id": "user:1", "_table": "people"})).unwrap();
        assert_eq!(doc.table(), Some("people"));
    }

    #[test]
    fn test_no_table_without_colon() {
        let doc = Document::from_value(json!({"id": "standalone"})).unwrap();
        assert_eq!(doc.table(), None);
    }

    #[test]
    fn test_ensure_table_stamps_field() {
        let mut doc = Document::from_value(json!({"id": "user:1"})).unwrap();
        doc.ensure_table();
        assert_eq!(doc.get(TABLE_FIELD), Some(&json!("user")));

        // No table to derive: field stays absent
        let mut doc = Document::from_value(json!({"id": "plain"})).unwrap();
        doc.ensure_table();
        assert_eq!(doc.get(TABLE_FIELD), None);
    }

    #[test]
    fn test_validate() {
        assert!(Document::new().validate().is_err());
        let doc = Document::from_value(json!({"id": ""})).unwrap();
        assert!(doc.validate().is_err());
        let doc = Document::from_value(json!({"id": 7})).unwrap();
        assert!(doc.validate().is_err());
        let doc = Document::from_value(json!({"id": "k"})).unwrap();
        assert_eq!(doc.validate().unwrap(), "k");
    }

    #[test]
    fn test_document_id_parse() {
        let id = DocumentId::parse("user:1").unwrap();
        assert_eq!(id.as_str(), "user:1");
        assert_eq!(id.table(), Some("user"));

        let id = DocumentId::parse("plain").unwrap();
        assert_eq!(id.table(), None);

        // Empty table segment is treated as no table
        let id = DocumentId::parse(":odd").unwrap();
        assert_eq!(id.table(), None);

        assert!(DocumentId::parse("").is_err());
    }

    #[test]
    fn test_document_id_splits_on_first_colon_only() {
        let id = DocumentId::parse("ns:a:b").unwrap();
        assert_eq!(id.table(), Some("ns"));
        assert_eq!(id.as_str(), "ns:a:b");
    }
}
