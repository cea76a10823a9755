//! Search document produced for a single node.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Flat field map plus identity, ready to be turned into a bulk operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    /// External document identifier
    pub id: String,

    /// Document kind (the `_type` on the wire)
    pub kind: String,

    /// Indexed field name -> evaluated value
    pub fields: Map<String, Value>,
}

impl SearchDocument {
    /// Create an empty document.
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Set a field value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Set a field value, builder style.
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Value of a field, if indexed.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Number of indexed fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field was indexed.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_fields() {
        let mut doc = SearchDocument::new("d1", "Acme-Site-Page").with_field("title", "Home");
        doc.insert("hidden", json!(false));

        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get("title"), Some(&json!("Home")));
        assert_eq!(doc.get("missing"), None);
        assert!(!doc.is_empty());
    }

    #[test]
    fn test_document_serialization() {
        let doc = SearchDocument::new("d1", "Acme-Site-Page").with_field("title", "Home");
        let json = serde_json::to_string(&doc).unwrap();
        let decoded: SearchDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, decoded);
    }
}
