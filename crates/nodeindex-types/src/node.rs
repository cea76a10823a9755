//! Read-only view of content-repository nodes and their types.
//!
//! The content repository owns nodes; the indexer only reads them through
//! the [`ContentNode`] trait. [`Node`] is a plain in-process implementation
//! used by callers that already hold node data and by tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::ModelError;

/// Accessors the indexer needs from a content-repository node.
pub trait ContentNode: Send + Sync {
    /// Stable persistent identifier of the node.
    fn identifier(&self) -> &str;

    /// Absolute path of the node in the content tree.
    fn path(&self) -> &str;

    /// Workspace the node was read from.
    fn workspace(&self) -> &str;

    /// Type of the node, resolved once by the repository.
    fn node_type(&self) -> &NodeType;

    /// Whether the node has been logically removed.
    fn is_removed(&self) -> bool;

    /// Whether the node stores a value for `name`.
    fn has_property(&self, name: &str) -> bool;

    /// Stored value of property `name`, if any.
    fn property(&self, name: &str) -> Option<&Value>;

    /// Path of the parent node, or `None` for the root.
    fn parent_path(&self) -> Option<&str> {
        let path = self.path().trim_end_matches('/');
        match path.rfind('/') {
            Some(0) if path.len() > 1 => Some("/"),
            Some(0) | None => None,
            Some(idx) => Some(&path[..idx]),
        }
    }

    /// External identifier of the search document built from this node.
    fn document_identifier(&self) -> String {
        document_identifier(self.identifier(), self.workspace())
    }
}

/// Derive the search document identifier for a node.
///
/// The identifier is the lowercase hex SHA-256 of `identifier@workspace`, so
/// the same node in different workspaces never collides.
pub fn document_identifier(identifier: &str, workspace: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    hasher.update(b"@");
    hasher.update(workspace.as_bytes());
    hex::encode(hasher.finalize())
}

/// Declaration of one property on a node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    /// Declared property type (e.g. "string", "boolean", "DateTime")
    #[serde(rename = "type")]
    pub property_type: String,

    /// Explicit indexing rule for this property
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexing: Option<String>,
}

impl PropertyDefinition {
    /// Create a definition without an explicit indexing rule.
    pub fn new(property_type: impl Into<String>) -> Self {
        Self {
            property_type: property_type.into(),
            indexing: None,
        }
    }

    /// Attach an explicit indexing rule.
    pub fn with_indexing(mut self, rule: impl Into<String>) -> Self {
        self.indexing = Some(rule.into());
        self
    }

    /// The explicit rule, ignoring blank ones.
    pub fn explicit_rule(&self) -> Option<&str> {
        self.indexing
            .as_deref()
            .filter(|rule| !rule.trim().is_empty())
    }
}

/// Search-related flags of a node type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTypeSearchConfig {
    /// Documents of this type accumulate full-text from descendants.
    #[serde(default)]
    pub fulltext_root: bool,
}

/// A node type with its per-property indexing configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeType {
    /// Fully qualified type name (e.g. "Acme.Site:Page")
    pub name: String,

    /// Declared properties, keyed by property name
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDefinition>,

    /// Search configuration
    #[serde(default)]
    pub search: NodeTypeSearchConfig,
}

impl NodeType {
    /// Create a node type without properties.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
            search: NodeTypeSearchConfig::default(),
        }
    }

    /// Declare a property.
    pub fn with_property(mut self, name: impl Into<String>, definition: PropertyDefinition) -> Self {
        self.properties.insert(name.into(), definition);
        self
    }

    /// Mark documents of this type as full-text roots.
    pub fn with_fulltext_root(mut self, fulltext_root: bool) -> Self {
        self.search.fulltext_root = fulltext_root;
        self
    }

    /// Parse a node type from its JSON definition.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let node_type: NodeType = serde_json::from_str(json)?;
        if node_type.name.trim().is_empty() {
            return Err(ModelError::InvalidInput(
                "node type name must not be empty".to_string(),
            ));
        }
        Ok(node_type)
    }

    /// Whether documents of this type are full-text roots.
    pub fn is_fulltext_root(&self) -> bool {
        self.search.fulltext_root
    }

    /// Document kind used as the `_type` of documents of this node type.
    ///
    /// `.` and `:` are not allowed in type names, so both become `-`.
    pub fn document_kind(&self) -> String {
        self.name.replace(['.', ':'], "-")
    }
}

/// In-process node implementation.
#[derive(Debug, Clone)]
pub struct Node {
    identifier: String,
    path: String,
    workspace: String,
    node_type: Arc<NodeType>,
    properties: BTreeMap<String, Value>,
    removed: bool,
}

impl Node {
    /// Default workspace for nodes created without one.
    pub const DEFAULT_WORKSPACE: &'static str = "live";

    /// Create a node in the default workspace.
    pub fn new(
        identifier: impl Into<String>,
        path: impl Into<String>,
        node_type: impl Into<Arc<NodeType>>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            path: path.into(),
            workspace: Self::DEFAULT_WORKSPACE.to_string(),
            node_type: node_type.into(),
            properties: BTreeMap::new(),
            removed: false,
        }
    }

    /// Move the node to another workspace.
    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = workspace.into();
        self
    }

    /// Set a property value.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Flag the node as removed.
    pub fn with_removed(mut self, removed: bool) -> Self {
        self.removed = removed;
        self
    }

    /// Set a property value in place.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Shared handle to the node type.
    pub fn node_type_handle(&self) -> Arc<NodeType> {
        Arc::clone(&self.node_type)
    }
}

impl ContentNode for Node {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn workspace(&self) -> &str {
        &self.workspace
    }

    fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    fn is_removed(&self) -> bool {
        self.removed
    }

    fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}
