//! # nodeindex-types
//!
//! Shared domain types for the content-repository node indexer.
//!
//! This crate defines the data structures used throughout the system:
//! - Nodes: read-only view of content-repository entities and their types
//! - Search documents: the flat field map produced for one node
//! - Settings: layered configuration for the search engine and indexing rules
//!
//! ## Usage
//!
//! ```rust
//! use nodeindex_types::{ContentNode, Node, NodeType, PropertyDefinition};
//!
//! let page = NodeType::new("Acme.Site:Page")
//!     .with_property("title", PropertyDefinition::new("string").with_indexing("${value}"));
//! let node = Node::new("5f1c", "/sites/acme/home", page).with_property("title", "Home");
//! assert_eq!(node.node_type().document_kind(), "Acme-Site-Page");
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod node;

pub use config::{IndexingSettings, SearchSettings, Settings};
pub use document::SearchDocument;
pub use error::ModelError;
pub use node::{
    document_identifier, ContentNode, Node, NodeType, NodeTypeSearchConfig, PropertyDefinition,
};
