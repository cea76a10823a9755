//! Document building from content-repository nodes.
//!
//! Every property declared on the node type is indexed with the first rule
//! that applies:
//! 1. the property's explicit rule,
//! 2. the type-level default rule for the property's declared type,
//! 3. none: the property is skipped and logged.

use serde_json::Value;
use tracing::debug;

use nodeindex_eel::IndexingRuleEvaluator;
use nodeindex_types::{ContentNode, IndexingSettings, PropertyDefinition, SearchDocument};

use crate::error::SearchError;

/// What the caller should do with a node.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    /// Index or update the document.
    Upsert {
        document: SearchDocument,
        fulltext_root: bool,
    },
    /// The node is removed; delete its document.
    Remove { kind: String, id: String },
}

/// Turns nodes into search documents.
///
/// Holds no per-node state and can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct DocumentBuilder {
    evaluator: IndexingRuleEvaluator,
    settings: IndexingSettings,
}

impl DocumentBuilder {
    /// Create a builder.
    pub fn new(evaluator: IndexingRuleEvaluator, settings: IndexingSettings) -> Self {
        Self {
            evaluator,
            settings,
        }
    }

    /// Create a builder with the built-in rule engine.
    pub fn with_settings(settings: IndexingSettings) -> Self {
        Self::new(IndexingRuleEvaluator::default(), settings)
    }

    /// Indexing settings in use.
    pub fn settings(&self) -> &IndexingSettings {
        &self.settings
    }

    /// Rule that applies to a property, if any.
    pub fn resolve_rule<'a>(&'a self, definition: &'a PropertyDefinition) -> Option<&'a str> {
        definition
            .explicit_rule()
            .or_else(|| self.settings.default_rule(&definition.property_type))
    }

    /// Build the document for `node`, or signal its removal.
    ///
    /// Fails with [`SearchError::Configuration`] when a rule cannot be
    /// evaluated; no partial document is returned in that case.
    pub fn build(&self, node: &dyn ContentNode) -> Result<BuildOutcome, SearchError> {
        let node_type = node.node_type();
        let kind = node_type.document_kind();
        let id = node.document_identifier();

        if node.is_removed() {
            return Ok(BuildOutcome::Remove { kind, id });
        }

        let context = self.evaluator.context_for(node, &id);
        let mut document = SearchDocument::new(id, kind);

        for (name, definition) in &node_type.properties {
            let Some(rule) = self.resolve_rule(definition) else {
                debug!(
                    node_id = %node.identifier(),
                    property = %name,
                    property_type = %definition.property_type,
                    "Property not indexed, no indexing configuration"
                );
                continue;
            };

            let value = node.property(name).cloned().unwrap_or(Value::Null);
            let indexed = self
                .evaluator
                .evaluate(rule, &context, name, value)
                .map_err(|source| SearchError::Configuration {
                    node: node.identifier().to_string(),
                    property: name.clone(),
                    source,
                })?;

            document.insert(name.clone(), indexed);
        }

        Ok(BuildOutcome::Upsert {
            document,
            fulltext_root: node_type.is_fulltext_root(),
        })
    }
}
