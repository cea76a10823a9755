//! Binds nodes and properties to indexing rules.
//!
//! Each rule sees four variables:
//! - `node`: identifier, path, parentPath, workspace, nodeType and properties
//! - `propertyName`: the property being indexed
//! - `value`: the stored property value, or null when the node has none
//! - `documentIdentifier`: identifier of the document being built

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::trace;

use nodeindex_types::ContentNode;

use crate::context::Context;
use crate::engine::{ExpressionEngine, TemplateEngine};
use crate::error::EvaluationError;

/// Evaluates indexing rules for node properties.
///
/// Cheap to clone and safe to share across threads.
#[derive(Clone)]
pub struct IndexingRuleEvaluator {
    engine: Arc<dyn ExpressionEngine>,
}

impl Default for IndexingRuleEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(TemplateEngine::new()))
    }
}

impl std::fmt::Debug for IndexingRuleEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexingRuleEvaluator").finish_non_exhaustive()
    }
}

impl IndexingRuleEvaluator {
    /// Create an evaluator backed by `engine`.
    pub fn new(engine: Arc<dyn ExpressionEngine>) -> Self {
        Self { engine }
    }

    /// Per-node bindings shared by all properties of `node`.
    pub fn context_for(&self, node: &dyn ContentNode, document_identifier: &str) -> Context {
        Context::new()
            .with_variable("node", node_binding(node))
            .with_variable("documentIdentifier", Value::String(document_identifier.to_string()))
    }

    /// Evaluate `rule` for one property of the node bound in `node_context`.
    pub fn evaluate(
        &self,
        rule: &str,
        node_context: &Context,
        property_name: &str,
        value: Value,
    ) -> Result<Value, EvaluationError> {
        let mut context = node_context.clone();
        context.set("propertyName", Value::String(property_name.to_string()));
        context.set("value", value);

        let result = self.engine.evaluate(rule, &context)?;
        trace!(property = %property_name, rule = %rule, "Evaluated indexing rule");
        Ok(result)
    }
}

/// JSON view of a node as exposed to rules.
///
/// Only properties declared on the node type and stored on the node appear
/// under `properties`.
pub fn node_binding(node: &dyn ContentNode) -> Value {
    let properties: Map<String, Value> = node
        .node_type()
        .properties
        .keys()
        .filter_map(|name| {
            node.property(name)
                .map(|value| (name.clone(), value.clone()))
        })
        .collect();

    json!({
        "identifier": node.identifier(),
        "path": node.path(),
        "parentPath": node.parent_path(),
        "workspace": node.workspace(),
        "nodeType": node.node_type().name,
        "properties": properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeindex_types::{Node, NodeType, PropertyDefinition};
    use pretty_assertions::assert_eq;

    fn sample_node() -> Node {
        let node_type = NodeType::new("Acme.Site:Page")
            .with_property("title", PropertyDefinition::new("string"))
            .with_property("tags", PropertyDefinition::new("array"));
        Node::new("node-1", "/sites/acme/home", node_type)
            .with_property("title", "Home")
            .with_property("tags", json!(["a", "b"]))
            .with_property("undeclared", "hidden")
    }

    #[test]
    fn test_node_binding() {
        let binding = node_binding(&sample_node());
        assert_eq!(
            binding,
            json!({
                "identifier": "node-1",
                "path": "/sites/acme/home",
                "parentPath": "/sites/acme",
                "workspace": "live",
                "nodeType": "Acme.Site:Page",
                "properties": { "title": "Home", "tags": ["a", "b"] },
            })
        );
    }

    #[test]
    fn test_evaluate_binds_all_variables() {
        let evaluator = IndexingRuleEvaluator::default();
        let node = sample_node();
        let context = evaluator.context_for(&node, "doc-1");

        let value = evaluator
            .evaluate(
                "${propertyName}|${value}|${documentIdentifier}|${node.identifier}",
                &context,
                "title",
                json!("Home"),
            )
            .unwrap();
        assert_eq!(value, json!("title|Home|doc-1|node-1"));
    }

    #[test]
    fn test_absent_value_is_null() {
        let evaluator = IndexingRuleEvaluator::default();
        let node = sample_node();
        let context = evaluator.context_for(&node, "doc-1");

        let value = evaluator
            .evaluate("${value}", &context, "subtitle", Value::Null)
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_properties_do_not_leak_between_evaluations() {
        let evaluator = IndexingRuleEvaluator::default();
        let node = sample_node();
        let context = evaluator.context_for(&node, "doc-1");

        evaluator
            .evaluate("${value}", &context, "title", json!("Home"))
            .unwrap();
        assert!(context.get("value").is_none());
        assert!(context.get("propertyName").is_none());
    }

    #[test]
    fn test_custom_engine() {
        struct ConstantEngine;

        impl ExpressionEngine for ConstantEngine {
            fn evaluate(&self, _: &str, _: &Context) -> Result<Value, EvaluationError> {
                Ok(json!("constant"))
            }
        }

        let evaluator = IndexingRuleEvaluator::new(Arc::new(ConstantEngine));
        let node = sample_node();
        let context = evaluator.context_for(&node, "doc-1");
        assert_eq!(
            evaluator
                .evaluate("${value}", &context, "title", json!("Home"))
                .unwrap(),
            json!("constant")
        );
    }
}
