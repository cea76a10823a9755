//! Per-session node indexer.
//!
//! Drives the document builder once per node and feeds the result into one
//! bulk request, flushing automatically once the configured number of
//! operations is pending. Wrap it in a single mutex to share it between tasks.

use std::sync::Arc;

use tracing::{debug, info, warn};

use nodeindex_search::{
    BuildOutcome, BulkRequest, DocumentBuilder, FailedOperation, FlushResult, HttpSearchEngine,
    SearchEngine, SearchEngineConfig,
};
use nodeindex_types::{ContentNode, IndexingSettings, SearchSettings, Settings};

use crate::error::IndexingError;

/// What happened to a node handed to the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAction {
    /// Document queued for indexing
    Indexed,
    /// Removal queued
    Removed,
    /// Node belongs to another workspace
    Skipped,
}

/// Counters for one indexing session.
#[derive(Debug, Clone, Default)]
pub struct IndexingStats {
    pub indexed: u64,
    pub removed: u64,
    pub skipped: u64,
    /// Flushes that reached the search engine
    pub flushes: u64,
    /// Operations rejected by the search engine, oldest first
    pub failures: Vec<FailedOperation>,
}

impl IndexingStats {
    pub fn failed_operations(&self) -> usize {
        self.failures.len()
    }
}

/// Build an HTTP search engine client from settings.
pub fn connect(settings: &SearchSettings) -> Result<Arc<dyn SearchEngine>, IndexingError> {
    let engine = HttpSearchEngine::new(SearchEngineConfig::from_settings(settings))?;
    Ok(Arc::new(engine))
}

/// Indexes nodes into one target index or alias.
pub struct NodeIndexer {
    engine: Arc<dyn SearchEngine>,
    builder: DocumentBuilder,
    request: BulkRequest,
    workspace: String,
    flush_threshold: usize,
    stats: IndexingStats,
}

impl NodeIndexer {
    /// Create an indexer writing to `target`.
    pub fn new(engine: Arc<dyn SearchEngine>, target: impl Into<String>, settings: &IndexingSettings) -> Self {
        Self {
            engine,
            builder: DocumentBuilder::with_settings(settings.clone()),
            request: BulkRequest::new(target).with_reserved_field(settings.reserved_field.clone()),
            workspace: settings.workspace.clone(),
            flush_threshold: settings.flush_threshold,
            stats: IndexingStats::default(),
        }
    }

    /// Create an indexer writing to the configured alias.
    pub fn from_settings(engine: Arc<dyn SearchEngine>, settings: &Settings) -> Self {
        Self::new(engine, settings.search.index_name.clone(), &settings.indexing)
    }

    /// Replace the document builder, e.g. to plug in another expression engine.
    pub fn with_builder(mut self, builder: DocumentBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Index or alias receiving the bulk requests.
    pub fn target(&self) -> &str {
        self.request.index()
    }

    pub fn pending_count(&self) -> usize {
        self.request.pending_count()
    }

    pub fn stats(&self) -> &IndexingStats {
        &self.stats
    }

    /// Take the recorded failures, e.g. to re-index those nodes.
    pub fn take_failures(&mut self) -> Vec<FailedOperation> {
        std::mem::take(&mut self.stats.failures)
    }

    /// Build `node` and queue the resulting mutation.
    ///
    /// A configuration error rejects the node before anything is queued.
    /// When the queue reaches the flush threshold it is submitted; a failed
    /// submission is returned and the queue is kept for the next flush.
    pub async fn index_node(&mut self, node: &dyn ContentNode) -> Result<NodeAction, IndexingError> {
        if node.workspace() != self.workspace {
            debug!(
                node_id = %node.identifier(),
                workspace = %node.workspace(),
                "Skipping node outside the indexed workspace"
            );
            self.stats.skipped += 1;
            return Ok(NodeAction::Skipped);
        }

        let action = match self.builder.build(node)? {
            BuildOutcome::Upsert {
                document,
                fulltext_root,
            } => {
                debug!(
                    node_id = %node.identifier(),
                    kind = %document.kind,
                    id = %document.id,
                    fields = document.len(),
                    fulltext_root,
                    "Node added or updated"
                );
                self.request.enqueue_upsert(document, fulltext_root);
                self.stats.indexed += 1;
                NodeAction::Indexed
            }
            BuildOutcome::Remove { kind, id } => {
                self.queue_removal(node, kind, id);
                NodeAction::Removed
            }
        };

        self.flush_if_due().await?;
        Ok(action)
    }

    /// Queue removal of `node`'s document whether or not it is flagged removed.
    pub async fn remove_node(&mut self, node: &dyn ContentNode) -> Result<(), IndexingError> {
        let kind = node.node_type().document_kind();
        let id = node.document_identifier();
        self.queue_removal(node, kind, id);
        self.flush_if_due().await?;
        Ok(())
    }

    fn queue_removal(&mut self, node: &dyn ContentNode, kind: String, id: String) {
        info!(node_id = %node.identifier(), kind = %kind, id = %id, "Node removed");
        self.request.enqueue_delete(kind, id);
        self.stats.removed += 1;
    }

    async fn flush_if_due(&mut self) -> Result<(), IndexingError> {
        if self.flush_threshold > 0 && self.request.pending_count() >= self.flush_threshold {
            self.flush().await?;
        }
        Ok(())
    }

    /// Submit everything queued.
    ///
    /// Per-operation failures do not fail the call; they are returned in the
    /// result and recorded in [`IndexingStats::failures`].
    pub async fn flush(&mut self) -> Result<FlushResult, IndexingError> {
        let result = self.request.flush(self.engine.as_ref()).await?;
        if result.submitted > 0 {
            self.stats.flushes += 1;
            self.stats.failures.extend(result.failures.iter().cloned());
        }
        Ok(result)
    }
}

impl Drop for NodeIndexer {
    fn drop(&mut self) {
        if !self.request.is_empty() {
            warn!(
                target_index = %self.request.index(),
                pending = self.request.pending_count(),
                "Node indexer dropped with unflushed operations"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeindex_search::MockSearchEngine;
    use nodeindex_types::{Node, NodeType, PropertyDefinition};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn page_type() -> NodeType {
        NodeType::new("Acme.Site:Page").with_property("title", PropertyDefinition::new("string"))
    }

    fn page(id: &str) -> Node {
        Node::new(id, format!("/sites/acme/{id}"), page_type()).with_property("title", id.to_uppercase())
    }

    fn settings(flush_threshold: usize) -> IndexingSettings {
        IndexingSettings {
            flush_threshold,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_index_and_flush() {
        let engine = Arc::new(MockSearchEngine::new().with_alias("acme", "acme-1"));
        let mut indexer = NodeIndexer::new(engine.clone(), "acme", &settings(0));

        let node = page("home");
        assert_eq!(indexer.index_node(&node).await.unwrap(), NodeAction::Indexed);
        assert_eq!(indexer.pending_count(), 1);
        assert_eq!(engine.document_count("acme"), 0);

        let result = indexer.flush().await.unwrap();
        assert!(result.is_success());
        assert_eq!(
            serde_json::Value::Object(engine.document("acme", &node.document_identifier()).unwrap()),
            json!({ "title": "HOME" })
        );
        assert_eq!(indexer.stats().flushes, 1);
    }

    #[tokio::test]
    async fn test_auto_flush_at_threshold() {
        let engine = Arc::new(MockSearchEngine::new().with_index("acme-1"));
        let mut indexer = NodeIndexer::new(engine.clone(), "acme-1", &settings(2));

        indexer.index_node(&page("a")).await.unwrap();
        assert_eq!(engine.document_count("acme-1"), 0);
        indexer.index_node(&page("b")).await.unwrap();
        assert_eq!(engine.document_count("acme-1"), 2);
        assert_eq!(indexer.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_removed_node_queues_delete() {
        let engine = Arc::new(MockSearchEngine::new().with_index("acme-1"));
        let mut indexer = NodeIndexer::new(engine.clone(), "acme-1", &settings(0));

        let node = page("old");
        indexer.index_node(&node).await.unwrap();
        indexer.flush().await.unwrap();

        let removed = node.clone().with_removed(true);
        assert_eq!(indexer.index_node(&removed).await.unwrap(), NodeAction::Removed);
        indexer.flush().await.unwrap();

        assert_eq!(engine.document_count("acme-1"), 0);
        assert_eq!(indexer.stats().removed, 1);
    }

    #[tokio::test]
    async fn test_remove_node_explicitly() {
        let engine = Arc::new(MockSearchEngine::new().with_index("acme-1"));
        let mut indexer = NodeIndexer::new(engine.clone(), "acme-1", &settings(0));

        let node = page("old");
        indexer.index_node(&node).await.unwrap();
        indexer.remove_node(&node).await.unwrap();
        indexer.flush().await.unwrap();

        assert_eq!(engine.document_count("acme-1"), 0);
    }

    #[tokio::test]
    async fn test_other_workspace_is_skipped() {
        let engine = Arc::new(MockSearchEngine::new().with_index("acme-1"));
        let mut indexer = NodeIndexer::new(engine.clone(), "acme-1", &settings(0));

        let draft = page("draft").with_workspace("user-editor");
        assert_eq!(indexer.index_node(&draft).await.unwrap(), NodeAction::Skipped);
        assert_eq!(indexer.pending_count(), 0);
        assert_eq!(indexer.stats().skipped, 1);
    }

    #[tokio::test]
    async fn test_configuration_error_queues_nothing() {
        let engine = Arc::new(MockSearchEngine::new().with_index("acme-1"));
        let mut indexer = NodeIndexer::new(engine, "acme-1", &settings(0));

        let broken_type = NodeType::new("Acme.Site:Broken")
            .with_property("title", PropertyDefinition::new("string").with_indexing("${value"));
        let node = Node::new("b", "/b", broken_type).with_property("title", "x");

        let err = indexer.index_node(&node).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(indexer.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_queue() {
        let engine = Arc::new(MockSearchEngine::new().with_index("acme-1"));
        let mut indexer = NodeIndexer::new(engine.clone(), "acme-1", &settings(0));
        indexer.index_node(&page("a")).await.unwrap();

        engine.set_offline(true);
        assert!(indexer.flush().await.unwrap_err().is_transport());
        assert_eq!(indexer.pending_count(), 1);
        assert_eq!(indexer.stats().flushes, 0);

        engine.set_offline(false);
        indexer.flush().await.unwrap();
        assert_eq!(engine.document_count("acme-1"), 1);
    }

    #[tokio::test]
    async fn test_partial_failures_are_recorded() {
        let engine = Arc::new(MockSearchEngine::new().with_index("acme-1"));
        let mut indexer = NodeIndexer::new(engine.clone(), "acme-1", &settings(0));

        let bad = page("bad");
        engine.fail_document(bad.document_identifier());
        indexer.index_node(&page("good")).await.unwrap();
        indexer.index_node(&bad).await.unwrap();

        let result = indexer.flush().await.unwrap();
        assert_eq!(result.failures.len(), 1);
        assert_eq!(indexer.stats().failed_operations(), 1);

        let failures = indexer.take_failures();
        assert_eq!(failures[0].id.as_deref(), Some(bad.document_identifier().as_str()));
        assert_eq!(indexer.stats().failed_operations(), 0);
    }
}
