//! Full reindex into a fresh physical index.
//!
//! A rebuild creates `A-<postfix>`, indexes every node into it, flushes,
//! then optionally points the alias at it and removes the indices the alias
//! left behind. The live alias is never written to while the candidate is
//! being filled, so queries keep hitting the previous index until the swap.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use nodeindex_search::{AliasUpdate, IndexLifecycleManager, SearchEngine};
use nodeindex_types::{ContentNode, IndexingSettings};

use crate::error::IndexingError;
use crate::indexer::{NodeAction, NodeIndexer};

/// Configuration for a rebuild run.
#[derive(Debug, Clone)]
pub struct RebuildConfig {
    /// Postfix of the new physical index; the current Unix timestamp when unset.
    pub postfix: Option<String>,
    /// Index creation body passed through to the search engine.
    pub index_settings: Value,
    /// Point the alias at the new index once it is populated.
    pub update_alias: bool,
    /// Remove indices the alias no longer references. Only runs after an alias update.
    pub remove_old_indices: bool,
    /// Skip nodes whose rules cannot be evaluated instead of aborting.
    pub continue_on_error: bool,
    /// Nodes between progress reports.
    pub progress_interval: usize,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            postfix: None,
            index_settings: Value::Null,
            update_alias: true,
            remove_old_indices: true,
            continue_on_error: true,
            progress_interval: 100,
        }
    }
}

impl RebuildConfig {
    pub fn with_postfix(mut self, postfix: impl Into<String>) -> Self {
        self.postfix = Some(postfix.into());
        self
    }

    pub fn with_index_settings(mut self, index_settings: Value) -> Self {
        self.index_settings = index_settings;
        self
    }

    pub fn with_update_alias(mut self, update_alias: bool) -> Self {
        self.update_alias = update_alias;
        self
    }

    pub fn with_remove_old_indices(mut self, remove_old_indices: bool) -> Self {
        self.remove_old_indices = remove_old_indices;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }
}

/// Progress tracking for rebuild operations.
#[derive(Debug, Clone, Default)]
pub struct RebuildProgress {
    /// Total nodes processed.
    pub total_processed: u64,
    /// Documents queued for indexing.
    pub nodes_indexed: u64,
    /// Removals queued for nodes flagged as removed.
    pub nodes_removed: u64,
    /// Nodes outside the indexed workspace.
    pub skipped: u64,
    /// Nodes rejected because a rule could not be evaluated.
    pub errors: u64,
    /// Bulk requests submitted.
    pub flushes: u64,
    /// Bulk operations the search engine rejected.
    pub failed_operations: u64,
    /// Whether the rebuild completed successfully.
    pub completed: bool,
}

impl RebuildProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome for one node.
    pub fn record(&mut self, action: NodeAction) {
        match action {
            NodeAction::Indexed => self.nodes_indexed += 1,
            NodeAction::Removed => self.nodes_removed += 1,
            NodeAction::Skipped => self.skipped += 1,
        }
        self.total_processed += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
        self.total_processed += 1;
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }
}

/// Result of a rebuild run.
#[derive(Debug)]
pub struct RebuildResult {
    /// Physical index that was built.
    pub index_name: String,
    pub progress: RebuildProgress,
    /// Alias swap, when requested.
    pub alias_update: Option<AliasUpdate>,
    /// Indices deleted after the swap.
    pub removed_indices: Vec<String>,
    /// Time taken in milliseconds.
    pub elapsed_ms: u64,
}

/// Receives rebuild progress updates.
pub trait ProgressCallback: Send + Sync {
    /// Called every `progress_interval` nodes and once on completion.
    fn on_progress(&self, progress: &RebuildProgress);
}

/// A no-op progress callback for when progress reporting isn't needed.
pub struct NoOpProgressCallback;

impl ProgressCallback for NoOpProgressCallback {
    fn on_progress(&self, _progress: &RebuildProgress) {}
}

/// Logs progress at info level.
pub struct LoggingProgressCallback;

impl ProgressCallback for LoggingProgressCallback {
    fn on_progress(&self, progress: &RebuildProgress) {
        info!(
            total = progress.total_processed,
            indexed = progress.nodes_indexed,
            removed = progress.nodes_removed,
            errors = progress.errors,
            completed = progress.completed,
            "Rebuild progress"
        );
    }
}

/// Rebuild the index behind `alias` from `nodes`.
///
/// Precondition and transport failures always abort. Operations the search
/// engine rejects abort before the alias is touched unless
/// `continue_on_error` is set.
pub async fn rebuild_index<N, P>(
    engine: Arc<dyn SearchEngine>,
    alias: &str,
    nodes: &[N],
    settings: &IndexingSettings,
    config: &RebuildConfig,
    progress_callback: &P,
) -> Result<RebuildResult, IndexingError>
where
    N: ContentNode,
    P: ProgressCallback,
{
    let started = Instant::now();
    let manager = IndexLifecycleManager::new(Arc::clone(&engine), alias);
    let postfix = config
        .postfix
        .clone()
        .unwrap_or_else(IndexLifecycleManager::new_postfix);

    let index_name = manager.create_candidate(&postfix, &config.index_settings).await?;
    info!(alias, index = %index_name, nodes = nodes.len(), "Starting index rebuild");

    let mut indexer = NodeIndexer::new(engine, index_name.clone(), settings);
    let mut progress = RebuildProgress::new();
    let interval = config.progress_interval.max(1) as u64;

    for node in nodes {
        match indexer.index_node(node).await {
            Ok(action) => progress.record(action),
            Err(e) if e.is_configuration() && config.continue_on_error => {
                warn!(node_id = %node.identifier(), error = %e, "Failed to index node");
                progress.record_error();
            }
            Err(e) => return Err(e),
        }

        if progress.total_processed % interval == 0 {
            progress_callback.on_progress(&progress);
        }
    }

    indexer.flush().await?;
    progress.flushes = indexer.stats().flushes;
    progress.failed_operations = indexer.stats().failed_operations() as u64;

    if progress.failed_operations > 0 && !config.continue_on_error {
        return Err(IndexingError::Aborted(format!(
            "{} bulk operations failed while filling {index_name}",
            progress.failed_operations
        )));
    }

    let alias_update = if config.update_alias {
        Some(manager.update_alias(&postfix).await?)
    } else {
        None
    };

    let removed_indices = if config.remove_old_indices && alias_update.is_some() {
        manager.remove_old_indices().await?
    } else {
        debug!(alias, "Skipping removal of old indices");
        Vec::new()
    };

    progress.mark_completed();
    progress_callback.on_progress(&progress);

    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        alias,
        index = %index_name,
        indexed = progress.nodes_indexed,
        removed = progress.nodes_removed,
        errors = progress.errors,
        failed_operations = progress.failed_operations,
        elapsed_ms,
        "Index rebuild complete"
    );

    Ok(RebuildResult {
        index_name,
        progress,
        alias_update,
        removed_indices,
        elapsed_ms,
    })
}
