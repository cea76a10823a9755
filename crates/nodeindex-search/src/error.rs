//! Search error types.

use thiserror::Error;

use nodeindex_eel::EvaluationError;

/// Errors that can occur while building documents or talking to the search engine.
#[derive(Debug, Error)]
pub enum SearchError {
    /// An indexing rule could not be evaluated; the node must not be indexed
    #[error("Configuration error for property `{property}` of node {node}: {source}")]
    Configuration {
        node: String,
        property: String,
        #[source]
        source: EvaluationError,
    },

    /// Lifecycle operation invoked in an invalid state; nothing was changed
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// No response obtained from the search engine
    #[error("Transport error: {0}")]
    Transport(String),

    /// The search engine answered with a non-success status
    #[error("Search engine returned status {status}: {body}")]
    Api { status: u16, body: String },

    /// Some operations of an accepted bulk request failed.
    ///
    /// [`BulkRequest::flush`](crate::BulkRequest::flush) reports these inside its
    /// `FlushResult`; this variant is what a caller gets by converting that
    /// result with `flush(..).await?.into_result()?`.
    #[error(transparent)]
    PartialFlush(#[from] PartialFlushError),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SearchError {
    /// Whether the request never got an answer from the search engine.
    pub fn is_transport(&self) -> bool {
        matches!(self, SearchError::Transport(_))
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        SearchError::Transport(err.to_string())
    }
}

/// One bulk operation the search engine rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedOperation {
    /// Position of the operation (or response line) in the flushed batch
    pub position: usize,
    /// Bulk action ("index", "update", "delete"), "unknown" when not reported
    pub action: String,
    /// Document kind, when known
    pub kind: Option<String>,
    /// Document id, when known
    pub id: Option<String>,
    /// Per-operation HTTP status, when reported
    pub status: Option<u16>,
    /// Error reported by the search engine
    pub reason: String,
}

/// A bulk request was accepted but some of its operations failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} of {} bulk operations failed", .failures.len(), .submitted)]
pub struct PartialFlushError {
    /// Operations submitted in the request
    pub submitted: usize,
    /// Operations the search engine rejected
    pub failures: Vec<FailedOperation>,
}

impl PartialFlushError {
    /// Ids of the failed documents, in batch order.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.failures
            .iter()
            .filter_map(|failure| failure.id.as_deref())
            .collect()
    }
}
