//! Error types for indexing sessions and rebuilds.

use nodeindex_search::SearchError;
use nodeindex_types::ModelError;
use thiserror::Error;

/// Errors that can occur while indexing nodes
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Document building, bulk submission or lifecycle failure
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Settings or node model problem
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// A global tracing subscriber could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// Rebuild stopped before the alias was touched
    #[error("Rebuild aborted: {0}")]
    Aborted(String),
}

impl IndexingError {
    /// Whether the error is a per-node configuration problem.
    pub fn is_configuration(&self) -> bool {
        matches!(self, IndexingError::Search(SearchError::Configuration { .. }))
    }

    /// Whether the search engine could not be reached.
    pub fn is_transport(&self) -> bool {
        matches!(self, IndexingError::Search(e) if e.is_transport())
    }
}
