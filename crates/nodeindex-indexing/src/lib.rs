//! Indexing sessions and full reindex runs.
//!
//! ## Key Components
//!
//! - [`NodeIndexer`]: builds documents for nodes and queues them in one bulk
//!   request, flushing automatically at the configured threshold
//! - [`rebuild_index`]: fills a fresh `<alias>-<postfix>` index, swaps the alias
//!   onto it and removes the indices left behind
//! - [`init_logging`]: tracing subscriber setup honouring `RUST_LOG`
//! - [`IndexingError`]: error type for both
//!
//! ## Example
//!
//! ```ignore
//! use nodeindex_indexing::{connect, rebuild_index, LoggingProgressCallback, RebuildConfig};
//! use nodeindex_types::Settings;
//!
//! let settings = Settings::load(None)?;
//! let engine = connect(&settings.search)?;
//! let result = rebuild_index(
//!     engine,
//!     &settings.search.index_name,
//!     &nodes,
//!     &settings.indexing,
//!     &RebuildConfig::default(),
//!     &LoggingProgressCallback,
//! )
//! .await?;
//! ```

pub mod error;
pub mod indexer;
pub mod logging;
pub mod rebuild;

pub use error::IndexingError;
pub use indexer::{connect, IndexingStats, NodeAction, NodeIndexer};
pub use logging::{init_logging, init_logging_from_settings};
pub use rebuild::{
    rebuild_index, LoggingProgressCallback, NoOpProgressCallback, ProgressCallback, RebuildConfig,
    RebuildProgress, RebuildResult,
};
