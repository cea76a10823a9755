//! # nodeindex-search
//!
//! Search-engine side of the node indexer.
//!
//! ## Features
//! - Document building: node properties through indexing rules into a flat field map
//! - Bulk accumulation: ordered index/update/delete operations submitted as one request,
//!   with a merge that preserves the reserved full-text field of full-text roots
//! - Search engine client: REST implementation plus an in-memory engine for tests
//! - Index lifecycle: atomic alias swap onto a rebuilt index and stale index cleanup

pub mod bulk;
pub mod client;
pub mod document;
pub mod error;
pub mod lifecycle;
pub mod mock;

pub use bulk::{parse_bulk_response, BulkOperation, BulkRequest, FlushResult, DEFAULT_RESERVED_FIELD};
pub use client::{AliasAction, HttpSearchEngine, SearchEngine, SearchEngineConfig};
pub use document::{BuildOutcome, DocumentBuilder};
pub use error::{FailedOperation, PartialFlushError, SearchError};
pub use lifecycle::{AliasUpdate, IndexLifecycleManager, LifecycleState, LifecycleStatus};
pub use mock::{MockSearchEngine, RecordedRequest};
