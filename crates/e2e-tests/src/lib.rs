//! End-to-end test infrastructure for the node indexer.
//!
//! Provides a shared TestHarness and fixtures for scenarios that run the
//! whole path from nodes to stored documents and alias state against the
//! in-memory search engine.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing_subscriber::fmt::MakeWriter;

use nodeindex_indexing::NodeIndexer;
use nodeindex_search::{MockSearchEngine, RecordedRequest, SearchEngine};
use nodeindex_types::{Node, NodeType, PropertyDefinition, Settings};

/// Alias used by every scenario.
pub const ALIAS: &str = "acme";

/// Shared test harness for E2E tests.
///
/// Settings are loaded through the normal config layers from a file written
/// into a temp dir, so scenarios also exercise configuration loading.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Path of the generated config file
    pub config_path: PathBuf,
    /// Loaded settings
    pub settings: Settings,
    /// In-memory search engine
    pub engine: Arc<MockSearchEngine>,
}

impl TestHarness {
    /// Harness with no indices and auto flush disabled.
    pub fn new() -> Self {
        Self::with_config("")
    }

    /// Harness whose config ends with the `[indexing]` table; `extra_toml`
    /// continues that table. Auto flush stays disabled unless `extra_toml`
    /// sets its own `flush_threshold`.
    pub fn with_config(extra_toml: &str) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nodeindex.toml");

        let mut toml = format!(
            "log_level = \"debug\"\n\n[search]\nindex_name = \"{ALIAS}\"\n\n[indexing]\n"
        );
        if !extra_toml.contains("flush_threshold") {
            toml.push_str("flush_threshold = 0\n");
        }
        toml.push_str(extra_toml);
        std::fs::write(&config_path, toml).expect("Failed to write config");

        let settings = Settings::load(config_path.to_str()).expect("Failed to load settings");

        Self {
            _temp_dir: temp_dir,
            config_path,
            settings,
            engine: Arc::new(MockSearchEngine::new()),
        }
    }

    /// Replace the engine, e.g. with one seeded with indices.
    pub fn with_engine(mut self, engine: MockSearchEngine) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    /// The engine as a trait object.
    pub fn search_engine(&self) -> Arc<dyn SearchEngine> {
        self.engine.clone()
    }

    /// Indexer writing to `target` with the loaded indexing settings.
    pub fn indexer(&self, target: &str) -> NodeIndexer {
        NodeIndexer::new(self.search_engine(), target, &self.settings.indexing)
    }

    /// Bodies of all bulk requests received so far.
    pub fn bulk_bodies(&self) -> Vec<String> {
        self.engine
            .requests()
            .into_iter()
            .filter_map(|request| match request {
                RecordedRequest::Bulk { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Page type: `title` with an explicit rule, `body` relying on defaults.
pub fn page_type() -> NodeType {
    NodeType::new("Acme.Site:Page")
        .with_property("title", PropertyDefinition::new("string").with_indexing("${value}"))
        .with_property("body", PropertyDefinition::new("string"))
        .with_property(
            "__path",
            PropertyDefinition::new("string").with_indexing("${node.path}"),
        )
}

/// Document type whose documents carry extracted full text.
pub fn document_type() -> NodeType {
    NodeType::new("Acme.Site:Document")
        .with_property("a", PropertyDefinition::new("integer"))
        .with_property("b", PropertyDefinition::new("integer"))
        .with_fulltext_root(true)
}

/// `count` pages under `/sites/acme`.
pub fn create_pages(count: usize) -> Vec<Node> {
    let page = Arc::new(page_type());
    (0..count)
        .map(|i| {
            Node::new(format!("page-{i}"), format!("/sites/acme/page-{i}"), page.clone())
                .with_property("title", format!("Page {i}"))
                .with_property("body", format!("Body of page {i}"))
        })
        .collect()
}

/// Parse a newline-delimited bulk body into its JSON lines.
pub fn parse_ndjson(body: &str) -> Vec<Value> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("Invalid bulk line"))
        .collect()
}

/// Log sink for asserting on structured log output.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Run `f` with a debug-level subscriber writing into this capture.
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    /// Everything logged so far.
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(|e| e.into_inner()).clone();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
