//! Configuration loading for the node indexer.
//!
//! Layered config: defaults -> platform config file -> explicit file -> env vars.
//! Environment variables use the `NODEINDEX_` prefix and `__` between nested
//! keys, e.g. `NODEINDEX_SEARCH__INDEX_NAME=acme`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Connection settings for the search engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Base URL of the search engine (e.g. "http://localhost:9200")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Alias name clients query against; physical indices are `<index_name>-<postfix>`
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Basic auth user
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password (loaded from env var, not stored in config file)
    #[serde(default, skip_serializing)]
    pub password: Option<SecretString>,
}

fn default_base_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_index_name() -> String {
    "nodeindex".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            index_name: default_index_name(),
            timeout_secs: default_timeout_secs(),
            username: None,
            password: None,
        }
    }
}

impl SearchSettings {
    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Document building and bulk submission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingSettings {
    /// Type-level default rules, keyed by declared property type
    #[serde(default = "default_rules")]
    pub default_rules: BTreeMap<String, String>,

    /// Field preserved across replacement of full-text root documents
    #[serde(default = "default_reserved_field")]
    pub reserved_field: String,

    /// Pending operations that trigger an automatic flush (0 = never)
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Workspace whose nodes are indexed
    #[serde(default = "default_workspace")]
    pub workspace: String,
}

fn default_rules() -> BTreeMap<String, String> {
    ["string", "boolean", "integer", "float", "array"]
        .into_iter()
        .map(|property_type| (property_type.to_string(), "${value}".to_string()))
        .collect()
}

fn default_reserved_field() -> String {
    "__fulltext".to_string()
}

fn default_flush_threshold() -> usize {
    500
}

fn default_workspace() -> String {
    "live".to_string()
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            default_rules: default_rules(),
            reserved_field: default_reserved_field(),
            flush_threshold: default_flush_threshold(),
            workspace: default_workspace(),
        }
    }
}

impl IndexingSettings {
    /// Default rule for a declared property type.
    ///
    /// Property types are matched case-insensitively; blank rules count as absent.
    pub fn default_rule(&self, property_type: &str) -> Option<&str> {
        self.default_rules
            .get(property_type)
            .or_else(|| {
                self.default_rules
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(property_type))
                    .map(|(_, rule)| rule)
            })
            .map(String::as_str)
            .filter(|rule| !rule.trim().is_empty())
    }

    /// Add or replace a default rule.
    pub fn with_default_rule(
        mut self,
        property_type: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        self.default_rules.insert(property_type.into(), rule.into());
        self
    }

    /// Settings without any type-level default rule.
    pub fn without_default_rules() -> Self {
        Self {
            default_rules: BTreeMap::new(),
            ..Default::default()
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Search engine connection
    #[serde(default)]
    pub search: SearchSettings,

    /// Document building and bulk settings
    #[serde(default)]
    pub indexing: IndexingSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            search: SearchSettings::default(),
            indexing: IndexingSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Platform config file (e.g. ~/.config/nodeindex/config.toml)
    /// 3. Explicit config file (optional, required to exist when given)
    /// 4. Environment variables (NODEINDEX_*)
    pub fn load(config_path: Option<&str>) -> Result<Self, ModelError> {
        let config_dir = ProjectDirs::from("", "", "nodeindex")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("search.base_url", default_base_url())
            .map_err(|e| ModelError::Config(e.to_string()))?
            .set_default("search.index_name", default_index_name())
            .map_err(|e| ModelError::Config(e.to_string()))?
            .set_default("search.timeout_secs", default_timeout_secs() as i64)
            .map_err(|e| ModelError::Config(e.to_string()))?
            .set_default("indexing.reserved_field", default_reserved_field())
            .map_err(|e| ModelError::Config(e.to_string()))?
            .set_default("indexing.flush_threshold", default_flush_threshold() as i64)
            .map_err(|e| ModelError::Config(e.to_string()))?
            .set_default("indexing.workspace", default_workspace())
            .map_err(|e| ModelError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| ModelError::Config(e.to_string()))?;

        for (property_type, rule) in default_rules() {
            builder = builder
                .set_default(format!("indexing.default_rules.{property_type}"), rule)
                .map_err(|e| ModelError::Config(e.to_string()))?;
        }

        builder = builder
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("NODEINDEX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| ModelError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| ModelError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.search.index_name.trim().is_empty() {
            return Err(ModelError::Config(
                "search.index_name must not be empty".to_string(),
            ));
        }
        if self.search.timeout_secs == 0 {
            return Err(ModelError::Config(
                "search.timeout_secs must be > 0".to_string(),
            ));
        }
        if !self.search.base_url.starts_with("http://")
            && !self.search.base_url.starts_with("https://")
        {
            return Err(ModelError::Config(format!(
                "search.base_url must be an http(s) URL, got {}",
                self.search.base_url
            )));
        }
        if self.indexing.reserved_field.trim().is_empty() {
            return Err(ModelError::Config(
                "indexing.reserved_field must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
