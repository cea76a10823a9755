//! Search engine client.
//!
//! [`SearchEngine`] is the request/response boundary to the search engine.
//! [`HttpSearchEngine`] talks to an Elasticsearch-compatible REST API; tests
//! and embedded use can substitute [`crate::mock::MockSearchEngine`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use nodeindex_types::SearchSettings;

use crate::error::SearchError;

/// One action of an atomic alias update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasAction {
    /// Point `alias` at `index`.
    Add { index: String, alias: String },
    /// Stop pointing `alias` at `index`.
    Remove { index: String, alias: String },
}

impl AliasAction {
    /// Physical index the action applies to.
    pub fn index(&self) -> &str {
        match self {
            AliasAction::Add { index, .. } | AliasAction::Remove { index, .. } => index,
        }
    }

    /// Whether this is an add action.
    pub fn is_add(&self) -> bool {
        matches!(self, AliasAction::Add { .. })
    }
}

/// Operations the indexer needs from a search engine.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Submit a newline-delimited bulk payload; returns the raw response body.
    async fn bulk(&self, index: &str, body: String) -> Result<String, SearchError>;

    /// Whether a physical index exists.
    async fn index_exists(&self, index: &str) -> Result<bool, SearchError>;

    /// Create a physical index. `settings` is sent as the request body unless null.
    async fn create_index(&self, index: &str, settings: &Value) -> Result<(), SearchError>;

    /// Names of all physical indices.
    async fn list_indices(&self) -> Result<Vec<String>, SearchError>;

    /// Physical indices `alias` currently points to. Unknown alias yields none.
    async fn alias_targets(&self, alias: &str) -> Result<Vec<String>, SearchError>;

    /// Apply all actions in one atomic request.
    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchError>;

    /// Delete the given physical indices in one request.
    async fn delete_indices(&self, indices: &[String]) -> Result<(), SearchError>;
}

/// Connection configuration for [`HttpSearchEngine`].
#[derive(Debug, Clone)]
pub struct SearchEngineConfig {
    /// Base URL (e.g. "http://localhost:9200")
    pub base_url: String,

    /// Request timeout
    pub timeout: Duration,

    /// Basic auth user
    pub username: Option<String>,

    /// Basic auth password
    pub password: Option<SecretString>,
}

impl SearchEngineConfig {
    /// Config for `base_url` with a 30 second timeout and no auth.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            username: None,
            password: None,
        }
    }

    /// Build from loaded settings.
    pub fn from_settings(settings: &SearchSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            timeout: settings.timeout(),
            username: settings.username.clone(),
            password: settings.password.clone(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }
}

#[derive(Deserialize)]
struct CatIndex {
    index: String,
}

/// [`SearchEngine`] over the search engine's REST API.
pub struct HttpSearchEngine {
    client: Client,
    config: SearchEngineConfig,
}

impl HttpSearchEngine {
    /// Create a client. Fails if the HTTP client cannot be built.
    pub fn new(config: SearchEngineConfig) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SearchError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let builder = self.client.request(method, url);
        match &self.config.username {
            Some(username) => builder.basic_auth(
                username,
                self.config.password.as_ref().map(|p| p.expose_secret().to_string()),
            ),
            None => builder,
        }
    }

    /// Send a request; connection failures become [`SearchError::Transport`].
    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response, SearchError> {
        builder.send().await.map_err(|e| {
            error!(operation = what, error = %e, "Search engine unreachable");
            SearchError::from(e)
        })
    }

    /// Turn a non-success response into [`SearchError::Api`].
    async fn check(response: Response) -> Result<Response, SearchError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(SearchError::Api { status, body })
    }
}

#[async_trait]
impl SearchEngine for HttpSearchEngine {
    async fn bulk(&self, index: &str, body: String) -> Result<String, SearchError> {
        debug!(index, bytes = body.len(), "Submitting bulk request");
        let builder = self
            .request(Method::POST, &format!("{index}/_bulk"))
            .header("Content-Type", "application/x-ndjson")
            .body(body);
        let response = Self::check(self.send(builder, "bulk").await?).await?;
        Ok(response.text().await?)
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        let response = self.send(self.request(Method::HEAD, index), "index_exists").await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Self::check(response).await.map(|_| true),
        }
    }

    async fn create_index(&self, index: &str, settings: &Value) -> Result<(), SearchError> {
        let mut builder = self.request(Method::PUT, index);
        if !settings.is_null() {
            builder = builder.json(settings);
        }
        Self::check(self.send(builder, "create_index").await?).await?;
        debug!(index, "Created index");
        Ok(())
    }

    async fn list_indices(&self) -> Result<Vec<String>, SearchError> {
        let builder = self.request(Method::GET, "_cat/indices?format=json&h=index");
        let response = Self::check(self.send(builder, "list_indices").await?).await?;
        let indices: Vec<CatIndex> = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(format!("index listing: {e}")))?;
        Ok(indices.into_iter().map(|entry| entry.index).collect())
    }

    async fn alias_targets(&self, alias: &str) -> Result<Vec<String>, SearchError> {
        let builder = self.request(Method::GET, &format!("_alias/{alias}"));
        let response = self.send(builder, "alias_targets").await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = Self::check(response).await?;
        let targets: BTreeMap<String, Value> = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(format!("alias lookup: {e}")))?;
        Ok(targets.into_keys().collect())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchError> {
        let builder = self
            .request(Method::POST, "_aliases")
            .json(&json!({ "actions": actions }));
        Self::check(self.send(builder, "update_aliases").await?).await?;
        Ok(())
    }

    async fn delete_indices(&self, indices: &[String]) -> Result<(), SearchError> {
        if indices.is_empty() {
            return Ok(());
        }
        let builder = self.request(Method::DELETE, &indices.join(","));
        Self::check(self.send(builder, "delete_indices").await?).await?;
        Ok(())
    }
}
