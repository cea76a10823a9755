//! In-memory search engine.
//!
//! Applies bulk payloads the way the real engine would, including the
//! reserved-field merge script, keeps aliases, and records every request so
//! tests can assert on the exact traffic. Failures can be injected per
//! document id or for the whole engine.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::bulk::BulkOperation;
use crate::client::{AliasAction, SearchEngine};
use crate::error::SearchError;

/// A request received by [`MockSearchEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRequest {
    Bulk { index: String, body: String },
    IndexExists { index: String },
    CreateIndex { index: String, settings: Value },
    ListIndices,
    AliasTargets { alias: String },
    UpdateAliases { actions: Vec<AliasAction> },
    DeleteIndices { indices: Vec<String> },
}

#[derive(Debug, Clone)]
struct StoredDocument {
    kind: String,
    source: Map<String, Value>,
}

#[derive(Debug, Default)]
struct PhysicalIndex {
    settings: Value,
    documents: BTreeMap<String, StoredDocument>,
}

#[derive(Debug, Default)]
struct State {
    indices: BTreeMap<String, PhysicalIndex>,
    aliases: BTreeMap<String, BTreeSet<String>>,
    requests: Vec<RecordedRequest>,
    failing_ids: HashSet<String>,
    offline: bool,
}

impl State {
    /// Physical index a name refers to, following a single-target alias.
    fn resolve(&self, name: &str) -> Result<Option<String>, SearchError> {
        if self.indices.contains_key(name) {
            return Ok(Some(name.to_string()));
        }
        match self.aliases.get(name) {
            Some(targets) if targets.len() == 1 => Ok(targets.iter().next().cloned()),
            Some(targets) if targets.len() > 1 => Err(SearchError::Api {
                status: 400,
                body: format!("alias [{name}] has more than one index associated with it"),
            }),
            _ => Ok(None),
        }
    }
}

/// In-memory [`SearchEngine`] for tests and embedded use.
#[derive(Debug, Default)]
pub struct MockSearchEngine {
    state: Mutex<State>,
}

impl MockSearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an empty physical index.
    pub fn with_index(self, index: impl Into<String>) -> Self {
        self.state().indices.entry(index.into()).or_default();
        self
    }

    /// Seed an alias pointing at `index`, creating the index if needed.
    pub fn with_alias(self, alias: impl Into<String>, index: impl Into<String>) -> Self {
        {
            let mut state = self.state();
            let index = index.into();
            state.indices.entry(index.clone()).or_default();
            state.aliases.entry(alias.into()).or_default().insert(index);
        }
        self
    }

    /// Seed a stored document.
    pub fn with_document(
        self,
        index: impl Into<String>,
        kind: impl Into<String>,
        id: impl Into<String>,
        source: Value,
    ) -> Self {
        {
            let mut state = self.state();
            let source = match source {
                Value::Object(map) => map,
                other => Map::from_iter([("value".to_string(), other)]),
            };
            state
                .indices
                .entry(index.into())
                .or_default()
                .documents
                .insert(
                    id.into(),
                    StoredDocument {
                        kind: kind.into(),
                        source,
                    },
                );
        }
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject every bulk operation on `id` until cleared.
    pub fn fail_document(&self, id: impl Into<String>) {
        self.state().failing_ids.insert(id.into());
    }

    pub fn clear_failures(&self) {
        self.state().failing_ids.clear();
    }

    /// While offline every call fails with a transport error and is not recorded.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.state().requests.clear();
    }

    /// Physical index names, sorted.
    pub fn indices(&self) -> Vec<String> {
        self.state().indices.keys().cloned().collect()
    }

    /// Physical indices `alias` points to, sorted.
    pub fn aliased(&self, alias: &str) -> Vec<String> {
        self.state()
            .aliases
            .get(alias)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Settings an index was created with.
    pub fn index_settings(&self, index: &str) -> Option<Value> {
        self.state().indices.get(index).map(|i| i.settings.clone())
    }

    /// Stored source of document `id` in `index` (an index or alias).
    pub fn document(&self, index: &str, id: &str) -> Option<Map<String, Value>> {
        let state = self.state();
        let physical = state.resolve(index).ok().flatten()?;
        state
            .indices
            .get(&physical)?
            .documents
            .get(id)
            .map(|doc| doc.source.clone())
    }

    /// Kind document `id` was stored under.
    pub fn document_kind(&self, index: &str, id: &str) -> Option<String> {
        let state = self.state();
        let physical = state.resolve(index).ok().flatten()?;
        state
            .indices
            .get(&physical)?
            .documents
            .get(id)
            .map(|doc| doc.kind.clone())
    }

    /// Number of documents in `index` (an index or alias).
    pub fn document_count(&self, index: &str) -> usize {
        let state = self.state();
        state
            .resolve(index)
            .ok()
            .flatten()
            .and_then(|physical| state.indices.get(&physical))
            .map(|i| i.documents.len())
            .unwrap_or(0)
    }

    fn begin(&self, request: RecordedRequest) -> Result<MutexGuard<'_, State>, SearchError> {
        let mut state = self.state();
        if state.offline {
            return Err(SearchError::Transport(
                "connection refused (search engine offline)".to_string(),
            ));
        }
        state.requests.push(request);
        Ok(state)
    }
}

fn bad_request(reason: impl Into<String>) -> SearchError {
    SearchError::Api {
        status: 400,
        body: json!({ "error": { "type": "parse_exception", "reason": reason.into() } }).to_string(),
    }
}

fn not_found(index: &str) -> SearchError {
    SearchError::Api {
        status: 404,
        body: json!({
            "error": { "type": "index_not_found_exception", "reason": format!("no such index [{index}]") }
        })
        .to_string(),
    }
}

fn object(value: Value, what: &str) -> Result<Map<String, Value>, SearchError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(bad_request(format!("{what} must be an object"))),
    }
}

/// Reserved field of an update request, provided its script is exactly the
/// merge script [`BulkOperation::merge_script`] emits for that field.
fn check_merge_script(request: &Map<String, Value>) -> Result<String, String> {
    let new_data = request
        .get("params")
        .and_then(|params| params.get("newData"))
        .and_then(Value::as_object);
    let upsert = request.get("upsert").and_then(Value::as_object);
    let (Some(new_data), Some(upsert)) = (new_data, upsert) else {
        return Err("update without params.newData and upsert".to_string());
    };

    let reserved: Vec<&String> = upsert
        .keys()
        .filter(|key| !new_data.contains_key(*key))
        .collect();
    let [reserved] = reserved.as_slice() else {
        return Err(format!(
            "expected exactly one reserved field in upsert, found {}",
            reserved.len()
        ));
    };

    let script = match request.get("script") {
        Some(Value::String(source)) => Some(source.as_str()),
        Some(Value::Object(script)) => script.get("source").and_then(Value::as_str),
        _ => None,
    };
    let expected = BulkOperation::merge_script(reserved);
    match script {
        Some(source) if source == expected => Ok((*reserved).clone()),
        Some(source) => Err(format!("compile error in script [{source}]")),
        None => Err("update without script".to_string()),
    }
}

/// Apply the reserved-field merge: `new_data` replaces the stored source and
/// `reserved` keeps its stored value, or starts empty.
fn merge(
    stored: Option<&Map<String, Value>>,
    mut new_data: Map<String, Value>,
    upsert: Map<String, Value>,
    reserved: &str,
) -> Map<String, Value> {
    let Some(stored) = stored else {
        return upsert;
    };
    let kept = stored
        .get(reserved)
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    new_data.insert(reserved.to_string(), kept);
    new_data
}

#[async_trait]
impl SearchEngine for MockSearchEngine {
    async fn bulk(&self, index: &str, body: String) -> Result<String, SearchError> {
        let mut state = self.begin(RecordedRequest::Bulk {
            index: index.to_string(),
            body: body.clone(),
        })?;

        let physical = match state.resolve(index)? {
            Some(physical) => physical,
            None => {
                state.indices.insert(index.to_string(), PhysicalIndex::default());
                index.to_string()
            }
        };

        let mut lines = body.lines().filter(|line| !line.trim().is_empty());
        let mut items = Vec::new();
        let mut errors = false;

        while let Some(line) = lines.next() {
            let header = object(serde_json::from_str(line)?, "action line")?;
            let Some((action, meta)) = header.into_iter().next() else {
                return Err(bad_request("empty action line"));
            };
            let kind = meta.get("_type").and_then(Value::as_str).unwrap_or("_doc").to_string();
            let id = meta
                .get("_id")
                .and_then(Value::as_str)
                .ok_or_else(|| bad_request("action without _id"))?
                .to_string();

            let payload = match action.as_str() {
                "index" | "update" => {
                    let line = lines
                        .next()
                        .ok_or_else(|| bad_request(format!("{action} without body")))?;
                    Some(object(serde_json::from_str(line)?, "body")?)
                }
                "delete" => None,
                other => return Err(bad_request(format!("unknown action [{other}]"))),
            };

            let reserved = match (action.as_str(), &payload) {
                ("update", Some(request)) => match check_merge_script(request) {
                    Ok(reserved) => Some(reserved),
                    Err(reason) => {
                        errors = true;
                        items.push(json!({ action.clone(): {
                            "_index": physical,
                            "_type": kind,
                            "_id": id,
                            "status": 400,
                            "error": { "type": "script_exception", "reason": reason },
                        }}));
                        continue;
                    }
                },
                _ => None,
            };

            if state.failing_ids.contains(&id) {
                errors = true;
                items.push(json!({ action.clone(): {
                    "_index": physical,
                    "_type": kind,
                    "_id": id,
                    "status": 400,
                    "error": { "type": "mapper_parsing_exception", "reason": format!("failed to parse document [{id}]") },
                }}));
                continue;
            }

            let Some(target) = state.indices.get_mut(&physical) else {
                return Err(not_found(&physical));
            };

            let status = match (action.as_str(), payload, reserved) {
                ("index", Some(source), _) => {
                    let created = target
                        .documents
                        .insert(id.clone(), StoredDocument { kind: kind.clone(), source })
                        .is_none();
                    if created { 201 } else { 200 }
                }
                ("update", Some(mut request), Some(reserved)) => {
                    let new_data = request
                        .get_mut("params")
                        .and_then(|params| params.get_mut("newData"))
                        .map(Value::take)
                        .unwrap_or_else(|| Value::Object(Map::new()));
                    let new_data = object(new_data, "params.newData")?;
                    let upsert = object(
                        request.remove("upsert").unwrap_or_else(|| Value::Object(new_data.clone())),
                        "upsert",
                    )?;
                    let stored = target.documents.get(&id).map(|doc| &doc.source);
                    let created = stored.is_none();
                    let source = merge(stored, new_data, upsert, &reserved);
                    target
                        .documents
                        .insert(id.clone(), StoredDocument { kind: kind.clone(), source });
                    if created { 201 } else { 200 }
                }
                _ => {
                    if target.documents.remove(&id).is_some() { 200 } else { 404 }
                }
            };

            items.push(json!({ action: {
                "_index": physical,
                "_type": kind,
                "_id": id,
                "status": status,
            }}));
        }

        Ok(json!({ "took": 1, "errors": errors, "items": items }).to_string())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        let state = self.begin(RecordedRequest::IndexExists {
            index: index.to_string(),
        })?;
        Ok(state.indices.contains_key(index))
    }

    async fn create_index(&self, index: &str, settings: &Value) -> Result<(), SearchError> {
        let mut state = self.begin(RecordedRequest::CreateIndex {
            index: index.to_string(),
            settings: settings.clone(),
        })?;
        if state.indices.contains_key(index) || state.aliases.contains_key(index) {
            return Err(SearchError::Api {
                status: 400,
                body: format!("resource_already_exists_exception: index [{index}] already exists"),
            });
        }
        state.indices.insert(
            index.to_string(),
            PhysicalIndex {
                settings: settings.clone(),
                documents: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn list_indices(&self) -> Result<Vec<String>, SearchError> {
        let state = self.begin(RecordedRequest::ListIndices)?;
        Ok(state.indices.keys().cloned().collect())
    }

    async fn alias_targets(&self, alias: &str) -> Result<Vec<String>, SearchError> {
        let state = self.begin(RecordedRequest::AliasTargets {
            alias: alias.to_string(),
        })?;
        Ok(state
            .aliases
            .get(alias)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchError> {
        let mut state = self.begin(RecordedRequest::UpdateAliases {
            actions: actions.to_vec(),
        })?;

        // All or nothing.
        if let Some(missing) = actions.iter().find(|a| !state.indices.contains_key(a.index())) {
            return Err(not_found(missing.index()));
        }

        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    state.aliases.entry(alias.clone()).or_default().insert(index.clone());
                }
                AliasAction::Remove { index, alias } => {
                    if let Some(targets) = state.aliases.get_mut(alias) {
                        targets.remove(index);
                    }
                }
            }
        }
        state.aliases.retain(|_, targets| !targets.is_empty());
        Ok(())
    }

    async fn delete_indices(&self, indices: &[String]) -> Result<(), SearchError> {
        let mut state = self.begin(RecordedRequest::DeleteIndices {
            indices: indices.to_vec(),
        })?;

        if let Some(missing) = indices.iter().find(|i| !state.indices.contains_key(*i)) {
            return Err(not_found(missing));
        }

        for index in indices {
            state.indices.remove(index);
            for targets in state.aliases.values_mut() {
                targets.remove(index);
            }
        }
        state.aliases.retain(|_, targets| !targets.is_empty());
        Ok(())
    }
}
