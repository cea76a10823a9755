//! Bulk request accumulation and submission.
//!
//! A [`BulkRequest`] is the ordered mutation log of one indexing session.
//! Operations are serialized in enqueue order as newline-delimited JSON and
//! submitted in a single request on [`BulkRequest::flush`].
//!
//! The accumulator is not synchronized. Confine it to one task, or wrap it in
//! a single mutex around enqueue and flush: operation order is significant.

use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use nodeindex_types::SearchDocument;

use crate::client::SearchEngine;
use crate::error::{FailedOperation, PartialFlushError, SearchError};

/// Reserved field used when none is configured.
pub const DEFAULT_RESERVED_FIELD: &str = "__fulltext";

/// One mutation within a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    /// Replace the stored document with `document`.
    Index {
        kind: String,
        id: String,
        document: Map<String, Value>,
    },
    /// Replace all fields but `reserved_field`, which keeps its stored value.
    UpsertMerge {
        kind: String,
        id: String,
        new_data: Map<String, Value>,
        reserved_field: String,
    },
    /// Remove the document.
    Delete { kind: String, id: String },
}

impl BulkOperation {
    /// Bulk action name on the wire.
    pub fn action(&self) -> &'static str {
        match self {
            BulkOperation::Index { .. } => "index",
            BulkOperation::UpsertMerge { .. } => "update",
            BulkOperation::Delete { .. } => "delete",
        }
    }

    /// Document kind.
    pub fn kind(&self) -> &str {
        match self {
            BulkOperation::Index { kind, .. }
            | BulkOperation::UpsertMerge { kind, .. }
            | BulkOperation::Delete { kind, .. } => kind,
        }
    }

    /// Document id.
    pub fn id(&self) -> &str {
        match self {
            BulkOperation::Index { id, .. }
            | BulkOperation::UpsertMerge { id, .. }
            | BulkOperation::Delete { id, .. } => id,
        }
    }

    /// Painless script that replaces the source but keeps `reserved_field`.
    pub fn merge_script(reserved_field: &str) -> String {
        let key = Value::String(reserved_field.to_string());
        format!(
            "def reserved = ctx._source.containsKey({key}) ? ctx._source[{key}] : [:]; \
             ctx._source = params.newData; \
             ctx._source[{key}] = reserved"
        )
    }

    /// Append the action line and, if any, the body line.
    fn write_lines(&self, out: &mut String) -> Result<(), SearchError> {
        let header = json!({ self.action(): { "_type": self.kind(), "_id": self.id() } });
        out.push_str(&serde_json::to_string(&header)?);
        out.push('\n');

        match self {
            BulkOperation::Index { document, .. } => {
                out.push_str(&serde_json::to_string(document)?);
                out.push('\n');
            }
            BulkOperation::UpsertMerge {
                new_data,
                reserved_field,
                ..
            } => {
                let mut upsert = new_data.clone();
                upsert.insert(reserved_field.clone(), Value::Object(Map::new()));
                let body = json!({
                    "script": Self::merge_script(reserved_field),
                    "params": { "newData": new_data },
                    "upsert": upsert,
                });
                out.push_str(&serde_json::to_string(&body)?);
                out.push('\n');
            }
            BulkOperation::Delete { .. } => {}
        }
        Ok(())
    }
}

/// Outcome of a flush whose request reached the search engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushResult {
    /// Operations submitted
    pub submitted: usize,
    /// Operations the search engine rejected
    pub failures: Vec<FailedOperation>,
}

impl FlushResult {
    /// Whether every submitted operation succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Operations applied by the search engine.
    pub fn succeeded(&self) -> usize {
        self.submitted.saturating_sub(self.failures.len())
    }

    /// The partial failure, if any operation was rejected.
    pub fn partial_failure(&self) -> Option<PartialFlushError> {
        (!self.failures.is_empty()).then(|| PartialFlushError {
            submitted: self.submitted,
            failures: self.failures.clone(),
        })
    }

    /// Number of submitted operations, or the partial failure.
    pub fn into_result(self) -> Result<usize, PartialFlushError> {
        if self.failures.is_empty() {
            Ok(self.submitted)
        } else {
            Err(PartialFlushError {
                submitted: self.submitted,
                failures: self.failures,
            })
        }
    }
}

/// Ordered bulk operations for one target index or alias.
#[derive(Debug, Clone)]
pub struct BulkRequest {
    index: String,
    reserved_field: String,
    operations: Vec<BulkOperation>,
}

impl BulkRequest {
    /// Create an empty request targeting `index` (a physical index or an alias).
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            reserved_field: DEFAULT_RESERVED_FIELD.to_string(),
            operations: Vec::new(),
        }
    }

    /// Use another reserved field for full-text root documents.
    pub fn with_reserved_field(mut self, reserved_field: impl Into<String>) -> Self {
        self.reserved_field = reserved_field.into();
        self
    }

    /// Target index or alias.
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Reserved field preserved on full-text root documents.
    pub fn reserved_field(&self) -> &str {
        &self.reserved_field
    }

    /// Queue a document write.
    ///
    /// Full-text roots become an [`BulkOperation::UpsertMerge`] so the
    /// reserved field survives; everything else is a plain replace.
    pub fn enqueue_upsert(&mut self, document: SearchDocument, fulltext_root: bool) {
        let SearchDocument { id, kind, fields } = document;
        let operation = if fulltext_root {
            let mut new_data = fields;
            new_data.remove(&self.reserved_field);
            BulkOperation::UpsertMerge {
                kind,
                id,
                new_data,
                reserved_field: self.reserved_field.clone(),
            }
        } else {
            BulkOperation::Index {
                kind,
                id,
                document: fields,
            }
        };
        debug!(
            action = operation.action(),
            kind = %operation.kind(),
            id = %operation.id(),
            "Queued bulk operation"
        );
        self.operations.push(operation);
    }

    /// Queue a document removal.
    pub fn enqueue_delete(&mut self, kind: impl Into<String>, id: impl Into<String>) {
        let operation = BulkOperation::Delete {
            kind: kind.into(),
            id: id.into(),
        };
        debug!(kind = %operation.kind(), id = %operation.id(), "Queued bulk delete");
        self.operations.push(operation);
    }

    /// Number of queued operations.
    pub fn pending_count(&self) -> usize {
        self.operations.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Queued operations in submission order.
    pub fn operations(&self) -> &[BulkOperation] {
        &self.operations
    }

    /// Newline-delimited bulk payload for the queued operations.
    pub fn to_ndjson(&self) -> Result<String, SearchError> {
        let mut body = String::new();
        for operation in &self.operations {
            operation.write_lines(&mut body)?;
        }
        Ok(body)
    }

    /// Submit all queued operations in one request.
    ///
    /// On success, including partial per-operation failure, the queue is
    /// cleared. If the request fails as a whole the queue is left intact so
    /// the identical batch can be resubmitted.
    pub async fn flush(&mut self, engine: &dyn SearchEngine) -> Result<FlushResult, SearchError> {
        if self.operations.is_empty() {
            debug!(index = %self.index, "Nothing to flush");
            return Ok(FlushResult::default());
        }

        let body = self.to_ndjson()?;
        let submitted = self.operations.len();

        let response = match engine.bulk(&self.index, body).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    index = %self.index,
                    pending = submitted,
                    error = %e,
                    "Bulk request failed, keeping operations for retry"
                );
                return Err(e);
            }
        };

        let failures = parse_bulk_response(&response, &self.operations);
        self.operations.clear();

        for failure in &failures {
            warn!(
                index = %self.index,
                position = failure.position,
                action = %failure.action,
                id = failure.id.as_deref().unwrap_or("-"),
                status = ?failure.status,
                reason = %failure.reason,
                "Bulk operation failed"
            );
        }

        info!(
            index = %self.index,
            submitted,
            failed = failures.len(),
            "Flushed bulk request"
        );

        Ok(FlushResult {
            submitted,
            failures,
        })
    }
}

/// Extract per-operation failures from a bulk response.
///
/// Structured responses are matched item by item against `operations`.
/// Anything else is scanned line by line for an error marker.
pub fn parse_bulk_response(response: &str, operations: &[BulkOperation]) -> Vec<FailedOperation> {
    let parsed: Option<Value> = serde_json::from_str(response).ok();
    let Some(items) = parsed
        .as_ref()
        .and_then(|value| value.get("items"))
        .and_then(Value::as_array)
    else {
        return scan_error_lines(response);
    };

    if parsed
        .as_ref()
        .and_then(|value| value.get("errors"))
        .and_then(Value::as_bool)
        == Some(false)
    {
        return Vec::new();
    }

    items
        .iter()
        .enumerate()
        .filter_map(|(position, item)| {
            let (action, result) = item.as_object()?.iter().next()?;
            let error = result.get("error").filter(|e| !e.is_null())?;
            let operation = operations.get(position);
            Some(FailedOperation {
                position,
                action: action.clone(),
                kind: result
                    .get("_type")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .or_else(|| operation.map(|op| op.kind().to_string())),
                id: result
                    .get("_id")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .or_else(|| operation.map(|op| op.id().to_string())),
                status: result
                    .get("status")
                    .and_then(Value::as_u64)
                    .and_then(|s| u16::try_from(s).ok()),
                reason: error_reason(error),
            })
        })
        .collect()
}

fn error_reason(error: &Value) -> String {
    match error {
        Value::String(reason) => reason.clone(),
        Value::Object(map) => map
            .get("reason")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

fn scan_error_lines(response: &str) -> Vec<FailedOperation> {
    response
        .lines()
        .enumerate()
        .filter(|(_, line)| line.contains("error"))
        .map(|(position, line)| FailedOperation {
            position,
            action: "unknown".to_string(),
            kind: None,
            id: None,
            status: None,
            reason: line.trim().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSearchEngine;
    use pretty_assertions::assert_eq;

    fn page(id: &str) -> SearchDocument {
        SearchDocument::new(id, "Acme-Site-Page")
            .with_field("title", format!("Title {id}"))
            .with_field("hidden", false)
    }

    fn lines(body: &str) -> Vec<Value> {
        body.lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_index_operation_round_trip() {
        let mut request = BulkRequest::new("acme");
        let document = page("d1");
        request.enqueue_upsert(document.clone(), false);

        assert_eq!(request.pending_count(), 1);
        let lines = lines(&request.to_ndjson().unwrap());
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            json!({ "index": { "_type": "Acme-Site-Page", "_id": "d1" } })
        );
        assert_eq!(lines[1], Value::Object(document.fields));
    }

    #[test]
    fn test_fulltext_root_becomes_merge() {
        let mut request = BulkRequest::new("acme");
        request.enqueue_upsert(page("d1"), true);

        let operation = &request.operations()[0];
        assert!(matches!(operation, BulkOperation::UpsertMerge { .. }));

        let lines = lines(&request.to_ndjson().unwrap());
        assert_eq!(
            lines[0],
            json!({ "update": { "_type": "Acme-Site-Page", "_id": "d1" } })
        );
        assert_eq!(
            lines[1]["params"]["newData"],
            json!({ "title": "Title d1", "hidden": false })
        );
        assert_eq!(
            lines[1]["upsert"],
            json!({ "title": "Title d1", "hidden": false, "__fulltext": {} })
        );
        let script = lines[1]["script"].as_str().unwrap();
        assert!(script.contains("ctx._source = params.newData"));
        assert!(script.contains("\"__fulltext\""));
    }

    #[test]
    fn test_merge_script_text() {
        assert_eq!(
            BulkOperation::merge_script("__fulltext"),
            "def reserved = ctx._source.containsKey(\"__fulltext\") ? ctx._source[\"__fulltext\"] : [:]; \
             ctx._source = params.newData; \
             ctx._source[\"__fulltext\"] = reserved"
        );
    }

    #[test]
    fn test_merge_drops_reserved_field_from_new_data() {
        let mut request = BulkRequest::new("acme").with_reserved_field("__text");
        request.enqueue_upsert(page("d1").with_field("__text", "stale"), true);

        let BulkOperation::UpsertMerge {
            new_data,
            reserved_field,
            ..
        } = &request.operations()[0]
        else {
            panic!("expected merge");
        };
        assert_eq!(reserved_field, "__text");
        assert!(!new_data.contains_key("__text"));
    }

    #[test]
    fn test_delete_has_no_body_and_keeps_order() {
        let mut request = BulkRequest::new("acme");
        request.enqueue_upsert(page("d1"), false);
        request.enqueue_delete("Acme-Site-Page", "d1");

        let lines = lines(&request.to_ndjson().unwrap());
        assert_eq!(lines.len(), 3);
        assert!(lines[0].get("index").is_some());
        assert_eq!(
            lines[2],
            json!({ "delete": { "_type": "Acme-Site-Page", "_id": "d1" } })
        );
    }

    #[test]
    fn test_parse_structured_response() {
        let operations = vec![
            BulkOperation::Delete {
                kind: "Acme-Site-Page".to_string(),
                id: "d1".to_string(),
            },
            BulkOperation::Delete {
                kind: "Acme-Site-Page".to_string(),
                id: "d2".to_string(),
            },
        ];
        let response = json!({
            "took": 3,
            "errors": true,
            "items": [
                { "delete": { "_id": "d1", "status": 200 } },
                { "delete": { "status": 404, "error": { "type": "x", "reason": "not found" } } },
            ]
        })
        .to_string();

        let failures = parse_bulk_response(&response, &operations);
        assert_eq!(
            failures,
            vec![FailedOperation {
                position: 1,
                action: "delete".to_string(),
                kind: Some("Acme-Site-Page".to_string()),
                id: Some("d2".to_string()),
                status: Some(404),
                reason: "not found".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_response_without_errors() {
        let response = r#"{"took":1,"errors":false,"items":[{"index":{"_id":"d1","status":201}}]}"#;
        assert!(parse_bulk_response(response, &[]).is_empty());
    }

    #[test]
    fn test_parse_unstructured_response_scans_lines() {
        let response = "ok\n{\"error\": \"boom\"}\nok";
        let failures = parse_bulk_response(response, &[]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].position, 1);
        assert_eq!(failures[0].reason, "{\"error\": \"boom\"}");
    }

    #[tokio::test]
    async fn test_flush_empty_is_noop() {
        let engine = MockSearchEngine::new();
        let mut request = BulkRequest::new("acme");

        let result = request.flush(&engine).await.unwrap();
        assert_eq!(result, FlushResult::default());
        assert!(engine.requests().is_empty());
    }

    #[tokio::test]
    async fn test_flush_clears_on_success() {
        let engine = MockSearchEngine::new().with_index("acme-1");
        let mut request = BulkRequest::new("acme-1");
        request.enqueue_upsert(page("d1"), false);
        request.enqueue_upsert(page("d2"), false);

        let result = request.flush(&engine).await.unwrap();
        assert_eq!(result.submitted, 2);
        assert!(result.is_success());
        assert!(request.is_empty());
        assert_eq!(engine.document_count("acme-1"), 2);
    }

    #[tokio::test]
    async fn test_flush_keeps_operations_on_transport_failure() {
        let engine = MockSearchEngine::new().with_index("acme-1");
        engine.set_offline(true);

        let mut request = BulkRequest::new("acme-1");
        request.enqueue_upsert(page("d1"), false);
        request.enqueue_delete("Acme-Site-Page", "d0");

        let err = request.flush(&engine).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(request.pending_count(), 2);

        engine.set_offline(false);
        let result = request.flush(&engine).await.unwrap();
        assert_eq!(result.submitted, 2);
        assert!(request.is_empty());
    }

    #[tokio::test]
    async fn test_flush_reports_partial_failure_and_clears() {
        let engine = MockSearchEngine::new().with_index("acme-1");
        engine.fail_document("d2");

        let mut request = BulkRequest::new("acme-1");
        for id in ["d1", "d2", "d3"] {
            request.enqueue_upsert(page(id), false);
        }

        let result = request.flush(&engine).await.unwrap();
        assert!(request.is_empty());
        assert_eq!(result.succeeded(), 2);

        let partial = result.partial_failure().unwrap();
        assert_eq!(partial.failed_ids(), vec!["d2"]);
        assert!(result.into_result().is_err());
        assert_eq!(engine.document_count("acme-1"), 2);
    }

    #[tokio::test]
    async fn test_partial_failure_propagates_with_question_mark() {
        async fn flush_all(request: &mut BulkRequest, engine: &MockSearchEngine) -> Result<usize, SearchError> {
            Ok(request.flush(engine).await?.into_result()?)
        }

        let engine = MockSearchEngine::new().with_index("acme-1");
        engine.fail_document("d1");
        let mut request = BulkRequest::new("acme-1");
        request.enqueue_upsert(page("d1"), true);
        request.enqueue_upsert(page("d2"), true);

        let err = flush_all(&mut request, &engine).await.unwrap_err();
        let SearchError::PartialFlush(partial) = err else {
            panic!("expected a partial flush, got {err:?}");
        };
        assert_eq!(partial.failed_ids(), vec!["d1"]);
        assert_eq!(engine.document_count("acme-1"), 1);
    }
}
