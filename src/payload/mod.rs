//! CRUD request payloads
//!
//! Every operation is sent as a one-element array of [`Payload`] wrapped in a
//! form-encoded [`CrudEnvelope`]. Optional clauses are omitted entirely when
//! empty so the server can tell "not provided" from "provided empty".

pub mod shape;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::filter::{self, FilterNode};

pub use shape::{extract_message, extract_payload, extract_rows, group_by};

/// CRUD verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Create,
    Read,
    Update,
    Delete,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

/// Sort clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub column: String,
    pub direction: Direction,
}

impl Sort {
    pub fn new(column: impl Into<String>, direction: Direction) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }
}

/// Grouping clause, e.g. `{"column": "entity", "method": "exact", "direction": "asc"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grouping {
    pub column: String,
    pub method: String,
    pub direction: String,
}

/// Paging request. Both fields optional; the server picks defaults
/// (page sizes are bounded server-side, commonly 50-200).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paging {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl Paging {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
        }
    }
}

/// One CRUD operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    pub request_type: RequestType,
    pub entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sorts: Option<Vec<Sort>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouping: Option<Vec<Grouping>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paging: Option<Paging>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_setting: Option<Value>,
}

impl Payload {
    fn bare(request_type: RequestType, entity_type: &str) -> Self {
        Self {
            request_type,
            entity_type: entity_type.to_string(),
            columns: None,
            filters: None,
            sorts: None,
            grouping: None,
            paging: None,
            data: None,
            filter_setting: None,
        }
    }
}

/// Read parameters for [`build_read`]
#[derive(Debug, Clone, Default)]
pub struct ReadQuery {
    pub columns: Vec<String>,
    /// Filter DSL expression, compiled with [`filter::compile`]
    pub filters: Option<Value>,
    pub sorts: Vec<Sort>,
    pub grouping: Vec<Grouping>,
    pub paging: Paging,
    /// Opaque filter settings, e.g. `{"recycle": {"method": "exclude"}}`
    pub additional_filters: Option<Value>,
}

impl ReadQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filters(mut self, filters: Value) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sorts.push(sort);
        self
    }

    pub fn with_grouping(mut self, grouping: Grouping) -> Self {
        self.grouping.push(grouping);
        self
    }

    pub fn with_paging(mut self, paging: Paging) -> Self {
        self.paging = paging;
        self
    }

    pub fn with_additional_filters(mut self, additional: Value) -> Self {
        self.additional_filters = Some(additional);
        self
    }
}

/// JSON "falsy" check used to drop empty clauses
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Bool(b) => !b,
        Value::Number(_) => false,
    }
}

/// Build a create/update/delete payload. `data` must be non-empty.
pub fn build_crud(
    request_type: RequestType,
    entity_type: &str,
    columns: &[String],
    data: Vec<Value>,
) -> Result<Vec<Payload>> {
    if request_type == RequestType::Read {
        return Err(ApiError::InvalidPayload(
            "read payloads are built with build_read".to_string(),
        ));
    }
    if data.is_empty() {
        return Err(ApiError::InvalidPayload(format!(
            "{:?} on {} requires data",
            request_type, entity_type
        )));
    }

    let mut payload = Payload::bare(request_type, entity_type);
    if !columns.is_empty() {
        payload.columns = Some(columns.to_vec());
    }
    payload.data = Some(data);
    Ok(vec![payload])
}

/// Build a read payload. `paging` is always sent, possibly as `{}`.
pub fn build_read(entity_type: &str, query: &ReadQuery) -> Result<Vec<Payload>> {
    let mut payload = Payload::bare(RequestType::Read, entity_type);

    if !query.columns.is_empty() {
        payload.columns = Some(query.columns.clone());
    }
    if let Some(expr) = query.filters.as_ref().filter(|expr| !is_blank(expr)) {
        payload.filters = Some(filter::compile(expr)?);
    }
    if !query.sorts.is_empty() {
        payload.sorts = Some(query.sorts.clone());
    }
    if !query.grouping.is_empty() {
        payload.grouping = Some(query.grouping.clone());
    }
    payload.paging = Some(query.paging.clone());
    if let Some(additional) = query.additional_filters.as_ref().filter(|v| !is_blank(v)) {
        payload.filter_setting = Some(additional.clone());
    }

    Ok(vec![payload])
}

/// Form-encoded CRUD request body
#[derive(Debug, Clone, PartialEq)]
pub struct CrudEnvelope {
    pub request_id: u64,
    /// JSON array of payloads, serialized as a string
    pub requests: String,
    pub async_mode: bool,
}

impl CrudEnvelope {
    pub fn new(payloads: &[Payload], async_mode: bool) -> Result<Self> {
        Ok(Self {
            request_id: next_request_id(),
            requests: serde_json::to_string(payloads)?,
            async_mode,
        })
    }

    /// `requestId=..&requests=..&async=true|false`
    pub fn encode(&self) -> String {
        format!(
            "requestId={}&requests={}&async={}",
            self.request_id,
            urlencoding::encode(&self.requests),
            self.async_mode
        )
    }
}

/// Random request id scaled by the current unix time
fn next_request_id() -> u64 {
    let now = chrono::Utc::now().timestamp().max(1) as f64;
    let factor: f64 = rand::thread_rng().gen();
    (factor * now).floor() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_crud_omits_empty_columns() {
        let payloads = build_crud(
            RequestType::Create,
            "Task",
            &[],
            vec![json!({"name": "Layout", "status": "wtg"})],
        )
        .unwrap();

        assert_eq!(payloads.len(), 1);
        assert_eq!(
            serde_json::to_value(&payloads).unwrap(),
            json!([{
                "request_type": "create",
                "entity_type": "Task",
                "data": [{"name": "Layout", "status": "wtg"}]
            }])
        );
    }

    #[test]
    fn test_build_crud_requires_data() {
        let err = build_crud(RequestType::Delete, "Task", &[], vec![]).unwrap_err();
        assert!(matches!(err, ApiError::InvalidPayload(_)));

        let err = build_crud(RequestType::Read, "Task", &[], vec![json!({"id": 1})]).unwrap_err();
        assert!(matches!(err, ApiError::InvalidPayload(_)));
    }

    #[test]
    fn test_build_read_minimal_keeps_paging() {
        let payloads = build_read("Task", &ReadQuery::new()).unwrap();
        assert_eq!(
            serde_json::to_value(&payloads).unwrap(),
            json!([{"request_type": "read", "entity_type": "Task", "paging": {}}])
        );
    }

    #[test]
    fn test_build_read_full() {
        let query = ReadQuery::new()
            .with_columns(["id", "name"])
            .with_filters(json!(["project", "is", {"id": 1, "type": "Project"}]))
            .with_sort(Sort::new("name", Direction::Asc))
            .with_grouping(Grouping {
                column: "entity".to_string(),
                method: "exact".to_string(),
                direction: "asc".to_string(),
            })
            .with_paging(Paging::new(1, 5))
            .with_additional_filters(json!({"recycle": {"method": "exclude"}}));

        let payloads = build_read("Task", &query).unwrap();
        assert_eq!(
            serde_json::to_value(&payloads).unwrap(),
            json!([{
                "request_type": "read",
                "entity_type": "Task",
                "columns": ["id", "name"],
                "filters": {
                    "operator": "and",
                    "conditions": [{
                        "path": "project",
                        "relation": "is",
                        "values": [{"id": 1, "type": "Project"}]
                    }]
                },
                "sorts": [{"column": "name", "direction": "ASC"}],
                "grouping": [{"column": "entity", "method": "exact", "direction": "asc"}],
                "paging": {"page": 1, "page_size": 5},
                "filter_setting": {"recycle": {"method": "exclude"}}
            }])
        );
    }

    #[test]
    fn test_build_read_skips_blank_filters() {
        let query = ReadQuery::new().with_filters(json!({}));
        let payloads = build_read("Task", &query).unwrap();
        assert!(payloads[0].filters.is_none());

        let query = ReadQuery::new().with_filters(json!([]));
        let payloads = build_read("Task", &query).unwrap();
        assert!(payloads[0].filters.is_none());
    }

    #[test]
    fn test_build_read_propagates_malformed_filter() {
        let query = ReadQuery::new().with_filters(json!(["name", "is"]));
        let err = build_read("Task", &query).unwrap_err();
        assert!(matches!(err, ApiError::MalformedFilter(_)));
    }

    #[test]
    fn test_envelope_encoding() {
        let payloads = build_read("Task", &ReadQuery::new()).unwrap();
        let envelope = CrudEnvelope::new(&payloads, true).unwrap();
        let body = envelope.encode();

        assert!(body.starts_with(&format!("requestId={}&requests=", envelope.request_id)));
        assert!(body.ends_with("&async=true"));
        assert!(body.contains("%22request_type%22%3A%22read%22"));
    }
}
