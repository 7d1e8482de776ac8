//! Response decoding and result shaping

use serde_json::{json, Value};

use crate::error::{ApiError, Result};

/// Rows of a successful operation.
///
/// Returns the single row object instead of a one-element array when the
/// response paging says `page_size == 1` and rows are present. Callers rely on
/// that asymmetry.
pub fn extract_rows(payload: &Value) -> Value {
    let rows = payload.get("rows").cloned().unwrap_or(Value::Null);
    let page_size = payload
        .get("paging")
        .and_then(|paging| paging.get("page_size"))
        .and_then(Value::as_u64);

    match (&rows, page_size) {
        (Value::Array(items), Some(1)) if !items.is_empty() => items[0].clone(),
        _ => rows,
    }
}

/// Attach rows to the server's group descriptors.
///
/// Groups keep server order. For each id, the first row with that `id` not
/// already attached to a group is taken; unmatched ids are skipped.
pub fn group_by(payload: &Value) -> Value {
    let empty = Vec::new();
    let rows = payload
        .get("rows")
        .and_then(Value::as_array)
        .unwrap_or(&empty);
    let groups = payload
        .get("groups")
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    let mut taken = vec![false; rows.len()];
    let mut grouped = Vec::with_capacity(groups.len());

    for group in groups {
        let mut children = Vec::new();
        let ids = group.get("ids").and_then(Value::as_array).unwrap_or(&empty);
        for id in ids {
            let found = rows
                .iter()
                .enumerate()
                .find(|(idx, row)| !taken[*idx] && row.get("id") == Some(id));
            if let Some((idx, row)) = found {
                taken[idx] = true;
                children.push(row.clone());
            }
        }
        grouped.push(json!({
            "display_name": group.get("display_name").cloned().unwrap_or(Value::Null),
            "children": children,
        }));
    }

    Value::Array(grouped)
}

/// Human-readable server message: a string, the `detail` of an object,
/// or the raw JSON otherwise.
pub fn extract_message(message: Option<&Value>) -> String {
    match message {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(map)) if map.contains_key("detail") => match map.get("detail") {
            Some(Value::String(detail)) => detail.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        },
        Some(other) => other.to_string(),
        None => Value::Null.to_string(),
    }
}

/// Error for a result entry that reported failure.
///
/// A failure without a `message` (absent or null) carries no detail and is an
/// `UnknownError`; otherwise the extracted message is a `RequestFailed`.
pub fn failure(entry: &Value) -> ApiError {
    match entry.get("message") {
        None | Some(Value::Null) => {
            ApiError::UnknownError("server reported failure without a message".to_string())
        }
        message => ApiError::RequestFailed(extract_message(message)),
    }
}

fn is_empty_entry(entry: Option<&Value>) -> bool {
    match entry {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    }
}

/// Decode the first operation result of a CRUD response array
pub fn extract_payload(response: &Value) -> Result<Value> {
    let entry = match response {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    let Some(entry) = entry.filter(|entry| !is_empty_entry(Some(*entry))) else {
        return Err(ApiError::UnknownError(
            "expected a failure detail but the payload is empty".to_string(),
        ));
    };

    if !is_success(entry) {
        return Err(failure(entry));
    }

    let has_groups = entry
        .get("groups")
        .map(|groups| !is_empty_entry(Some(groups)))
        .unwrap_or(false);
    if has_groups {
        Ok(group_by(entry))
    } else {
        Ok(extract_rows(entry))
    }
}

/// Decode the body of a response that carried an HTTP error status
pub fn decode_error_body(body: &[u8]) -> ApiError {
    let parsed: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => {
            return ApiError::UnknownError(format!(
                "error response without structured detail: {}",
                String::from_utf8_lossy(body)
            ))
        }
    };
    let entry = match &parsed {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    let Some(entry) = entry.filter(|entry| !is_empty_entry(Some(*entry))) else {
        return ApiError::UnknownError(
            "expected a failure detail but the payload is empty".to_string(),
        );
    };
    if is_success(entry) {
        return ApiError::UnknownError(
            "server reported success on an error status".to_string(),
        );
    }
    failure(entry)
}

pub(crate) fn is_success(entry: &Value) -> bool {
    entry.get("success").and_then(Value::as_bool).unwrap_or(false)
}
