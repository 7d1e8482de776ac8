//! CRUD wire exchange: form-encoded envelope out, JSON document back

use serde_json::Value;

use crate::error::Result;
use crate::payload::shape::decode_error_body;
use crate::payload::{CrudEnvelope, Payload};
use crate::transport::{HttpRequest, Transport};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// POST payloads to the CRUD endpoint and return the decoded JSON body.
///
/// Error statuses are decoded into `RequestFailed` / `UnknownError`.
/// Nothing is retried here.
pub async fn send_crud(
    transport: &dyn Transport,
    url: &str,
    payloads: &[Payload],
    async_mode: bool,
) -> Result<Value> {
    let envelope = CrudEnvelope::new(payloads, async_mode)?;
    let request = HttpRequest::post(url, envelope.encode())
        .with_header("Content-Type", FORM_CONTENT_TYPE);

    tracing::debug!(
        request_id = envelope.request_id,
        async_mode = async_mode,
        operations = payloads.len(),
        "crud request"
    );

    let response = transport.send(request).await?;
    if !response.status.is_success() {
        return Err(decode_error_body(&response.body));
    }
    Ok(serde_json::from_slice(&response.body)?)
}
