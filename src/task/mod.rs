//! Asynchronous task lifecycle
//!
//! Long-running operations are submitted with `async=true`; the server answers
//! with an opaque task id. The task endpoint then answers `202 Accepted` while
//! the task is running and any other status once it is done:
//!
//! ```text
//! Submitted --poll--> Polling --(non-202)--> Succeeded | Failed
//! ```
//!
//! Polling is bounded by an attempt cap and can be cancelled by the caller.

use hyper::StatusCode;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::crud::send_crud;
use crate::error::{ApiError, Result};
use crate::payload::shape::{decode_error_body, extract_payload, failure, is_success};
use crate::payload::Payload;
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// Status the task endpoint returns while the task is still running
pub const STILL_RUNNING: StatusCode = StatusCode::ACCEPTED;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Submitted,
    Polling,
    Succeeded,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Submitted => "submitted",
            TaskState::Polling => "polling",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Handle to a submitted task. Consumed by [`AsyncTaskClient::poll`] or
/// [`AsyncTaskClient::resolve`]; the id is the only durable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncTask {
    task_id: String,
}

impl AsyncTask {
    /// Rebuild a handle from an id persisted elsewhere
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.task_id
    }
}

impl fmt::Display for AsyncTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.task_id)
    }
}

/// Submit/poll/resolve driver for server-side tasks
#[derive(Clone)]
pub struct AsyncTaskClient {
    transport: Arc<dyn Transport>,
    crud_url: String,
    task_url: String,
    poll_interval: Duration,
    max_attempts: u32,
}

impl AsyncTaskClient {
    pub fn new(transport: Arc<dyn Transport>, config: &Config) -> Self {
        Self {
            transport,
            crud_url: config.crud_url(),
            task_url: config.task_url(),
            poll_interval: config.polling.interval(),
            max_attempts: config.polling.max_attempts.max(1),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Send payloads as a background task and return its handle
    pub async fn submit(&self, payloads: &[Payload]) -> Result<AsyncTask> {
        let response = send_crud(self.transport.as_ref(), &self.crud_url, payloads, true).await?;

        if !is_success(&response) {
            return Err(failure(&response));
        }

        let task_id = match response.get("task_id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(ApiError::UnknownError(
                    "submit succeeded without a task id".to_string(),
                ))
            }
        };

        info!(task_id = %task_id, state = %TaskState::Submitted, "task submitted");
        Ok(AsyncTask { task_id })
    }

    async fn status_request(&self, task: &AsyncTask) -> Result<HttpResponse> {
        let body = serde_json::to_vec(&json!({ "task_id": task.task_id }))?;
        let request = HttpRequest::post(self.task_url.clone(), body)
            .with_header("Content-Type", "application/json");
        Ok(self.transport.send(request).await?)
    }

    /// Decode a terminal status response
    fn decode_terminal(task: &AsyncTask, response: &HttpResponse) -> Result<Value> {
        if !response.status.is_success() {
            return Err(decode_error_body(&response.body));
        }

        let payload: Value = serde_json::from_slice(&response.body)?;
        if !is_success(&payload) {
            warn!(task_id = %task.task_id, state = %TaskState::Failed, "task failed");
            return Err(failure(&payload));
        }

        let data = payload.get("data").cloned().unwrap_or(Value::Null);
        let result = extract_payload(&data);
        match &result {
            Ok(_) => debug!(task_id = %task.task_id, state = %TaskState::Succeeded, "task finished"),
            Err(e) => warn!(task_id = %task.task_id, state = %TaskState::Failed, error = %e, "task failed"),
        }
        result
    }

    /// Check the task once. A task that is still running is a `RequestFailed`.
    pub async fn resolve(&self, task: AsyncTask) -> Result<Value> {
        let response = self.status_request(&task).await?;
        if response.status == STILL_RUNNING {
            return Err(ApiError::RequestFailed(format!(
                "task {} is not finished",
                task.task_id
            )));
        }
        Self::decode_terminal(&task, &response)
    }

    /// Check the task until it leaves the running state, sleeping the poll
    /// interval between checks.
    ///
    /// Gives up with `PollLimitExceeded` after the configured number of checks
    /// and with `Cancelled` as soon as `cancel` fires.
    pub async fn poll(&self, task: AsyncTask, cancel: &CancellationToken) -> Result<Value> {
        let cancelled = |task: &AsyncTask| ApiError::Cancelled {
            task_id: task.task_id.clone(),
        };

        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return Err(cancelled(&task));
            }

            let response = self.status_request(&task).await?;
            if response.status != STILL_RUNNING {
                return Self::decode_terminal(&task, &response);
            }

            debug!(
                task_id = %task.task_id,
                state = %TaskState::Polling,
                attempt = attempt,
                "task still running"
            );
            if attempt == self.max_attempts {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled(&task)),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        Err(ApiError::PollLimitExceeded {
            task_id: task.task_id,
            attempts: self.max_attempts,
        })
    }
}
