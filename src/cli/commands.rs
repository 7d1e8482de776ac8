use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::api::Api;
use crate::payload::{Paging, ReadQuery};
use crate::task::AsyncTask;

/// Split a comma-separated field list, dropping blanks
pub fn parse_fields(fields: &str) -> Vec<String> {
    fields
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(String::from)
        .collect()
}

/// Parse a filter expression given as JSON
pub fn parse_filter(filter: &str) -> Result<Value> {
    serde_json::from_str(filter).with_context(|| format!("Filter is not valid JSON: {}", filter))
}

/// Parse an optional JSON argument such as a project or entity reference
pub fn parse_json_arg(name: &str, raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|raw| {
        serde_json::from_str(raw).with_context(|| format!("--{} is not valid JSON: {}", name, raw))
    })
    .transpose()
}

/// Format bytes in human-readable form (B, KB, MB, GB, TB)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exponent = (bytes_f64.ln() / 1024_f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);

    let value = bytes_f64 / 1024_f64.powi(exponent as i32);

    if exponent == 0 {
        format!("{} {}", bytes, UNITS[exponent])
    } else {
        format!("{:.2} {}", value, UNITS[exponent])
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn cmd_read(
    api: &Api,
    entity_type: &str,
    filter: Option<&str>,
    fields: Option<&str>,
    page: Option<u32>,
    page_size: Option<u32>,
) -> Result<()> {
    let mut query = ReadQuery::new().with_paging(Paging { page, page_size });
    if let Some(fields) = fields {
        query = query.with_columns(parse_fields(fields));
    }
    if let Some(filter) = filter {
        query = query.with_filters(parse_filter(filter)?);
    }

    let result = api
        .read(entity_type, &query)
        .await
        .with_context(|| format!("Failed to read {}", entity_type))?;
    print_json(&result)
}

pub async fn cmd_resolve(api: &Api, task_id: &str) -> Result<()> {
    let result = api
        .resolve_task(AsyncTask::new(task_id))
        .await
        .with_context(|| format!("Failed to resolve task {}", task_id))?;
    print_json(&result)
}

/// Poll until the task finishes; Ctrl-C stops polling
pub async fn cmd_poll(api: &Api, task_id: &str) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let result = api
        .poll_task(AsyncTask::new(task_id), &cancel)
        .await
        .with_context(|| format!("Failed to poll task {}", task_id))?;
    print_json(&result)
}

pub async fn cmd_upload(
    api: &Api,
    path: &Path,
    key: &str,
    project: Option<&str>,
    entity: Option<&str>,
) -> Result<()> {
    let project = parse_json_arg("project", project)?;
    let entity = parse_json_arg("entity", entity)?;
    let size = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Cannot read {}", path.display()))?
        .len();

    eprintln!("{} -> {} ({})", path.display(), key, format_bytes(size));
    let attachment = api
        .upload_attachment(path, key, project, entity)
        .await
        .with_context(|| format!("Failed to upload {}", path.display()))?;
    print_json(&attachment)
}
