//! High-level platform API shared by the CLI and library callers
//!
//! One transport and one credential cache are created per [`Api`] and shared by
//! every clone, so CRUD requests, task polling and storage uploads reuse the
//! same connection pool and session.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::crud::send_crud;
use crate::error::{ApiError, Result};
use crate::payload::{build_crud, build_read, extract_payload, ReadQuery, RequestType};
use crate::s3::{AckEndpoint, CredentialCache, StorageClient};
use crate::task::{AsyncTask, AsyncTaskClient};
use crate::transport::{HyperTransport, Transport};

const ENTITY_TYPE: &str = "EntityType";
const FIELD: &str = "Field";

/// Options for a new entity type. Everything except the name is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTypeSettings {
    pub name: String,
    pub help: String,
    pub can_read: bool,
    pub can_follow: bool,
    pub can_favor: bool,
    pub can_publish: bool,
    pub has_page: bool,
    pub has_notes: bool,
    pub has_project: bool,
    pub has_pipeline: bool,
    pub has_tags: bool,
    pub has_pipeline_config_cache: bool,
    pub has_versions: bool,
}

impl EntityTypeSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: String::new(),
            can_read: false,
            can_follow: false,
            can_favor: false,
            can_publish: false,
            has_page: true,
            has_notes: false,
            has_project: false,
            has_pipeline: false,
            has_tags: false,
            has_pipeline_config_cache: false,
            has_versions: false,
        }
    }
}

/// Check that every record satisfies `accept`, naming the requirement otherwise
fn require(data: &[Value], requirement: &str, accept: impl Fn(&Map<String, Value>) -> bool) -> Result<()> {
    if data.is_empty() {
        return Err(ApiError::InvalidPayload("data should not be empty".to_string()));
    }
    let ok = data
        .iter()
        .all(|record| record.as_object().map(&accept).unwrap_or(false));
    if ok {
        Ok(())
    } else {
        Err(ApiError::InvalidPayload(format!(
            "every record needs {}",
            requirement
        )))
    }
}

/// Platform client
///
/// Clone is cheap - transport, credential cache and task client are shared.
#[derive(Clone)]
pub struct Api {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    tasks: AsyncTaskClient,
    storage: StorageClient,
}

impl Api {
    /// Build an API client over the default hyper transport
    pub fn new(config: Config) -> Result<Self> {
        let transport = HyperTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build an API client over a caller-supplied transport
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        let ack = AckEndpoint::new(transport.clone(), config.ack_url());
        let credentials = Arc::new(CredentialCache::new(Arc::new(ack)));
        let storage = StorageClient::new(transport.clone(), credentials);
        let tasks = AsyncTaskClient::new(transport.clone(), &config);

        Self {
            config: Arc::new(config),
            transport,
            tasks,
            storage,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tasks(&self) -> &AsyncTaskClient {
        &self.tasks
    }

    pub fn storage(&self) -> &StorageClient {
        &self.storage
    }

    async fn request(&self, request_type: RequestType, entity_type: &str, data: Vec<Value>) -> Result<Value> {
        let payloads = build_crud(request_type, entity_type, &[], data)?;
        let response = send_crud(self.transport.as_ref(), &self.config.crud_url(), &payloads, false).await?;
        extract_payload(&response)
    }

    /// Read entities. A single object is returned when the server pages by one.
    pub async fn read(&self, entity_type: &str, query: &ReadQuery) -> Result<Value> {
        let payloads = build_read(entity_type, query)?;
        let response = send_crud(self.transport.as_ref(), &self.config.crud_url(), &payloads, false).await?;
        extract_payload(&response)
    }

    pub async fn create(&self, entity_type: &str, data: Vec<Value>) -> Result<Value> {
        self.request(RequestType::Create, entity_type, data).await
    }

    pub async fn update(&self, entity_type: &str, data: Vec<Value>) -> Result<Value> {
        self.request(RequestType::Update, entity_type, data).await
    }

    pub async fn delete(&self, entity_type: &str, data: Vec<Value>) -> Result<Value> {
        self.request(RequestType::Delete, entity_type, data).await
    }

    async fn submit_schema(&self, request_type: RequestType, entity_type: &str, data: Vec<Value>) -> Result<AsyncTask> {
        let payloads = build_crud(request_type, entity_type, &[], data)?;
        self.tasks.submit(&payloads).await
    }

    // Schema changes run server-side as tasks

    pub async fn create_entity_type(&self, data: Vec<Value>) -> Result<AsyncTask> {
        require(&data, "'name'", |r| r.contains_key("name"))?;
        self.submit_schema(RequestType::Create, ENTITY_TYPE, data).await
    }

    /// Create an entity type from typed settings
    pub async fn create_entity_type_with(&self, settings: &EntityTypeSettings) -> Result<AsyncTask> {
        self.create_entity_type(vec![serde_json::to_value(settings)?])
            .await
    }

    pub async fn update_entity_type(&self, data: Vec<Value>) -> Result<AsyncTask> {
        require(&data, "'id' or 'name'", |r| {
            r.contains_key("id") || r.contains_key("name")
        })?;
        self.submit_schema(RequestType::Update, ENTITY_TYPE, data).await
    }

    pub async fn delete_entity_type(&self, data: Vec<Value>) -> Result<AsyncTask> {
        require(&data, "'id'", |r| r.contains_key("id"))?;
        self.submit_schema(RequestType::Delete, ENTITY_TYPE, data).await
    }

    pub async fn create_field(&self, data: Vec<Value>) -> Result<AsyncTask> {
        require(&data, "'entity_type', 'name' and 'data_type'", |r| {
            r.contains_key("entity_type") && r.contains_key("name") && r.contains_key("data_type")
        })?;
        self.submit_schema(RequestType::Create, FIELD, data).await
    }

    pub async fn update_field(&self, data: Vec<Value>) -> Result<AsyncTask> {
        require(&data, "either 'entity_type' and 'name' or 'id'", |r| {
            (r.contains_key("entity_type") && r.contains_key("name")) || r.contains_key("id")
        })?;
        self.submit_schema(RequestType::Update, FIELD, data).await
    }

    pub async fn delete_field(&self, data: Vec<Value>) -> Result<AsyncTask> {
        require(&data, "'id'", |r| r.contains_key("id"))?;
        self.submit_schema(RequestType::Delete, FIELD, data).await
    }

    pub async fn resolve_task(&self, task: AsyncTask) -> Result<Value> {
        self.tasks.resolve(task).await
    }

    pub async fn poll_task(&self, task: AsyncTask, cancel: &CancellationToken) -> Result<Value> {
        self.tasks.poll(task, cancel).await
    }

    /// Upload a file to object storage and record it as an `Attachment`.
    ///
    /// When `entity` (e.g. `{"id": 1, "type": "Version"}`) is given, an
    /// `AttachmentLink` to it is created as well. Returns the attachment record
    /// tagged with `"type": "Attachment"`.
    pub async fn upload_attachment(
        &self,
        path: &Path,
        key: &str,
        project: Option<Value>,
        entity: Option<Value>,
    ) -> Result<Value> {
        let file_size = self.storage.upload_file(key, path).await?;

        let original_fname = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let key_path = Path::new(key);
        let filename = key_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let display_name = key_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_extension = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        let created = self
            .create(
                "Attachment",
                vec![json!({
                    "this_file": key,
                    "filename": filename,
                    "display_name": display_name,
                    "original_fname": original_fname,
                    "file_extension": file_extension,
                    "file_size": file_size,
                    "thumbnail": "",
                    "status": "act",
                    "project": project.unwrap_or(Value::Null),
                    "attachment_type": "cloud",
                })],
            )
            .await?;

        let mut attachment = match created {
            Value::Array(mut rows) if !rows.is_empty() => rows.swap_remove(0),
            Value::Object(row) => Value::Object(row),
            other => {
                return Err(ApiError::UnknownError(format!(
                    "attachment creation returned no record: {}",
                    other
                )))
            }
        };
        if let Value::Object(row) = &mut attachment {
            row.insert("type".to_string(), Value::String("Attachment".to_string()));
        }

        if let Some(entity) = entity {
            self.create(
                "AttachmentLink",
                vec![json!({ "attachment": attachment.clone(), "entity": entity })],
            )
            .await?;
        }

        tracing::info!(key = key, size = file_size, "attachment uploaded");
        Ok(attachment)
    }
}
