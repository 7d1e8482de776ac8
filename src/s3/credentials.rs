//! Temporary object-storage credentials and their refresh cache

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{ApiError, Result};
use crate::payload::shape::decode_error_body;
use crate::transport::{HttpRequest, Transport};

/// Session-scoped storage credentials issued by the platform
#[derive(Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    /// Storage host, optionally with port (`host[:port]`)
    pub endpoint: String,
    /// Use https when true
    pub secure: bool,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl std::fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("endpoint", &self.endpoint)
            .field("secure", &self.secure)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

impl StorageCredentials {
    /// Credentials must not be used at or after their expiration
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AckKeys {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: DateTime<Utc>,
}

/// Body returned by the credential endpoint
#[derive(Debug, Deserialize)]
struct AckResponse {
    #[serde(rename = "EndPoint")]
    endpoint: String,
    #[serde(rename = "Secure", default)]
    secure: bool,
    #[serde(rename = "Bucket")]
    bucket: String,
    #[serde(rename = "Region")]
    region: String,
    ack: AckKeys,
}

impl From<AckResponse> for StorageCredentials {
    fn from(resp: AckResponse) -> Self {
        Self {
            endpoint: resp.endpoint,
            secure: resp.secure,
            bucket: resp.bucket,
            region: resp.region,
            access_key: resp.ack.access_key_id,
            secret_key: resp.ack.secret_access_key,
            session_token: resp.ack.session_token,
            expiration: resp.ack.expiration,
        }
    }
}

/// Where fresh credentials come from
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch(&self) -> Result<StorageCredentials>;
}

/// Fetches credentials from the platform's `cloud/ack` endpoint
pub struct AckEndpoint {
    transport: Arc<dyn Transport>,
    url: String,
}

impl AckEndpoint {
    pub fn new(transport: Arc<dyn Transport>, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for AckEndpoint {
    async fn fetch(&self) -> Result<StorageCredentials> {
        let response = self
            .transport
            .send(HttpRequest::post(self.url.clone(), bytes::Bytes::new()))
            .await?;
        if !response.status.is_success() {
            return Err(decode_error_body(&response.body));
        }

        let mut value: serde_json::Value = serde_json::from_slice(&response.body)?;
        // Some deployments wrap the document in a "payload" member
        if let Some(inner) = value.get_mut("payload").map(serde_json::Value::take) {
            value = inner;
        }
        let ack: AckResponse = serde_json::from_value(value)?;
        Ok(ack.into())
    }
}

/// Process-wide holder of the current storage credentials.
///
/// Refreshes are single-flight: concurrent callers that find the entry stale
/// queue on one guard, and only the first one talks to the source.
pub struct CredentialCache {
    source: Arc<dyn CredentialSource>,
    current: RwLock<Option<StorageCredentials>>,
    refresh_guard: Mutex<()>,
}

impl CredentialCache {
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            current: RwLock::new(None),
            refresh_guard: Mutex::new(()),
        }
    }

    #[cfg(test)]
    async fn store(&self, credentials: StorageCredentials) {
        *self.current.write().await = Some(credentials);
    }

    async fn fresh(&self, now: DateTime<Utc>) -> Option<StorageCredentials> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|creds| !creds.is_expired_at(now))
            .cloned()
    }

    /// Credentials valid at `now`, refreshing at most once per stale period
    pub async fn get(&self, now: DateTime<Utc>) -> Result<StorageCredentials> {
        if let Some(creds) = self.fresh(now).await {
            return Ok(creds);
        }

        let _guard = self.refresh_guard.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(creds) = self.fresh(now).await {
            debug!("storage credentials refreshed by a concurrent caller");
            return Ok(creds);
        }

        let creds = self.source.fetch().await?;
        if creds.is_expired_at(now) {
            return Err(ApiError::CredentialsExpired {
                expiration: creds.expiration,
            });
        }
        info!(
            endpoint = %creds.endpoint,
            bucket = %creds.bucket,
            expiration = %creds.expiration,
            "storage credentials refreshed"
        );
        *self.current.write().await = Some(creds.clone());
        Ok(creds)
    }
}
