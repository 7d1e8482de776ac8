//! Direct object-storage reads and writes
//!
//! Each call fetches credentials from the shared [`CredentialCache`] (refreshing
//! them if stale), signs a fresh request and hands it to the transport, whose
//! storage path owns the 5xx retry policy.

use bytes::Bytes;
use chrono::Utc;
use hyper::Method;
use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use super::credentials::{CredentialCache, StorageCredentials};
use super::signer::{self, SignedRequest};
use crate::error::{ApiError, Result};
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// Hex lookup table for URI encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Object-storage client for `/<bucket>/<key>` objects
///
/// Clone is cheap - transport and credential cache are shared.
#[derive(Clone)]
pub struct StorageClient {
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialCache>,
}

impl StorageClient {
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<CredentialCache>) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialCache> {
        &self.credentials
    }

    /// Encode an object key, preserving forward slashes
    /// Returns Cow::Borrowed when no encoding is needed
    fn encode_key(key: &str) -> Cow<'_, str> {
        let needs_encoding = key
            .bytes()
            .any(|b| !matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/'));

        if !needs_encoding {
            return Cow::Borrowed(key);
        }

        let mut result = String::with_capacity(key.len() + 32);
        for byte in key.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                    result.push(byte as char);
                }
                _ => {
                    result.push('%');
                    result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                    result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
                }
            }
        }
        Cow::Owned(result)
    }

    /// `/<bucket>/<encoded key>`
    pub fn object_path(bucket: &str, key: &str) -> String {
        let key = key.trim_start_matches('/');
        format!("/{}/{}", bucket, Self::encode_key(key))
    }

    fn into_http(credentials: &StorageCredentials, signed: SignedRequest) -> Result<HttpRequest> {
        let method = Method::from_bytes(signed.method.as_bytes())
            .map_err(|e| ApiError::InvalidPayload(format!("invalid method: {}", e)))?;
        Ok(HttpRequest {
            method,
            url: format!(
                "{}://{}{}",
                credentials.scheme(),
                credentials.endpoint,
                signed.path
            ),
            headers: signed.headers,
            body: signed.body,
        })
    }

    async fn execute(&self, method: &str, key: &str, body: Bytes) -> Result<HttpResponse> {
        let now = Utc::now();
        let credentials = self.credentials.get(now).await?;
        let path = Self::object_path(&credentials.bucket, key);
        let signed = signer::sign(&credentials, method, &path, body, now)?;
        let request = Self::into_http(&credentials, signed)?;

        let response = self.transport.send_storage(request).await?;
        if !response.status.is_success() {
            return Err(ApiError::Storage {
                status: response.status,
                message: String::from_utf8_lossy(&response.body).to_string(),
            });
        }
        Ok(response)
    }

    /// Upload bytes to `key`
    pub async fn put_object(&self, key: &str, body: Bytes) -> Result<()> {
        let size = body.len();
        self.execute("PUT", key, body).await?;
        tracing::debug!(key = key, size = size, "object uploaded");
        Ok(())
    }

    /// Download the object at `key`
    pub async fn get_object(&self, key: &str) -> Result<Bytes> {
        let response = self.execute("GET", key, Bytes::new()).await?;
        Ok(response.body)
    }

    /// Upload a local file; returns its size
    pub async fn upload_file(&self, key: &str, path: &Path) -> Result<u64> {
        let data = tokio::fs::read(path).await?;
        let size = data.len() as u64;
        self.put_object(key, Bytes::from(data)).await?;
        Ok(size)
    }

    /// Download `key` into a local file; returns the number of bytes written
    pub async fn download_file(&self, key: &str, path: &Path) -> Result<u64> {
        let data = self.get_object(key).await?;
        tokio::fs::write(path, &data).await?;
        Ok(data.len() as u64)
    }
}
