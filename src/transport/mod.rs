//! HTTP transport seam
//!
//! The core never talks to the network directly. Site requests (CRUD, task
//! status, credential refresh) and storage requests go through a [`Transport`],
//! which owns the session cookies, CSRF header, connection pool and the
//! storage-only retry policy. [`HyperTransport`] is the default implementation.

pub mod http_client;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::{Method, StatusCode};
use std::time::Duration;
use thiserror::Error;

pub use http_client::HyperTransport;

/// Transport-level failures, passed through the core unchanged
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("Client error: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

/// Outgoing request; header names keep their case for transmission
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Fully collected response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// HTTP collaborator used by the task client, credential cache and storage client
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request to the platform site. Implementations attach the
    /// session cookie and CSRF header. Never retried.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Send an already-signed request to the object-storage endpoint.
    /// Implementations may retry 5xx responses a bounded number of times.
    async fn send_storage(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
