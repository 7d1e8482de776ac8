//! Scripted transport shared by the integration tests

use assetlink::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use async_trait::async_trait;
use hyper::StatusCode;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Which path of the transport a request went through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Site,
    Storage,
}

/// Replays queued responses in order and records every request
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<(Route, HttpRequest)>>,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, status: StatusCode, body: impl Into<bytes::Bytes>) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(HttpResponse::new(status, body));
        self
    }

    pub fn push_json(&self, status: StatusCode, body: Value) -> &Self {
        self.push(status, body.to_string())
    }

    pub fn requests(&self) -> Vec<(Route, HttpRequest)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self, route: Route, request: HttpRequest) -> HttpResponse {
        self.requests.lock().unwrap().push((route, request));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("transport called more often than scripted")
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        Ok(self.next(Route::Site, request))
    }

    async fn send_storage(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        Ok(self.next(Route::Storage, request))
    }
}

/// Decode the `requests` field of a form-encoded CRUD body
#[allow(dead_code)]
pub fn crud_requests(request: &HttpRequest) -> Value {
    let body = String::from_utf8(request.body.to_vec()).unwrap();
    let encoded = body
        .split('&')
        .find_map(|pair| pair.strip_prefix("requests="))
        .expect("CRUD body without requests field");
    let json = urlencoding::decode(encoded).unwrap();
    serde_json::from_str(&json).unwrap()
}
