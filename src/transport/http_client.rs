//! hyper-based [`Transport`]
//!
//! - HTTP/1.1 pooled client over native-tls
//! - session cookie and CSRF header on every site request
//! - storage requests retried on 5xx with exponential backoff + jitter

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use rand::Rng;
use std::time::Duration;

use super::{HttpRequest, HttpResponse, Transport, TransportError};
use crate::config::Config;

const USER_AGENT: &str = concat!("assetlink/", env!("CARGO_PKG_VERSION"));
const CSRF_HEADER: &str = "X-CSRFToken";

/// Default transport built on hyper
///
/// Clone is cheap - the underlying HTTP client uses Arc internally.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    site_url: String,
    session_id: Option<String>,
    csrf_token: Option<String>,
    request_timeout: Duration,
    storage_timeout: Duration,
    storage_attempts: u32,
    backoff_base: Duration,
}

impl HyperTransport {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(10)));
        http.set_keepalive(Some(Duration::from_secs(90)));

        let tls = TlsConnector::new()?;
        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(config.storage.max_idle_per_host)
            .set_host(true)
            .build(https);

        Ok(Self {
            client,
            site_url: config.site_url.clone(),
            session_id: config.session.session_id.clone(),
            csrf_token: config.session.csrf_token.clone(),
            request_timeout: Duration::from_secs(config.request_timeout),
            storage_timeout: Duration::from_secs(config.storage.timeout_secs),
            storage_attempts: config.storage.max_retries.max(1),
            backoff_base: Duration::from_millis(config.storage.backoff_base_ms),
        })
    }

    fn cookie_header(&self) -> Option<String> {
        let mut cookies = Vec::new();
        if let Some(session_id) = &self.session_id {
            cookies.push(format!("sessionid={}", session_id));
        }
        if let Some(token) = &self.csrf_token {
            cookies.push(format!("csrftoken={}", token));
        }
        (!cookies.is_empty()).then(|| cookies.join("; "))
    }

    /// Attach session headers to a site request
    fn with_session(&self, mut request: HttpRequest) -> HttpRequest {
        if let Some(cookie) = self.cookie_header() {
            request.headers.push(("Cookie".to_string(), cookie));
        }
        if let Some(token) = &self.csrf_token {
            request.headers.push((CSRF_HEADER.to_string(), token.clone()));
        }
        if request.header("user-agent").is_none() {
            request
                .headers
                .push(("User-Agent".to_string(), USER_AGENT.to_string()));
        }
        request.headers.extend([
            ("Accept".to_string(), "*/*".to_string()),
            ("X-Requested-With".to_string(), "XMLHttpRequest".to_string()),
            ("Referer".to_string(), self.site_url.clone()),
        ]);
        request
    }

    async fn execute(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let mut req = Request::builder()
            .method(request.method.clone())
            .uri(request.url.as_str());
        for (key, value) in &request.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        let req = req.body(Full::new(request.body.clone()))?;

        let exchange = async {
            let response = self.client.request(req).await?;
            let status = response.status();
            let body = response.into_body().collect().await?.to_bytes();
            Ok::<_, TransportError>(HttpResponse { status, body })
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    /// Exponential backoff with up to 20% jitter
    fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.backoff_base.as_millis())
            .unwrap_or(u64::MAX)
            .saturating_mul(1u64 << attempt.min(16));
        let jitter = (base_ms as f64 * 0.2 * rand::thread_rng().gen::<f64>()) as u64;
        Duration::from_millis(base_ms.saturating_add(jitter))
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let request = self.with_session(request);
        tracing::debug!(method = %request.method, url = %request.url, "site request");
        self.execute(&request, self.request_timeout).await
    }

    async fn send_storage(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut attempt = 0;
        loop {
            let response = self.execute(&request, self.storage_timeout).await?;
            attempt += 1;

            if response.status.is_server_error() && attempt < self.storage_attempts {
                let delay = self.backoff(attempt - 1);
                tracing::warn!(
                    url = %request.url,
                    status = %response.status,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "storage request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return Ok(response);
        }
    }
}
