//! HTTP transport layer.
//!
//! The pipeline talks to the network only through [`HttpTransport`], so
//! tests can substitute scripted responses. Non-2xx statuses are ordinary
//! responses here; only failures to obtain a response are errors.

use crate::config::AppStoreConnectConfig;
use crate::errors::{AppStoreConnectError, AppStoreConnectResult};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};

/// An outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL including the query string.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Serialized JSON body.
    pub body: Option<Bytes>,
}

/// A response with its body fully read.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Returns a header as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP transport abstraction for testability.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends one request and reads the whole response.
    async fn send(&self, request: HttpRequest) -> AppStoreConnectResult<HttpResponse>;
}

/// Reqwest-based transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Builds a transport with the configured timeouts.
    pub fn new(config: &AppStoreConnectConfig) -> AppStoreConnectResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(20)
            .build()
            .map_err(|e| {
                AppStoreConnectError::configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Wraps an existing reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> AppStoreConnectResult<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(network_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn network_error(e: reqwest::Error) -> AppStoreConnectError {
    if e.is_timeout() {
        AppStoreConnectError::network(format!("Request timed out: {}", e))
    } else if e.is_connect() {
        AppStoreConnectError::network(format!("Connection failed: {}", e))
    } else {
        AppStoreConnectError::network(format!("Request failed: {}", e))
    }
}
