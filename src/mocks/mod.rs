//! Test doubles for the HTTP transport and token signing.

use crate::auth::{Claims, CredentialSigner, TokenSigner};
use crate::errors::{AppStoreConnectError, AppStoreConnectResult};
use crate::resilience::RATE_LIMIT_HEADER;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A scripted response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Bytes,
    /// Headers.
    pub headers: HeaderMap,
    /// Delay before responding.
    pub delay: Option<Duration>,
}

impl MockResponse {
    /// Creates a response with a raw text body.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: Bytes::from(body.into()),
            headers: HeaderMap::new(),
            delay: None,
        }
    }

    /// Creates a response with a JSON body.
    pub fn json<T: Serialize>(status: u16, body: &T) -> Self {
        Self::text(status, serde_json::to_string(body).unwrap_or_default())
    }

    /// Creates a 200 OK response with the given body.
    pub fn ok<T: Serialize>(body: &T) -> Self {
        Self::json(200, body)
    }

    /// Creates a 204 No Content response.
    pub fn no_content() -> Self {
        Self::text(204, "")
    }

    /// Creates a 429 response, with `Retry-After` if given.
    pub fn rate_limited(retry_after: Option<u64>) -> Self {
        let response = Self::problem(
            429,
            "RATE_LIMIT_EXCEEDED",
            "The request rate limit has been reached.",
        );
        match retry_after {
            Some(secs) => response.with_header("retry-after", &secs.to_string()),
            None => response,
        }
    }

    /// Creates a 401 Unauthorized response.
    pub fn unauthorized() -> Self {
        Self::problem(
            401,
            "NOT_AUTHORIZED",
            "Provide a properly configured and signed bearer token.",
        )
    }

    /// Creates a 403 Forbidden response.
    pub fn forbidden() -> Self {
        Self::problem(403, "FORBIDDEN_ERROR", "This request is forbidden for security reasons.")
    }

    /// Creates a 500 Internal Server Error response.
    pub fn server_error() -> Self {
        Self::problem(500, "UNEXPECTED_ERROR", "An unexpected error occurred on the server side.")
    }

    /// Creates a response with a single problem entry in the `errors` body.
    pub fn problem(status: u16, code: &str, detail: &str) -> Self {
        Self::json(
            status,
            &serde_json::json!({
                "errors": [{
                    "status": status.to_string(),
                    "code": code,
                    "title": code,
                    "detail": detail
                }]
            }),
        )
    }

    /// Adds a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Adds an `x-rate-limit` header.
    pub fn with_rate_limit(self, limit: u32, remaining: u32) -> Self {
        self.with_header(
            RATE_LIMIT_HEADER,
            &format!("user-hour-lim:{};user-hour-rem:{};", limit, remaining),
        )
    }

    /// Adds a delay before the response is returned.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Transport that replays scripted results in order and records requests.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<AppStoreConnectResult<MockResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push(&self, response: MockResponse) {
        self.script.lock().push_back(Ok(response));
    }

    /// Queues a transport-level failure.
    pub fn push_error(&self, error: AppStoreConnectError) {
        self.script.lock().push_back(Err(error));
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests received.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Number of scripted results not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> AppStoreConnectResult<HttpResponse> {
        let description = format!("{} {}", request.method, request.url);
        self.requests.lock().push(request);

        let next = self.script.lock().pop_front();
        let response = match next {
            Some(result) => result?,
            None => {
                return Err(AppStoreConnectError::Unknown(format!(
                    "No mock response for {}",
                    description
                )))
            }
        };

        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(HttpResponse {
            status: response.status,
            headers: response.headers,
            body: response.body,
        })
    }
}

/// Signer that returns `token-1`, `token-2`, ... and counts signatures.
#[derive(Debug, Default)]
pub struct StaticTokenSigner {
    signed: AtomicUsize,
}

impl StaticTokenSigner {
    /// Creates a signer.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of tokens signed so far.
    pub fn sign_count(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }

    /// Wraps a signer in a caching [`CredentialSigner`].
    pub fn credential_signer(signer: &Arc<Self>) -> Arc<CredentialSigner> {
        Arc::new(CredentialSigner::with_signer("test-issuer", signer.clone()))
    }
}

impl TokenSigner for StaticTokenSigner {
    fn sign(&self, _claims: &Claims) -> AppStoreConnectResult<String> {
        let n = self.signed.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("token-{}", n))
    }
}
