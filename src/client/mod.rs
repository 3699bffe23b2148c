//! App Store Connect API client and its request pipeline.
//!
//! Every call runs the same state machine: attach a bearer token, send,
//! record the rate limit header, then decide between success, a one-shot
//! re-authentication, a backoff retry, or a terminal error.

mod query;

pub use query::{QueryParams, QueryValue};

use crate::auth::CredentialSigner;
use crate::config::{
    AppStoreConnectConfig, AppStoreConnectConfigBuilder, Credentials, RetryConfig,
};
use crate::errors::{classify, AppStoreConnectError, AppStoreConnectResult};
use crate::observability::{Metrics, MetricsSnapshot, TracingHooks};
use crate::pagination::PageIterator;
use crate::resilience::{
    compute_delay, sleep_for, RateLimitStatus, RateLimitTracker, RATE_LIMIT_HEADER,
};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use bytes::Bytes;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER, USER_AGENT,
};
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

/// What one HTTP round trip means for the retry loop.
#[derive(Debug)]
enum AttemptOutcome {
    /// 2xx. `None` when the response had no body.
    Success(Option<Bytes>),
    /// 401/403: the token was rejected.
    Reauthenticate { status: u16, detail: String },
    /// 429 with the parsed `Retry-After` seconds.
    RateLimited { retry_after: Option<u64> },
    /// Transient failure worth another attempt.
    Retry(AppStoreConnectError),
    /// Terminal failure.
    Fail(AppStoreConnectError),
}

/// App Store Connect API client.
///
/// Holds the credential cache and rate limit tracker for every call made
/// through it. Clone the `Arc`s out of one client to share them with another.
pub struct AppStoreConnectClient {
    transport: Arc<dyn HttpTransport>,
    config: AppStoreConnectConfig,
    signer: Arc<CredentialSigner>,
    rate_limits: Arc<RateLimitTracker>,
    metrics: Arc<Metrics>,
}

impl AppStoreConnectClient {
    /// Creates a client using the reqwest transport.
    ///
    /// Fails if the configuration has no credentials or the key cannot be
    /// parsed.
    pub fn new(config: AppStoreConnectConfig) -> AppStoreConnectResult<Self> {
        Self::builder().config(config).build()
    }

    /// Creates a client configured from the environment.
    pub fn from_env() -> AppStoreConnectResult<Self> {
        Self::new(AppStoreConnectConfig::from_env()?)
    }

    /// Creates a new client builder.
    pub fn builder() -> AppStoreConnectClientBuilder {
        AppStoreConnectClientBuilder::new()
    }

    /// Gets the base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// The credential signer used by this client.
    pub fn credentials(&self) -> &Arc<CredentialSigner> {
        &self.signer
    }

    /// The rate limit tracker used by this client.
    pub fn rate_limits(&self) -> &Arc<RateLimitTracker> {
        &self.rate_limits
    }

    /// Current rate limit snapshot.
    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limits.current_status()
    }

    /// Request metrics so far.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // HTTP methods

    /// Makes a GET request.
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> AppStoreConnectResult<T> {
        let url = self.build_url(endpoint, params)?;
        let body = self.execute(Method::GET, url, None).await?;
        decode(body)
    }

    /// Makes a POST request.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> AppStoreConnectResult<T> {
        let url = self.build_url(endpoint, &QueryParams::new())?;
        let body = self.execute(Method::POST, url, Some(encode(body)?)).await?;
        decode(body)
    }

    /// Makes a PATCH request.
    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> AppStoreConnectResult<T> {
        let url = self.build_url(endpoint, &QueryParams::new())?;
        let body = self.execute(Method::PATCH, url, Some(encode(body)?)).await?;
        decode(body)
    }

    /// Makes a DELETE request.
    pub async fn delete(&self, endpoint: &str) -> AppStoreConnectResult<()> {
        let url = self.build_url(endpoint, &QueryParams::new())?;
        self.execute(Method::DELETE, url, None).await?;
        Ok(())
    }

    /// Makes a DELETE request with a body, as relationship removals need.
    pub async fn delete_with_body<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> AppStoreConnectResult<()> {
        let url = self.build_url(endpoint, &QueryParams::new())?;
        self.execute(Method::DELETE, url, Some(encode(body)?)).await?;
        Ok(())
    }

    /// Follows `links.next` from `endpoint` and returns every page's `data`.
    pub async fn get_all_pages<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> AppStoreConnectResult<Vec<T>> {
        self.paginate(endpoint, params)?.collect_all().await
    }

    /// Returns an iterator over the pages of a collection.
    pub fn paginate<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> AppStoreConnectResult<PageIterator<'_, T>> {
        Ok(PageIterator::new(self, self.build_url(endpoint, params)?))
    }

    /// GETs an absolute URL through the full pipeline. `None` for empty 2xx.
    pub(crate) async fn fetch_url<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> AppStoreConnectResult<Option<T>> {
        match self.execute(Method::GET, url.to_string(), None).await? {
            Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
            None => Ok(None),
        }
    }

    // Internal methods

    fn build_url(&self, endpoint: &str, params: &QueryParams) -> AppStoreConnectResult<String> {
        let mut url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!(
                "{}/{}",
                self.config.base_url.trim_end_matches('/'),
                endpoint.trim_start_matches('/')
            )
        };

        let query = params.to_query_string()?;
        if !query.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }

        Ok(url)
    }

    async fn execute(
        &self,
        method: Method,
        url: String,
        body: Option<Bytes>,
    ) -> AppStoreConnectResult<Option<Bytes>> {
        let span = tracing::info_span!(
            "app_store_connect_request",
            request_id = %Uuid::new_v4(),
            method = %method,
            url = %url,
        );

        async move {
            let started = Instant::now();
            self.metrics.record_request();

            let result = self.run_attempts(&method, &url, body).await;

            self.metrics.record_outcome(result.is_ok(), started.elapsed());
            if let Err(ref e) = result {
                TracingHooks::on_request_error(method.as_str(), &url, &e.to_string());
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_attempts(
        &self,
        method: &Method,
        url: &str,
        body: Option<Bytes>,
    ) -> AppStoreConnectResult<Option<Bytes>> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut last_error: Option<AppStoreConnectError> = None;

        for attempt in 0..max_attempts {
            let attempts_remain = attempt + 1 < max_attempts;

            match self.attempt(method, url, body.clone(), attempt).await {
                AttemptOutcome::Success(body) => return Ok(body),

                AttemptOutcome::Reauthenticate { status, detail } => {
                    if attempt > 0 || !attempts_remain {
                        return Err(AppStoreConnectError::authentication(format!(
                            "Authentication failed (HTTP {}). \
                             Check the issuer id, key id and private key. {}",
                            status, detail
                        )));
                    }
                    TracingHooks::on_reauthenticate(status);
                    self.metrics.record_reauthentication();
                    self.metrics.record_retry();
                    self.signer.invalidate().await;
                }

                AttemptOutcome::RateLimited { retry_after } => {
                    if !attempts_remain {
                        return Err(AppStoreConnectError::rate_limit(retry_after));
                    }
                    let delay = match retry_after {
                        Some(secs) => Duration::from_secs(secs),
                        None => self.backoff(attempt),
                    };
                    self.pause(attempt, delay, "rate limited").await;
                }

                AttemptOutcome::Retry(error) => {
                    if !attempts_remain {
                        return Err(error);
                    }
                    let delay = self.backoff(attempt);
                    self.pause(attempt, delay, &error.to_string()).await;
                    last_error = Some(error);
                }

                AttemptOutcome::Fail(error) => return Err(error),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AppStoreConnectError::Unknown("Request failed after maximum retries".to_string())
        }))
    }

    async fn attempt(
        &self,
        method: &Method,
        url: &str,
        body: Option<Bytes>,
        attempt: u32,
    ) -> AttemptOutcome {
        let headers = match self.headers().await {
            Ok(headers) => headers,
            Err(e) => return AttemptOutcome::Fail(e),
        };
        TracingHooks::on_request_headers(&headers);

        TracingHooks::on_request_start(method.as_str(), url, attempt);
        self.metrics.record_attempt();
        let started = Instant::now();

        let response = match self
            .transport
            .send(HttpRequest {
                method: method.clone(),
                url: url.to_string(),
                headers,
                body,
            })
            .await
        {
            Ok(response) => response,
            // No response at all; always worth another attempt.
            Err(e) => return AttemptOutcome::Retry(e),
        };

        TracingHooks::on_request_complete(method.as_str(), url, response.status, started.elapsed());

        self.rate_limits.observe(response.header(RATE_LIMIT_HEADER));
        self.rate_limits.advise_if_near_limit();

        if response.status == 429 {
            self.metrics.record_rate_limited();
        }

        outcome_for(response)
    }

    async fn headers(&self) -> AppStoreConnectResult<HeaderMap> {
        let authorization = self.signer.authorization_header_value().await?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&authorization).map_err(|_| {
                AppStoreConnectError::configuration("Signed token is not a valid header value")
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.config.user_agent).map_err(|_| {
                AppStoreConnectError::configuration("User-Agent is not a valid header value")
            })?,
        );

        Ok(headers)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        compute_delay(attempt, self.config.retry.base_delay, self.config.retry.max_delay)
    }

    async fn pause(&self, attempt: u32, delay: Duration, reason: &str) {
        TracingHooks::on_retry(attempt, delay, reason);
        self.metrics.record_retry();
        sleep_for(delay).await;
    }
}

impl std::fmt::Debug for AppStoreConnectClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppStoreConnectClient")
            .field("base_url", &self.config.base_url)
            .field("retry", &self.config.retry)
            .finish_non_exhaustive()
    }
}

/// Maps a response onto the retry loop's decision table.
fn outcome_for(response: HttpResponse) -> AttemptOutcome {
    let status = response.status;

    if response.is_success() {
        let empty = status == 204 || response.body.iter().all(u8::is_ascii_whitespace);
        return AttemptOutcome::Success(if empty { None } else { Some(response.body) });
    }

    match status {
        401 | 403 => {
            let detail = classify(status, &response.body)
                .errors
                .first()
                .map(ToString::to_string)
                .unwrap_or_default();
            AttemptOutcome::Reauthenticate { status, detail }
        }
        429 => AttemptOutcome::RateLimited {
            retry_after: response
                .header(RETRY_AFTER.as_str())
                .and_then(|v| v.trim().parse().ok()),
        },
        _ => {
            let error = classify(status, &response.body);
            if error.retryable {
                AttemptOutcome::Retry(error.into())
            } else {
                AttemptOutcome::Fail(error.into())
            }
        }
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> AppStoreConnectResult<Bytes> {
    serde_json::to_vec(body)
        .map(Bytes::from)
        .map_err(|e| {
            AppStoreConnectError::Unknown(format!("Failed to serialize request body: {}", e))
        })
}

fn decode<T: DeserializeOwned>(body: Option<Bytes>) -> AppStoreConnectResult<T> {
    match body {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Ok(serde_json::from_value(Value::Null)?),
    }
}

/// Builder for AppStoreConnectClient.
pub struct AppStoreConnectClientBuilder {
    config_builder: AppStoreConnectConfigBuilder,
    config: Option<AppStoreConnectConfig>,
    transport: Option<Arc<dyn HttpTransport>>,
    signer: Option<Arc<CredentialSigner>>,
    rate_limits: Option<Arc<RateLimitTracker>>,
}

impl AppStoreConnectClientBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            config_builder: AppStoreConnectConfig::builder(),
            config: None,
            transport: None,
            signer: None,
            rate_limits: None,
        }
    }

    /// Uses a complete configuration, ignoring individual setters.
    pub fn config(mut self, config: AppStoreConnectConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.base_url(url);
        self
    }

    /// Sets the signing credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config_builder = self.config_builder.credentials(credentials);
        self
    }

    /// Sets the retry configuration.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config_builder = self.config_builder.retry(retry);
        self
    }

    /// Sets the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config_builder = self.config_builder.timeout(timeout);
        self
    }

    /// Sets the User-Agent.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.user_agent(ua);
        self
    }

    /// Replaces the HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Uses an existing credential signer instead of building one from the
    /// configured credentials.
    pub fn signer(mut self, signer: Arc<CredentialSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Shares an existing rate limit tracker.
    pub fn rate_limit_tracker(mut self, tracker: Arc<RateLimitTracker>) -> Self {
        self.rate_limits = Some(tracker);
        self
    }

    /// Builds the client.
    pub fn build(self) -> AppStoreConnectResult<AppStoreConnectClient> {
        let config = match self.config {
            Some(mut config) => {
                config.retry.max_attempts = config.retry.max_attempts.max(1);
                config.validate()?;
                config
            }
            None => self.config_builder.build()?,
        };

        let signer = match self.signer {
            Some(signer) => signer,
            None => {
                let credentials = config.credentials.as_ref().ok_or_else(|| {
                    AppStoreConnectError::configuration(
                        "App Store Connect credentials are required",
                    )
                })?;
                Arc::new(CredentialSigner::new(credentials)?)
            }
        };

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&config)?),
        };

        Ok(AppStoreConnectClient {
            transport,
            config,
            signer,
            rate_limits: self.rate_limits.unwrap_or_default(),
            metrics: Arc::new(Metrics::new()),
        })
    }
}

impl Default for AppStoreConnectClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
