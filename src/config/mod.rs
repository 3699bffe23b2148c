//! Configuration types for the App Store Connect client.

use crate::errors::{AppStoreConnectError, AppStoreConnectResult};
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Default App Store Connect API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.appstoreconnect.apple.com/v1";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default User-Agent header.
pub const DEFAULT_USER_AGENT: &str = "integrations-app-store-connect/0.1.0";

/// Environment variable holding the issuer id.
pub const ENV_ISSUER_ID: &str = "APP_STORE_CONNECT_ISSUER_ID";
/// Environment variable holding the key id.
pub const ENV_KEY_ID: &str = "APP_STORE_CONNECT_KEY_ID";
/// Environment variable holding a path to the `.p8` key file.
pub const ENV_P8_PATH: &str = "APP_STORE_CONNECT_P8_PATH";
/// Environment variable holding the base64-encoded `.p8` contents.
pub const ENV_P8_B64_STRING: &str = "APP_STORE_CONNECT_P8_B64_STRING";
/// Environment variable holding the literal `.p8` contents.
pub const ENV_P8_STRING: &str = "APP_STORE_CONNECT_P8_STRING";

/// API key credentials used to sign request tokens.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Issuer id from the API keys page.
    pub issuer_id: String,
    /// Key id, embedded as `kid` in the token header.
    pub key_id: String,
    /// PKCS#8 PEM private key.
    pub private_key: SecretString,
}

impl Credentials {
    /// Creates credentials from literal values.
    pub fn new(
        issuer_id: impl Into<String>,
        key_id: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            issuer_id: issuer_id.into(),
            key_id: key_id.into(),
            private_key: SecretString::new(private_key.into()),
        }
    }

    /// Loads credentials from the `APP_STORE_CONNECT_*` environment variables.
    ///
    /// The key is taken from the first of `APP_STORE_CONNECT_P8_PATH`,
    /// `APP_STORE_CONNECT_P8_B64_STRING` or `APP_STORE_CONNECT_P8_STRING`
    /// that is set.
    pub fn from_env() -> AppStoreConnectResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> AppStoreConnectResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name).filter(|v| !v.trim().is_empty()).ok_or_else(|| {
                AppStoreConnectError::configuration(format!(
                    "Environment variable {} not set",
                    name
                ))
            })
        };

        let issuer_id = required(ENV_ISSUER_ID)?;
        let key_id = required(ENV_KEY_ID)?;

        let private_key = if let Some(path) = lookup(ENV_P8_PATH) {
            std::fs::read_to_string(&path).map_err(|e| {
                AppStoreConnectError::configuration(format!(
                    "Failed to read private key from {}: {}",
                    path, e
                ))
            })?
        } else if let Some(encoded) = lookup(ENV_P8_B64_STRING) {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| {
                    AppStoreConnectError::configuration(format!(
                        "{} is not valid base64: {}",
                        ENV_P8_B64_STRING, e
                    ))
                })?;
            String::from_utf8(bytes).map_err(|_| {
                AppStoreConnectError::configuration(format!(
                    "{} does not decode to UTF-8 text",
                    ENV_P8_B64_STRING
                ))
            })?
        } else if let Some(literal) = lookup(ENV_P8_STRING) {
            literal.replace("\\n", "\n")
        } else {
            return Err(AppStoreConnectError::configuration(format!(
                "No private key configured; set one of {}, {} or {}",
                ENV_P8_PATH, ENV_P8_B64_STRING, ENV_P8_STRING
            )));
        };

        Ok(Self::new(issuer_id, key_id, private_key))
    }

    /// Checks that every field needed for signing is present.
    pub fn validate(&self) -> AppStoreConnectResult<()> {
        if self.issuer_id.trim().is_empty() {
            return Err(AppStoreConnectError::configuration("Issuer id is required"));
        }
        if self.key_id.trim().is_empty() {
            return Err(AppStoreConnectError::configuration("Key id is required"));
        }
        if self.private_key.expose_secret().trim().is_empty() {
            return Err(AppStoreConnectError::configuration("Private key is required"));
        }
        Ok(())
    }
}

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per logical call, including the first.
    pub max_attempts: u32,
    /// Delay for attempt 0 before jitter.
    pub base_delay: Duration,
    /// Ceiling applied to every computed delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// App Store Connect client configuration.
#[derive(Debug, Clone)]
pub struct AppStoreConnectConfig {
    /// API base URL, including the `/v1` prefix.
    pub base_url: String,
    /// Signing credentials.
    pub credentials: Option<Credentials>,
    /// Request timeout.
    pub timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// User-Agent header.
    pub user_agent: String,
    /// Retry configuration.
    pub retry: RetryConfig,
}

impl Default for AppStoreConnectConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl AppStoreConnectConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> AppStoreConnectConfigBuilder {
        AppStoreConnectConfigBuilder::new()
    }

    /// Builds a default configuration with credentials from the environment.
    pub fn from_env() -> AppStoreConnectResult<Self> {
        Self::builder().credentials(Credentials::from_env()?).build()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> AppStoreConnectResult<()> {
        if self.base_url.is_empty() {
            return Err(AppStoreConnectError::configuration("Base URL cannot be empty"));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(AppStoreConnectError::configuration(
                "Base URL must start with http:// or https://",
            ));
        }

        url::Url::parse(&self.base_url).map_err(|e| {
            AppStoreConnectError::configuration(format!("Invalid base URL: {}", e))
        })?;

        if self.user_agent.is_empty() {
            return Err(AppStoreConnectError::configuration("User-Agent cannot be empty"));
        }

        if let Some(ref credentials) = self.credentials {
            credentials.validate()?;
        }

        Ok(())
    }
}

/// Builder for AppStoreConnectConfig.
#[derive(Debug, Default)]
pub struct AppStoreConnectConfigBuilder {
    base_url: Option<String>,
    credentials: Option<Credentials>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    user_agent: Option<String>,
    retry: Option<RetryConfig>,
}

impl AppStoreConnectConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the signing credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the User-Agent header.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Sets the retry configuration.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> AppStoreConnectResult<AppStoreConnectConfig> {
        let mut retry = self.retry.unwrap_or_default();
        retry.max_attempts = retry.max_attempts.max(1);

        let config = AppStoreConnectConfig {
            base_url: self
                .base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            credentials: self.credentials,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            user_agent: self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            retry,
        };

        config.validate()?;
        Ok(config)
    }
}
