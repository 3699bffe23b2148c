//! # App Store Connect Integration Library
//!
//! The request pipeline behind an App Store Connect gateway:
//! - ES256 API key tokens, cached and refreshed before expiry
//! - `x-rate-limit` tracking with near-limit advisories
//! - Retries with jittered exponential backoff, `Retry-After` and a
//!   one-shot re-authentication on rejected tokens
//! - Structured error classification and plain-text rendering
//! - Cursor pagination over `links.next`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_app_store_connect::{AppStoreConnectClient, AppStoreConnectConfig, QueryParams};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads APP_STORE_CONNECT_ISSUER_ID, APP_STORE_CONNECT_KEY_ID and a key.
//!     let client = AppStoreConnectClient::new(AppStoreConnectConfig::from_env()?)?;
//!
//!     let apps: Vec<Value> = client
//!         .get_all_pages("/apps", &QueryParams::new().with("limit", 200u32))
//!         .await?;
//!     println!("{} apps", apps.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod types;

// Authentication
pub mod auth;

// HTTP transport and request pipeline
pub mod client;
pub mod transport;

// Pagination handling
pub mod pagination;

// Resilience patterns
pub mod resilience;

// Observability
pub mod observability;

// Assistant-facing outcomes
pub mod tools;

// Mocks for testing
pub mod mocks;

// Re-exports for convenience
pub use auth::{CredentialSigner, Es256Signer, TokenSigner};
pub use client::{AppStoreConnectClient, AppStoreConnectClientBuilder, QueryParams, QueryValue};
pub use config::{AppStoreConnectConfig, AppStoreConnectConfigBuilder, Credentials, RetryConfig};
pub use errors::{
    classify, format_for_display, AppStoreConnectError, AppStoreConnectResult, ProblemEntry,
    ServiceError,
};
pub use observability::{LogFormat, LoggingConfig, MetricsSnapshot};
pub use pagination::{Page, PageIterator};
pub use resilience::{compute_delay, RateLimitStatus, RateLimitTracker};
pub use tools::ToolOutcome;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use types::{ApiResponse, Resource, ResourceLinks};
