//! Integration tests using WireMock
//!
//! These drive the real reqwest transport through the whole pipeline:
//! token signing, headers, retries, error classification and pagination.

pub mod errors;
pub mod pagination;
pub mod requests;

use integrations_app_store_connect::{AppStoreConnectClient, Credentials, RetryConfig};
use std::time::Duration;
use wiremock::{MockServer, ResponseTemplate};

pub const TEST_KEY: &str = include_str!("../fixtures/AuthKey_TEST.p8");
pub const ISSUER_ID: &str = "57246542-96fe-1a63-e053-0824d011072a";
pub const KEY_ID: &str = "2X9R4HXF34";

/// Helper to start a mock server
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Client pointed at the mock server with short retry delays.
pub fn client_for(server: &MockServer) -> AppStoreConnectClient {
    AppStoreConnectClient::builder()
        .base_url(format!("{}/v1", server.uri()))
        .credentials(Credentials::new(ISSUER_ID, KEY_ID, TEST_KEY))
        .retry(RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        })
        .build()
        .expect("Failed to build client")
}

/// Helper to create error response templates
pub fn error_response(status: u16, code: &str, detail: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(serde_json::json!({
        "errors": [{
            "id": "b3f1c7e2-0000-0000-0000-000000000000",
            "status": status.to_string(),
            "code": code,
            "title": code,
            "detail": detail
        }]
    }))
}

/// Helper to create success response templates
pub fn success_response(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("x-rate-limit", "user-hour-lim:3600;user-hour-rem:3599;")
        .set_body_json(body)
}
