//! Integration tests for error classification

use super::*;
use integrations_app_store_connect::{
    format_for_display, AppStoreConnectClient, AppStoreConnectError, QueryParams, RetryConfig,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v1/builds/missing"))
        .respond_with(error_response(
            404,
            "NOT_FOUND",
            "There is no resource of type 'builds' with id 'missing'",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client
        .get::<Value>("/builds/missing", &QueryParams::new())
        .await
        .unwrap_err();

    let service = err.as_service_error().expect("service error");
    assert_eq!(service.status, 404);
    assert_eq!(service.errors.len(), 1);
    assert_eq!(service.errors[0].code, "NOT_FOUND");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_validation_error_is_rendered_for_display() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("PATCH"))
        .and(path("/v1/apps/1234"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "errors": [
                {
                    "status": "409",
                    "code": "ENTITY_ERROR.ATTRIBUTE.INVALID",
                    "title": "An attribute value is invalid.",
                    "detail": "The provided entity includes an attribute with an invalid value",
                    "source": { "pointer": "/data/attributes/primaryLocale" }
                },
                {
                    "status": "409",
                    "code": "ENTITY_ERROR.ATTRIBUTE.REQUIRED",
                    "title": "An attribute is required.",
                    "detail": "The attribute 'name' is required"
                }
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client
        .patch::<Value, _>("/apps/1234", &json!({ "data": { "type": "apps", "id": "1234" } }))
        .await
        .unwrap_err();

    let expected = [
        "App Store Connect API Error (409):",
        "[ENTITY_ERROR.ATTRIBUTE.INVALID] An attribute value is invalid.: \
         The provided entity includes an attribute with an invalid value \
         (at /data/attributes/primaryLocale)",
        "[ENTITY_ERROR.ATTRIBUTE.REQUIRED] An attribute is required.: \
         The attribute 'name' is required",
    ]
    .join("\n");
    assert_eq!(format_for_display(&err), expected);
}

#[tokio::test]
async fn test_server_error_exhausts_retries() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v1/apps"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.get::<Value>("/apps", &QueryParams::new()).await.unwrap_err();

    let service = err.as_service_error().expect("service error");
    assert_eq!(service.status, 503);
    assert!(service.retryable);
    assert_eq!(service.errors[0].detail, "Service Unavailable");
    assert_eq!(client.metrics().attempts_total, 3);
}

#[tokio::test]
async fn test_persistent_rejection_is_authentication_error() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v1/apps"))
        .respond_with(error_response(
            403,
            "FORBIDDEN_ERROR",
            "This request is forbidden for security reasons",
        ))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.get::<Value>("/apps", &QueryParams::new()).await.unwrap_err();

    assert!(matches!(err, AppStoreConnectError::Authentication { .. }));
    assert!(format_for_display(&err).contains("403"));
}

#[tokio::test]
async fn test_rate_limit_exhausted_surfaces_retry_after() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v1/apps"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.get::<Value>("/apps", &QueryParams::new()).await.unwrap_err();

    assert_eq!(err.retry_after(), Some(0));
    assert_eq!(format_for_display(&err), "Rate limit exceeded. Retry after 0 seconds.");
}

#[tokio::test]
async fn test_malformed_success_body_is_deserialization_error() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v1/apps"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.get::<Value>("/apps", &QueryParams::new()).await.unwrap_err();

    assert!(matches!(err, AppStoreConnectError::Deserialization { .. }));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let client = AppStoreConnectClient::builder()
        .base_url("http://127.0.0.1:9/v1")
        .credentials(Credentials::new(ISSUER_ID, KEY_ID, TEST_KEY))
        .retry(RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        })
        .build()
        .unwrap();

    let err = client.get::<Value>("/apps", &QueryParams::new()).await.unwrap_err();

    assert!(matches!(err, AppStoreConnectError::Network { .. }));
    assert_eq!(client.metrics().attempts_total, 2);
}
