//! Integration tests for authenticated requests

use super::*;
use futures::future::join_all;
use integrations_app_store_connect::{ApiResponse, QueryParams, Resource};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, header_regex, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

const JWT_BEARER: &str = r"^Bearer [A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+$";

#[tokio::test]
async fn test_get_sends_signed_bearer_token() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v1/apps/1234"))
        .and(header_regex("authorization", JWT_BEARER))
        .and(header("accept", "application/json"))
        .and(header("user-agent", "integrations-app-store-connect/0.1.0"))
        .respond_with(success_response(json!({
            "data": {
                "type": "apps",
                "id": "1234",
                "attributes": { "name": "Demo", "bundleId": "com.example.demo" }
            },
            "links": { "self": "https://api.appstoreconnect.apple.com/v1/apps/1234" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let app: ApiResponse<Resource> = client.get("/apps/1234", &QueryParams::new()).await.unwrap();

    assert_eq!(app.data.id, "1234");
    assert_eq!(app.data.attributes["bundleId"], "com.example.demo");
    assert_eq!(client.rate_limit_status().hourly_remaining, 3599);
}

#[tokio::test]
async fn test_get_encodes_query_parameters() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v1/betaTesters"))
        .and(query_param("filter[apps]", "1234"))
        .and(query_param("fields[betaTesters]", "email,firstName"))
        .respond_with(success_response(json!({ "data": [] })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let params = QueryParams::new()
        .with("filter[apps]", "1234")
        .with("fields[betaTesters]", vec!["email", "firstName"]);
    let testers: ApiResponse<Vec<Resource>> = client.get("/betaTesters", &params).await.unwrap();

    assert!(testers.data.is_empty());
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let mock_server = setup_mock_server().await;
    let body = json!({
        "data": {
            "type": "betaGroups",
            "attributes": { "name": "External QA" },
            "relationships": { "app": { "data": { "type": "apps", "id": "1234" } } }
        }
    });

    Mock::given(method("POST"))
        .and(path("/v1/betaGroups"))
        .and(header("content-type", "application/json"))
        .and(body_json(&body))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": { "type": "betaGroups", "id": "g-1", "attributes": { "name": "External QA" } }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let created: ApiResponse<Resource> = client.post("/betaGroups", &body).await.unwrap();

    assert_eq!(created.data.id, "g-1");
}

#[tokio::test]
async fn test_delete_with_no_content() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("DELETE"))
        .and(path("/v1/betaTesters/t-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    client.delete("/betaTesters/t-1").await.unwrap();
}

#[tokio::test]
async fn test_delete_with_relationship_body() {
    let mock_server = setup_mock_server().await;
    let body = json!({ "data": [{ "type": "betaTesters", "id": "t-1" }] });

    Mock::given(method("DELETE"))
        .and(path("/v1/betaGroups/g-1/relationships/betaTesters"))
        .and(body_json(&body))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    client
        .delete_with_body("/betaGroups/g-1/relationships/betaTesters", &body)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejected_token_is_retried_once() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v1/apps"))
        .respond_with(error_response(
            401,
            "NOT_AUTHORIZED",
            "Authentication credentials are missing or invalid.",
        ))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/apps"))
        .and(header_regex("authorization", JWT_BEARER))
        .respond_with(success_response(json!({ "data": [] })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let _: Value = client.get("/apps", &QueryParams::new()).await.unwrap();

    assert_eq!(client.metrics().reauthentications_total, 1);
}

#[tokio::test]
async fn test_rate_limited_then_success() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v1/apps"))
        .respond_with(
            error_response(429, "RATE_LIMIT_EXCEEDED", "The request rate limit has been reached.")
                .insert_header("retry-after", "0")
                .insert_header("x-rate-limit", "user-hour-lim:3600;user-hour-rem:0;"),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/apps"))
        .respond_with(success_response(json!({ "data": [] })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let _: Value = client.get("/apps", &QueryParams::new()).await.unwrap();

    let metrics = client.metrics();
    assert_eq!(metrics.rate_limited_total, 1);
    assert_eq!(metrics.attempts_total, 2);
    assert_eq!(client.rate_limit_status().hourly_remaining, 3599);
}

#[tokio::test]
async fn test_concurrent_requests_share_credentials() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v1/apps"))
        .and(header_regex("authorization", JWT_BEARER))
        .respond_with(success_response(json!({ "data": [] })))
        .expect(8)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let params = QueryParams::new();
    let calls = (0..8).map(|_| client.get::<Value>("/apps", &params));
    let results = join_all(calls).await;

    assert!(results.iter().all(Result::is_ok));
    assert!(client.credentials().cached_expiry().await.is_some());
    assert_eq!(client.metrics().requests_success, 8);
}
