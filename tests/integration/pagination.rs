//! Integration tests for pagination

use super::*;
use integrations_app_store_connect::{QueryParams, Resource};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_get_all_pages_follows_next_links() {
    let mock_server = setup_mock_server().await;
    let next = format!("{}/v1/builds?cursor=Mg&limit=2", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/v1/builds"))
        .and(query_param("cursor", "Mg"))
        .respond_with(success_response(json!({
            "data": [{ "type": "builds", "id": "b-3" }],
            "links": { "self": next },
            "meta": { "paging": { "total": 3, "limit": 2 } }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/builds"))
        .and(query_param("filter[app]", "1234"))
        .respond_with(success_response(json!({
            "data": [
                { "type": "builds", "id": "b-1" },
                { "type": "builds", "id": "b-2" }
            ],
            "links": { "next": next },
            "meta": { "paging": { "total": 3, "limit": 2 } }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let params = QueryParams::new().with("filter[app]", "1234").with("limit", 2u32);
    let builds: Vec<Resource> = client.get_all_pages("/builds", &params).await.unwrap();

    let ids: Vec<_> = builds.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["b-1", "b-2", "b-3"]);
}

#[tokio::test]
async fn test_page_iterator_reports_totals() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v1/apps"))
        .respond_with(success_response(json!({
            "data": [{ "type": "apps", "id": "1" }],
            "meta": { "paging": { "total": 1, "limit": 50 } }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let mut pages = client.paginate::<Resource>("/apps", &QueryParams::new()).unwrap();

    let page = pages.next_page().await.unwrap().expect("first page");
    assert_eq!(page.total(), Some(1));
    assert!(!page.has_next());
    assert!(!pages.has_more());
    assert!(pages.next_page().await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_page_is_retried() {
    let mock_server = setup_mock_server().await;
    let next = format!("{}/v1/apps?cursor=Mg", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/v1/apps"))
        .and(query_param("cursor", "Mg"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/apps"))
        .and(query_param("cursor", "Mg"))
        .respond_with(success_response(json!({ "data": [{ "type": "apps", "id": "2" }] })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/apps"))
        .and(query_param("limit", "1"))
        .respond_with(success_response(json!({
            "data": [{ "type": "apps", "id": "1" }],
            "links": { "next": next }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let apps: Vec<Resource> = client
        .get_all_pages("/apps", &QueryParams::new().with("limit", 1u32))
        .await
        .unwrap();

    assert_eq!(apps.len(), 2);
    assert_eq!(client.metrics().retries_total, 1);
}
