//! End-to-end exchanges against a local wiremock server.

use std::time::Duration;

use http::Method;
use sling::{Client, ErrorKind, Payload};
use sling_reqwest::ReqwestTransport;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> Client {
    Client::builder()
        .transport(ReqwestTransport::new(&server.uri()).unwrap())
        .build()
        .unwrap()
}

#[tokio::test]
async fn json_response_round_trips() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": 1, "name": "ada"}])),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let envelope = client.get("/users").await.unwrap();
    assert_eq!(envelope.status, 200);
    assert_eq!(
        envelope.payload,
        Payload::Json(serde_json::json!([{"id": 1, "name": "ada"}]))
    );
}

#[tokio::test]
async fn query_parameters_are_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("page", "2"))
        .and(query_param("per_page", "50"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let config = client
        .config(Method::GET, "/items")
        .query("page", "2")
        .query("per_page", "50");
    assert!(client.request(config).await.is_ok());
}

#[tokio::test]
async fn headers_and_json_body_are_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header("x-tenant", "t1"))
        .and(body_json(serde_json::json!({"sku": 7})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let config = client
        .config(Method::POST, "/orders")
        .header("x-tenant", "t1")
        .json(&serde_json::json!({"sku": 7}))
        .unwrap();
    let envelope = client.request(config).await.unwrap();
    assert_eq!(envelope.status, 201);
}

#[tokio::test]
async fn unreachable_host_maps_to_a_network_error() {
    // Nothing listens on the discard port.
    let client = Client::builder()
        .transport(ReqwestTransport::new("http://127.0.0.1:9").unwrap())
        .build()
        .unwrap();

    let error = client.get("/ping").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Network);
}

#[tokio::test]
async fn slow_response_elapses_the_per_attempt_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let config = client
        .config(Method::GET, "/slow")
        .timeout(Duration::from_millis(50));
    let error = client.request(config).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn rejected_status_surfaces_with_the_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let error = client.get("/broken").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Status);
    assert_eq!(error.status_code().unwrap(), 503);
}
