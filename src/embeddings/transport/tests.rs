use super::*;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn success_range() {
    let ok = HttpResponse {
        status: 200,
        body: String::new(),
    };
    let created = HttpResponse {
        status: 201,
        body: String::new(),
    };
    let limited = HttpResponse {
        status: 429,
        body: String::new(),
    };
    assert!(ok.is_success());
    assert!(created.is_success());
    assert!(!limited.is_success());
}

#[tokio::test]
async fn posts_json_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(serde_json::json!({ "hello": "world" })))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = UreqTransport::default();
    let response = transport
        .post_json(
            &format!("{}/v1/embeddings", server.uri()),
            "sk-test",
            "{\"hello\":\"world\"}".to_string(),
        )
        .await
        .expect("request should reach the mock server");

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "{\"ok\":true}");
}

#[tokio::test]
async fn error_status_is_returned_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let transport = UreqTransport::default();
    let response = transport
        .post_json(&format!("{}/embeddings", server.uri()), "key", "{}".to_string())
        .await
        .expect("status codes are not transport errors");

    assert_eq!(response.status, 503);
    assert_eq!(response.body, "overloaded");
    assert!(!response.is_success());
}

#[tokio::test]
async fn unreachable_host_is_network_error() {
    let transport = UreqTransport::with_timeout(Duration::from_secs(2));
    let result = transport
        .post_json("http://127.0.0.1:1/embeddings", "key", "{}".to_string())
        .await;

    assert!(matches!(result, Err(MemoryError::Network(_))));
}
