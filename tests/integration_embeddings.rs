#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

use table_memory::MemoryError;
use table_memory::config::EmbeddingConfig;
use table_memory::embeddings::EmbeddingClient;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers every input `"text {n}"` with the embedding `[n, 1.0]`
struct IndexedEmbeddings;

impl Respond for IndexedEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).expect("request is json");
        let data: Vec<_> = body["input"]
            .as_array()
            .expect("input array")
            .iter()
            .map(|text| {
                let index: f32 = text
                    .as_str()
                    .and_then(|t| t.strip_prefix("text "))
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(-1.0);
                serde_json::json!({ "embedding": [index, 1.0] })
            })
            .collect();

        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": data }))
    }
}

fn config_for(server: &MockServer) -> EmbeddingConfig {
    EmbeddingConfig {
        api_url: format!("{}/v1", server.uri()),
        api_key: "sk-integration".to_string(),
        retry_delay_ms: 1,
        ..EmbeddingConfig::default()
    }
}

fn texts(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("text {i}")).collect()
}

#[tokio::test]
async fn large_batches_are_split_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer sk-integration"))
        .respond_with(IndexedEmbeddings)
        .expect(3)
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(config_for(&server)).expect("valid config");
    let vectors = client.embed_batch(&texts(250)).await.expect("batch succeeds");

    assert_eq!(vectors.len(), 250);
    for (i, vector) in vectors.iter().enumerate() {
        assert_eq!(vector[0], i as f32);
    }

    let requests = server.received_requests().await.expect("recording enabled");
    let sizes: Vec<usize> = requests
        .iter()
        .map(|r| {
            let body: serde_json::Value = serde_json::from_slice(&r.body).expect("json");
            body["input"].as_array().expect("input array").len()
        })
        .collect();
    assert_eq!(sizes, vec![100, 100, 50]);

    let first: serde_json::Value = serde_json::from_slice(&requests[0].body).expect("json");
    assert_eq!(first["model"], "BAAI/bge-large-zh-v1.5");
    assert_eq!(first["encoding_format"], "float");
}

#[tokio::test]
async fn server_errors_are_retried_then_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(3)
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(config_for(&server)).expect("valid config");
    let err = client.embed("text 1").await.expect_err("all attempts fail");

    match err {
        MemoryError::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(matches!(
                *source,
                MemoryError::Api { status: 503, ref body } if body == "overloaded"
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn transient_failure_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(IndexedEmbeddings)
        .expect(1)
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(config_for(&server)).expect("valid config");
    let vector = client.embed("text 7").await.expect("second attempt succeeds");
    assert_eq!(vector, vec![7.0, 1.0]);
}

#[tokio::test]
async fn connection_test_reports_unreachable_api() {
    let config = EmbeddingConfig {
        api_url: "http://127.0.0.1:1/v1".to_string(),
        api_key: "sk-integration".to_string(),
        retry_times: 1,
        ..EmbeddingConfig::default()
    };

    let client = EmbeddingClient::new(config).expect("valid config");
    assert!(!client.test_connection().await);
}
