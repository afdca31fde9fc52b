#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! End-to-end tests of the vector memory against a mocked embedding API and an
//! on-disk SQLite store

use anyhow::Result;
use std::sync::Arc;
use table_memory::config::EmbeddingConfig;
use table_memory::database::{CollectionStore, SqliteCollectionStore};
use table_memory::memory::VectorMemory;
use table_memory::tables::ChatSnapshot;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const KEYWORDS: [&str; 3] = ["Alice", "Bob", "Harbor"];

/// One dimension per keyword found in the text, plus a constant bias
struct KeywordEmbeddings;

impl Respond for KeywordEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).expect("request is json");
        let data: Vec<_> = body["input"]
            .as_array()
            .expect("input array")
            .iter()
            .map(|text| {
                let text = text.as_str().unwrap_or_default();
                let mut embedding: Vec<f32> = KEYWORDS
                    .iter()
                    .map(|k| if text.contains(k) { 1.0 } else { 0.0 })
                    .collect();
                embedding.push(0.1);
                serde_json::json!({ "embedding": embedding })
            })
            .collect();

        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": data }))
    }
}

const SNAPSHOT: &str = r#"{
    "conversation": { "name": "Alice", "chat_id": "chat-42" },
    "tables": [
        {
            "uid": "sheet_chars",
            "name": "Characters",
            "header": ["Name", "Home"],
            "rows": [["Alice", "Harbor"], ["Bob", "Mill"]]
        },
        {
            "uid": "sheet_hidden",
            "name": "Hidden",
            "enable": false,
            "header": ["Secret"],
            "rows": [["Bob"]]
        }
    ]
}"#;

async fn mock_api() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(KeywordEmbeddings)
        .mount(&server)
        .await;
    server
}

fn config_for(server: &MockServer) -> EmbeddingConfig {
    EmbeddingConfig {
        api_url: format!("{}/v1", server.uri()),
        api_key: "sk-integration".to_string(),
        retry_delay_ms: 1,
        ..EmbeddingConfig::default()
    }
}

async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or_default()
}

#[tokio::test]
async fn vectorize_search_and_reload_from_disk() -> Result<()> {
    let server = mock_api().await;
    let temp_dir = TempDir::new()?;
    let database_path = temp_dir.path().join("memory.db");
    let snapshot = Arc::new(ChatSnapshot::from_json(SNAPSHOT)?);

    {
        let store = Arc::new(SqliteCollectionStore::new(&database_path));
        let memory = VectorMemory::new(store, snapshot.clone(), snapshot.clone());
        memory.init(config_for(&server)).await?;

        let stats = memory.get_stats().await;
        assert_eq!(stats.chat_id.as_deref(), Some("Alice_chat-42"));
        assert_eq!(stats.total_vectors, 2);

        let hits = memory.search("Bob", 1).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "sheet_chars_row1");
        assert_eq!(hits[0].metadata.values, vec!["Bob", "Mill"]);

        let harbor = memory
            .search_filtered("Harbor", 5, |meta| meta.row_index == 0)
            .await?;
        assert_eq!(harbor.len(), 1);
        assert_eq!(harbor[0].id, "sheet_chars_row0");
    }

    // connection test, one table batch, two queries
    assert_eq!(request_count(&server).await, 4);

    let store = Arc::new(SqliteCollectionStore::new(&database_path));
    let memory = VectorMemory::new(store.clone(), snapshot.clone(), snapshot);
    memory.init(config_for(&server)).await?;

    // the stored collection is adopted; only the connection test is sent
    assert_eq!(request_count(&server).await, 5);
    assert_eq!(memory.get_stats().await.total_vectors, 2);

    let summaries = store.list_collections().await?;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].chat_id, "Alice_chat-42");
    assert_eq!(summaries[0].vector_count, 2);

    Ok(())
}

#[tokio::test]
async fn cleared_collection_stays_empty_after_reload() -> Result<()> {
    let server = mock_api().await;
    let temp_dir = TempDir::new()?;
    let database_path = temp_dir.path().join("memory.db");
    let snapshot = Arc::new(ChatSnapshot::from_json(SNAPSHOT)?);

    let store = Arc::new(SqliteCollectionStore::new(&database_path));
    let memory = VectorMemory::new(store.clone(), snapshot.clone(), snapshot.clone());
    memory.init(config_for(&server)).await?;
    memory.clear_current_chat().await?;

    let stored = store.get("Alice_chat-42").await?.expect("collection persisted");
    assert!(stored.vectors.is_empty());

    let requests = request_count(&server).await;
    let reloaded = VectorMemory::new(store, snapshot.clone(), snapshot);
    reloaded.init(config_for(&server)).await?;

    // an empty stored collection is not re-vectorized
    assert_eq!(reloaded.get_stats().await.total_vectors, 0);
    assert_eq!(request_count(&server).await, requests + 1);
    assert!(reloaded.search("Alice", 3).await?.is_empty());

    Ok(())
}
