//! End-to-end tests over a real socket

use std::sync::Arc;
use std::time::Duration;

use ms_api::error::ErrorResponse;
use ms_api::handlers::StatusResponse;
use ms_api::{AppState, router, serve};
use ms_core::{Memory, MemoryStore, ServerConfig};
use reqwest::StatusCode;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    shutdown: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
    store: Arc<MemoryStore>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(ServerConfig::default()).await
    }

    async fn start_with(config: ServerConfig) -> Self {
        let store = Arc::new(MemoryStore::in_memory().unwrap());
        let shutdown = CancellationToken::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = router(AppState::new(Arc::clone(&store), shutdown.clone()), &config);
        let handle = tokio::spawn(serve(listener, app, shutdown.clone()));

        Self {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::new(),
            shutdown,
            handle,
            store,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.client.post(self.url(path)).json(&body).send().await.unwrap()
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    async fn status(&self, path: &str, body: serde_json::Value) -> StatusResponse {
        let resp = self.post(path, body).await;
        assert_eq!(resp.status(), StatusCode::OK, "POST {}", path);
        resp.json().await.unwrap()
    }

    async fn memories(&self, path: &str) -> Vec<Memory> {
        let resp = self.get(path).await;
        assert_eq!(resp.status(), StatusCode::OK, "GET {}", path);
        resp.json().await.unwrap()
    }

    async fn stop(self) {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

#[tokio::test]
async fn test_memory_lifecycle() {
    let server = TestServer::start().await;
    let mem_id = "test-memory-title";

    let saved = server
        .status("/save-memory", json!({"memory_id": mem_id, "content": "This is the first version."}))
        .await;
    assert_eq!(saved.status, "saved");
    assert_eq!(saved.memory_id, mem_id);
    assert_eq!(saved.version, Some(1));

    let listed = server.memories("/list-memories").await;
    assert!(listed
        .iter()
        .any(|m| m.memory_id == mem_id && m.content == "This is the first version." && !m.archived));

    let updated = server
        .status("/update-memory", json!({"memory_id": mem_id, "content": "This is the updated version."}))
        .await;
    assert_eq!(updated.status, "updated");
    assert_eq!(updated.version, Some(2));

    let resp = server.get(&format!("/get-memory-by-id/{}", mem_id)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let current: Memory = resp.json().await.unwrap();
    assert_eq!(current.content, "This is the updated version.");
    assert_eq!(current.version, 2);
    assert!(!current.archived);

    let found = server.memories("/search-memories?q=updated").await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].version, 2);

    let archived = server.status("/delete-memory", json!({"memory_id": mem_id})).await;
    assert_eq!(archived.status, "archived");
    assert_eq!(archived.version, None);

    let resp = server.get("/list-memories").await;
    let body = resp.text().await.unwrap();
    assert!(!body.contains(mem_id));
    assert_eq!(body, "[]");

    // History survives in the table
    let history = server.store.history(mem_id).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|m| m.archived));

    server.stop().await;
}

#[tokio::test]
async fn test_multiple_lineages_and_archiving() {
    let server = TestServer::start().await;

    for (id, versions) in [("memA", vec!["A1", "A2", "A3"]), ("memB", vec!["B1", "B2"]), ("memC", vec!["C1"])] {
        for (i, content) in versions.iter().enumerate() {
            let saved = server
                .status("/save-memory", json!({"memory_id": id, "content": content}))
                .await;
            assert_eq!(saved.version, Some(i as i64 + 1));
        }
    }

    server.status("/delete-memory", json!({"memory_id": "memB"})).await;

    let listed = server.memories("/list-memories").await;
    let summary: Vec<(&str, i64)> = listed
        .iter()
        .map(|m| (m.memory_id.as_str(), m.version))
        .collect();
    assert_eq!(
        summary,
        vec![("memA", 3), ("memA", 2), ("memA", 1), ("memC", 1)]
    );

    let resp = server.get("/get-memory-by-id/memB").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let current: Memory = server.get("/get-memory-by-id/memA").await.json().await.unwrap();
    assert_eq!(current.content, "A3");

    server.stop().await;
}

#[tokio::test]
async fn test_tags() {
    let server = TestServer::start().await;

    server
        .status("/save-memory", json!({"memory_id": "Z", "content": "c", "tags": ["p", "shared"]}))
        .await;
    server
        .status("/save-memory", json!({"memory_id": "W", "content": "w", "tags": ["shared", "pp"]}))
        .await;
    server
        .status("/save-memory", json!({"memory_id": "V", "content": "v", "tags": null}))
        .await;

    let shared = server.memories("/list-memories-by-tag?tag=shared").await;
    let ids: Vec<&str> = shared.iter().map(|m| m.memory_id.as_str()).collect();
    assert_eq!(ids, vec!["W", "Z"]);

    let p = server.memories("/list-memories-by-tag?tag=p").await;
    assert_eq!(p.len(), 1);
    assert_eq!(p[0].memory_id, "Z");
    assert_eq!(p[0].tags, vec!["p".to_string(), "shared".to_string()]);

    server.status("/delete-memory", json!({"memory_id": "Z"})).await;
    assert!(server.memories("/list-memories-by-tag?tag=p").await.is_empty());

    let untagged: Memory = server.get("/get-memory-by-id/V").await.json().await.unwrap();
    assert!(untagged.tags.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_search() {
    let server = TestServer::start().await;

    server.status("/save-memory", json!({"memory_id": "one", "content": "alpha"})).await;
    server.status("/save-memory", json!({"memory_id": "two", "content": "beta"})).await;

    assert_eq!(server.memories("/search-memories?q=").await.len(), 2);
    assert_eq!(server.memories("/search-memories").await.len(), 2);
    assert_eq!(server.memories("/search-memories?q=two").await.len(), 1);

    let resp = server.get("/search-memories?q=zzz-none-match").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "[]");

    server.stop().await;
}

#[tokio::test]
async fn test_validation_errors() {
    let server = TestServer::start().await;

    let resp = server.post("/save-memory", json!({"content": "no id"})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body.error, "Bad Request");

    let resp = server.post("/update-memory", json!({"memory_id": "", "content": "x"})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = server.post("/delete-memory", json!({})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = server
        .client
        .post(server.url("/save-memory"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = server.get("/list-memories-by-tag").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body.detail, "Missing tag parameter");

    let resp = server.get("/list-memories-by-tag?tag=").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Nothing reached the store
    assert!(server.store.list_current().unwrap().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_not_found() {
    let server = TestServer::start().await;

    let resp = server.get("/get-memory-by-id/missing").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body.error, "Not Found");

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_path_returns_json_error() {
    let server = TestServer::start().await;

    // %FF does not decode to UTF-8
    let resp = server.get("/get-memory-by-id/%FF").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body.error, "Bad Request");
    assert!(!body.detail.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_archive_is_idempotent() {
    let server = TestServer::start().await;

    server.status("/save-memory", json!({"memory_id": "gone", "content": "x"})).await;
    let first = server.status("/delete-memory", json!({"memory_id": "gone"})).await;
    let second = server.status("/delete-memory", json!({"memory_id": "gone"})).await;
    assert_eq!(first, second);
    assert!(server.memories("/list-memories").await.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_viewer_and_metadata_routes() {
    let server = TestServer::start().await;

    let resp = server.get("/").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.text().await.unwrap().contains("<title>Memory Server</title>"));

    let doc: serde_json::Value = server.get("/openapi.json").await.json().await.unwrap();
    assert!(doc["paths"]["/save-memory"].is_object());

    let health: serde_json::Value = server.get("/health").await.json().await.unwrap();
    assert_eq!(health["status"], "healthy");

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_endpoint_stops_server() {
    let server = TestServer::start().await;

    let resp = server.client.post(server.url("/shutdown")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "Shutting down...");

    assert!(server.shutdown.is_cancelled());
    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_endpoint_can_be_disabled() {
    let config = ServerConfig {
        shutdown_endpoint: false,
        ..ServerConfig::default()
    };
    let server = TestServer::start_with(config).await;

    let resp = server.client.post(server.url("/shutdown")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(!server.shutdown.is_cancelled());

    server.stop().await;
}
