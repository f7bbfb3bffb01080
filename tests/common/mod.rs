//! Test helpers for web API tests.
//!
//! Provides a test server over a temporary library and token helpers.

#![allow(dead_code)]

use std::sync::Arc;

use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tempfile::TempDir;

use scribevault::config::{FilesConfig, IngestConfig};
use scribevault::web::handlers::AppState;
use scribevault::web::middleware::{JwtClaims, JwtState};
use scribevault::web::router::create_router;
use scribevault::{Database, Library};

/// Secret shared by the test server and the tokens it accepts.
pub const TEST_SECRET: &str = "test-secret-key-for-testing-only";

/// A running test server and the state behind it.
pub struct TestContext {
    pub server: TestServer,
    pub library: Library,
    /// Keeps storage and staging alive for the test.
    pub dir: TempDir,
}

/// Builder for [`TestContext`].
pub struct TestContextBuilder {
    files: Option<FilesConfig>,
    ingest: IngestConfig,
}

impl TestContextBuilder {
    pub fn new() -> Self {
        Self {
            files: None,
            ingest: IngestConfig::default(),
        }
    }

    /// Override the file limits. Paths are replaced with temporary ones.
    pub fn with_files(mut self, files: FilesConfig) -> Self {
        self.files = Some(files);
        self
    }

    /// Let URL ingestion reach the loopback interface.
    pub fn allow_private_hosts(mut self) -> Self {
        self.ingest.allow_private_hosts = true;
        self
    }

    pub async fn build(self) -> TestContext {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let files = FilesConfig {
            storage_path: dir.path().join("files").to_string_lossy().into_owned(),
            staging_path: dir.path().join("staging").to_string_lossy().into_owned(),
            ..self.files.unwrap_or_default()
        };

        let db = Database::open_in_memory()
            .await
            .expect("Failed to create test database");
        let library = Library::new(db, &files, &self.ingest).expect("Failed to create library");

        let app_state = Arc::new(AppState::new(library.clone()));
        let jwt_state = Arc::new(JwtState::new(TEST_SECRET));
        let router = create_router(app_state, jwt_state, &[]);
        let server = TestServer::new(router).expect("Failed to create test server");

        TestContext {
            server,
            library,
            dir,
        }
    }
}

/// Create a test server with default limits.
pub async fn create_test_context() -> TestContext {
    TestContextBuilder::new().build().await
}

/// Mint a token for `user_id` with `role`.
pub fn token_for(user_id: &str, role: &str) -> String {
    let now = chrono::Utc::now().timestamp() as u64;
    let claims = JwtClaims {
        sub: user_id.to_string(),
        role: role.to_string(),
        iat: now,
        exp: now + 3600,
        jti: Some(uuid::Uuid::new_v4().to_string()),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("Failed to encode token")
}

/// Bearer header value for a member.
pub fn member(user_id: &str) -> String {
    format!("Bearer {}", token_for(user_id, "member"))
}

/// Bearer header value for an admin.
pub fn admin(user_id: &str) -> String {
    format!("Bearer {}", token_for(user_id, "admin"))
}

/// Multipart form for one chunk.
pub fn chunk_form(upload_id: &str, chunk_index: u32, bytes: Vec<u8>) -> MultipartForm {
    MultipartForm::new()
        .add_text("uploadId", upload_id.to_string())
        .add_text("chunkIndex", chunk_index.to_string())
        .add_part("chunk", Part::bytes(bytes).file_name("blob"))
}

/// Upload `content` as a single-chunk file and return the file JSON.
pub async fn upload_file(
    ctx: &TestContext,
    auth: &str,
    name: &str,
    content: &[u8],
    folder_id: Option<i64>,
) -> Value {
    let upload_id = uuid::Uuid::new_v4().to_string();
    ctx.server
        .post("/api/upload/chunk")
        .add_header(axum::http::header::AUTHORIZATION, auth.to_string())
        .multipart(chunk_form(&upload_id, 0, content.to_vec()))
        .await
        .assert_status_ok();

    let response = ctx
        .server
        .post("/api/upload/complete")
        .add_header(axum::http::header::AUTHORIZATION, auth.to_string())
        .json(&json!({
            "uploadId": upload_id,
            "fileName": name,
            "totalChunks": 1,
            "folderId": folder_id,
        }))
        .await;
    response.assert_status_ok();
    response.json::<Value>()["file"].clone()
}

/// Create a folder and return its id.
pub async fn create_folder(
    ctx: &TestContext,
    auth: &str,
    name: &str,
    parent_id: Option<i64>,
) -> i64 {
    let response = ctx
        .server
        .post("/api/folders")
        .add_header(axum::http::header::AUTHORIZATION, auth.to_string())
        .json(&json!({ "name": name, "parentId": parent_id }))
        .await;
    response.assert_status_ok();
    response.json::<Value>()["folder"]["id"]
        .as_i64()
        .expect("folder id")
}
