//! Password checks, read-only mode and custom backends over HTTP.
//!
//! Run with: `cargo test -p depot-api --test access_test`

mod helpers;

use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{LocalStorageConfig, Record, StorageBackend};
use depot_storage::{
    CustomHandlerFactory, CustomHandlerRegistry, DownloadResponse, LocalHandler, StorageHandler,
    StorageResult, UploadOutcome, UploadRequest,
};
use helpers::{count_entries, setup_test_app_with};
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_upload_password() {
    let app = setup_test_app_with(
        |config| config.server.upload_password = Some("s3cret".to_string()),
        CustomHandlerRegistry::new(),
    )
    .await;

    let response = app
        .client()
        .post("/upload")
        .bytes(Bytes::from_static(b"x"))
        .await;
    assert_eq!(response.status_code(), 401);
    assert_eq!(
        response.header("www-authenticate"),
        "Bearer realm=\"depot\""
    );

    let response = app
        .client()
        .post("/upload")
        .add_header("Authorization", "Bearer wrong")
        .bytes(Bytes::from_static(b"x"))
        .await;
    assert_eq!(response.status_code(), 403);

    let response = app
        .client()
        .post("/upload")
        .add_header("Authorization", "Bearer s3cret")
        .bytes(Bytes::from_static(b"x"))
        .await;
    assert_eq!(response.status_code(), 200);

    let response = app
        .client()
        .post("/upload")
        .add_query_param("password", "s3cret")
        .bytes(Bytes::from_static(b"y"))
        .await;
    assert_eq!(response.status_code(), 200);

    // Downloads stay public
    let id = response.header("x-uuid");
    let response = app
        .client()
        .get("/download")
        .add_query_param("uuid", id.to_str().unwrap())
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_admin_password_guards_list_and_delete() {
    let app = setup_test_app_with(
        |config| config.server.admin_password = Some("root".to_string()),
        CustomHandlerRegistry::new(),
    )
    .await;

    let response = app
        .client()
        .post("/upload")
        .bytes(Bytes::from_static(b"x"))
        .await;
    assert_eq!(response.status_code(), 200);
    let id = response.header("x-uuid").to_str().unwrap().to_string();

    assert_eq!(app.client().get("/list").await.status_code(), 401);
    let response = app
        .client()
        .delete("/delete")
        .add_query_param("uuid", &id)
        .add_query_param("password", "nope")
        .await;
    assert_eq!(response.status_code(), 403);

    let response = app
        .client()
        .get("/list")
        .add_header("Authorization", "Bearer root")
        .await;
    assert_eq!(response.status_code(), 200);

    let response = app
        .client()
        .delete("/delete")
        .add_query_param("uuid", &id)
        .add_query_param("password", "root")
        .await;
    assert_eq!(response.status_code(), 204);
}

#[tokio::test]
async fn test_read_only_refuses_uploads() {
    let app = setup_test_app_with(
        |config| config.server.read_only = true,
        CustomHandlerRegistry::new(),
    )
    .await;

    let response = app
        .client()
        .put("/")
        .bytes(Bytes::from_static(b"x"))
        .await;
    assert_eq!(response.status_code(), 403);
    assert_eq!(count_entries(&app.storage_root), 0);
}

/// Custom backend that keeps files in its own local directory and tags them.
struct TaggingHandler {
    inner: LocalHandler,
}

#[async_trait]
impl StorageHandler for TaggingHandler {
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Custom
    }

    async fn handle_upload(&self, id: Uuid, request: UploadRequest) -> StorageResult<UploadOutcome> {
        let mut outcome = self.inner.handle_upload(id, request).await?;
        outcome.pointers.insert("handler", "tagging");
        Ok(outcome)
    }

    async fn handle_download(&self, record: &Record) -> StorageResult<DownloadResponse> {
        self.inner.handle_download(record).await
    }

    async fn handle_delete(&self, record: &Record) -> StorageResult<()> {
        self.inner.handle_delete(record).await
    }
}

struct TaggingFactory {
    handler: Arc<TaggingHandler>,
}

impl CustomHandlerFactory for TaggingFactory {
    fn name(&self) -> &str {
        "tagging"
    }

    fn build(&self, _config: Option<&serde_json::Value>) -> StorageResult<Arc<dyn StorageHandler>> {
        Ok(self.handler.clone())
    }
}

#[tokio::test]
async fn test_custom_backend_roundtrip() {
    let custom_dir = tempfile::tempdir().unwrap();
    let inner = LocalHandler::new(LocalStorageConfig {
        storage_directory: custom_dir.path().to_path_buf(),
        ..LocalStorageConfig::default()
    })
    .await
    .unwrap();

    let custom = CustomHandlerRegistry::new();
    custom
        .register(Arc::new(TaggingFactory {
            handler: Arc::new(TaggingHandler { inner }),
        }))
        .await;

    let app = setup_test_app_with(
        |config| {
            config.storage_backend = StorageBackend::Custom;
            config.custom.handler = Some("tagging".to_string());
        },
        custom,
    )
    .await;

    let response = app
        .client()
        .post("/upload")
        .add_header("X-Filename", "custom.txt")
        .bytes(Bytes::from_static(b"via custom"))
        .await;
    assert_eq!(response.status_code(), 200);
    let id = Uuid::parse_str(response.header("x-uuid").to_str().unwrap()).unwrap();

    let record = app
        .state
        .gateway
        .index()
        .get(id)
        .await
        .unwrap()
        .expect("record exists");
    assert_eq!(record.backend, StorageBackend::Custom);
    assert_eq!(record.pointer("handler"), Some("tagging"));
    assert!(custom_dir
        .path()
        .join(id.to_string())
        .join("custom.txt")
        .is_file());

    let response = app.client().get("/download").add_query_param("uuid", id).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.as_bytes().as_ref(), b"via custom");

    let response = app.client().delete("/").add_query_param("uuid", id).await;
    assert_eq!(response.status_code(), 204);
    assert_eq!(count_entries(custom_dir.path()), 0);
}
