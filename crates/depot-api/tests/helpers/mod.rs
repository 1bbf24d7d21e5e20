//! Test helpers: build the app over a temp SQLite database and storage root.
//!
//! Run from workspace root: `cargo test -p depot-api`.

#![allow(dead_code)]

use axum_test::TestServer;
use depot_api::setup::{build_state, routes};
use depot_api::AppState;
use depot_core::Config;
use depot_db::{connect_pool, MIGRATOR};
use depot_storage::{create_handlers, CustomHandlerRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Test application: server, state and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub storage_root: PathBuf,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Per-upload directories currently under the storage root
    pub fn stored_dirs(&self) -> usize {
        count_entries(&self.storage_root)
    }
}

pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.count())
        .unwrap_or(0)
}

/// Setup test app with isolated DB and local storage.
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(|_| {}, CustomHandlerRegistry::new()).await
}

pub async fn setup_test_app_with(
    configure: impl FnOnce(&mut Config),
    custom: CustomHandlerRegistry,
) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let storage_root = temp_dir.path().join("files");

    let mut config = Config::default();
    config.database_url = format!("sqlite://{}", temp_dir.path().join("depot.db").display());
    config.local.storage_directory = storage_root.clone();
    configure(&mut config);

    let pool = connect_pool(&config.database_url, 5, Duration::from_secs(30))
        .await
        .expect("Failed to connect to test database");
    MIGRATOR
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let handlers = create_handlers(&config, custom)
        .await
        .expect("Failed to create storage handlers");

    let state = build_state(config.clone(), pool, handlers);
    let app = routes::setup_routes(&config, state.clone());
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        state,
        storage_root,
        _temp_dir: temp_dir,
    }
}
