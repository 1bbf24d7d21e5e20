//! Route configuration and setup

use crate::auth::access_control;
use crate::handlers::{
    delete::delete_file, download::download_file, list::list_files, upload::upload_file,
    upload::X_UUID,
};
use crate::middleware::{server_name_middleware, X_SERVER_NAME};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::{delete, get, post},
    Router,
};
use depot_core::Config;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

const HTTP_CONCURRENCY_LIMIT: usize = 1024;

/// Request body cap: the largest per-file limit of any backend plus framing.
/// Exact per-file limits are enforced by the handlers while streaming.
fn body_limit(config: &Config) -> usize {
    let limit = config
        .local
        .max_file_size
        .max(config.proxy.max_file_size)
        .saturating_add(MULTIPART_OVERHEAD);
    usize::try_from(limit).unwrap_or(usize::MAX)
}

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
        .expose_headers([X_UUID, X_SERVER_NAME]);

    Router::new()
        .route(
            "/",
            get(download_file)
                .post(upload_file)
                .put(upload_file)
                .delete(delete_file),
        )
        .route("/upload", post(upload_file).put(upload_file))
        .route("/download", get(download_file))
        .route("/delete", delete(delete_file))
        .route("/list", get(list_files))
        .with_state(state.clone())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit(config)))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            access_control,
        ))
        .layer(ConcurrencyLimitLayer::new(HTTP_CONCURRENCY_LIMIT))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state,
            server_name_middleware,
        ))
}
