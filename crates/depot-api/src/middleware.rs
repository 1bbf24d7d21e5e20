use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

pub const X_SERVER_NAME: HeaderName = HeaderName::from_static("x-servername");

/// Stamp every response with the configured server name.
pub async fn server_name_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;

    match HeaderValue::from_str(&state.config.server.name) {
        Ok(value) => {
            response.headers_mut().insert(X_SERVER_NAME, value);
        }
        Err(_) => {
            tracing::warn!(name = %state.config.server.name, "Server name is not a valid header value");
        }
    }

    response
}
