use crate::error::HttpAppError;
use crate::handlers::IdQuery;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use std::sync::Arc;

/// Stream a stored file back to the client.
#[tracing::instrument(skip(state), fields(operation = "download"))]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<Response, HttpAppError> {
    let id = query.require()?;
    let (record, download) = state.gateway.download(id).await?;

    tracing::debug!(
        record_id = %record.id,
        backend = %record.backend,
        size_bytes = record.size,
        "Serving file"
    );

    let mut response = Response::new(Body::from_stream(download.body));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().extend(download.headers);
    Ok(response)
}
