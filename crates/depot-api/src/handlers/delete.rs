use crate::error::HttpAppError;
use crate::handlers::IdQuery;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
};
use std::sync::Arc;

#[tracing::instrument(skip(state), fields(operation = "delete"))]
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<StatusCode, HttpAppError> {
    let id = query.require()?;
    state.gateway.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
