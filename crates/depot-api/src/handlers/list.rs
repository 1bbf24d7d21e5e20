use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use depot_core::RecordSummary;
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Page through stored files with their download statistics, oldest first.
#[tracing::instrument(skip(state), fields(operation = "list"))]
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<RecordSummary>>, HttpAppError> {
    let page = query.page.unwrap_or(DEFAULT_PAGE);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);

    let summaries = state.gateway.list(page, limit).await?;
    Ok(Json(summaries))
}
