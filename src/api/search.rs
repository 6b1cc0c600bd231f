use axum::{
    extract::State,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_cookies::Cookies;
use recordsearch_backend::models::{Record, SearchCriteria, SearchResult};
use recordsearch_backend::search::SearchOptions;

use crate::api::{require_user, ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(rename = "type")]
    pub criteria: SearchCriteria,
}

/// POST /api/search
///
/// The search runs on its own task. If the client goes away the handler is
/// dropped, the guard cancels the token, and the task stops after the
/// collection it is currently scanning.
pub async fn search(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Json(req): Json<SearchRequest>,
) -> ApiResult<SearchResult<Record>> {
    let user = require_user(&state, &cookies)?;

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let service = state.search.clone();
    let SearchRequest { query, criteria } = req;

    let task = tokio::spawn(async move {
        service
            .search(&query, criteria, SearchOptions::default().with_cancel(cancel))
            .await
    });

    let result = task.await.map_err(|e| {
        tracing::error!("Search task for {} failed: {}", user.username, e);
        ApiError::internal()
    })??;

    Ok(Json(ApiResponse::success(result)))
}
