use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_cookies::Cookies;
use recordsearch_backend::models::{CollectionSummary, Record};

use crate::api::{require_user, ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 { 50 }

#[derive(Debug, Deserialize)]
pub struct InsertRequest {
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertResponse {
    pub inserted_id: i64,
}

/// GET /api/collections
pub async fn list_collections(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
) -> ApiResult<Vec<CollectionSummary>> {
    require_user(&state, &cookies)?;
    Ok(Json(ApiResponse::success(state.registry.summaries())))
}

/// GET /api/collections/:name/records
pub async fn browse_records(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path(name): Path<String>,
    Query(query): Query<BrowseQuery>,
) -> ApiResult<Vec<Record>> {
    require_user(&state, &cookies)?;
    let records = state.search.browse(&name, query.limit, query.offset).await?;
    Ok(Json(ApiResponse::success(records)))
}

/// POST /api/collections/:name/records
pub async fn insert_record(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path(name): Path<String>,
    Json(req): Json<InsertRequest>,
) -> ApiResult<InsertResponse> {
    let user = require_user(&state, &cookies)?;
    let inserted_id = state.insert.insert(&name, &req.fields).await?;
    tracing::debug!("{} added record {} to {}", user.username, inserted_id, name);
    Ok(Json(ApiResponse::success(InsertResponse { inserted_id })))
}
