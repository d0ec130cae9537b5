use super::extract::ApiJson;
use crate::build::IndexCreationProgress;
use crate::error::Result;
use crate::locator::IndexInfo;
use crate::state::AppState;
use crate::types::{BuildAccepted, IndexCreationRequest, SearchRequest, SearchResponse, SystemStatus};
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct IndicesResponse {
    pub indices: Vec<IndexInfo>,
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    Json(state.search.status().await)
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    tracing::info!("Received search request: {}", request.query);
    Ok(Json(state.search.search(&request).await?))
}

pub async fn list_indices(State(state): State<Arc<AppState>>) -> Result<Json<IndicesResponse>> {
    let indices = state.list_indices().await?;
    Ok(Json(IndicesResponse { indices }))
}

pub async fn create_index(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<IndexCreationRequest>,
) -> Result<Json<BuildAccepted>> {
    tracing::info!(
        "Received index creation request: {} (backend={}, sources={:?})",
        request.name,
        request.backend,
        request.data_sources
    );
    Ok(Json(state.builds.create(request).await?))
}

pub async fn get_creation_progress(
    State(state): State<Arc<AppState>>,
    Path(progress_id): Path<String>,
) -> Result<Json<IndexCreationProgress>> {
    Ok(Json(state.builds.get_progress(&progress_id)?))
}

pub async fn cancel_creation(
    State(state): State<Arc<AppState>>,
    Path(progress_id): Path<String>,
) -> Result<Json<BuildAccepted>> {
    Ok(Json(state.builds.cancel(&progress_id)?))
}
