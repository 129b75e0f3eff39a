use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.pipeline.state();
    Json(json!({
        "status": "healthy",
        "rag_status": snapshot.status,
        "message": snapshot.message
    }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.pipeline.state();
    Json(json!({
        "status": snapshot.status,
        "message": snapshot.message,
        "updated_at": snapshot.updated_at,
        "index": state.pipeline.index_manifest()
    }))
}
