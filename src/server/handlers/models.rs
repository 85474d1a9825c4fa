use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::core::errors::ApiError;
use crate::state::AppState;

/// Chat models available from the provider; the embedding model is not
/// offered for answering.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let models = state.llm.list_models().await?;
    let names: Vec<String> = models.into_iter().map(|m| m.id).collect();
    Ok(Json(names))
}
