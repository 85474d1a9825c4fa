use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;

use crate::core::errors::ApiError;
use crate::state::AppState;

/// Serve a generated audio artifact for playback in the chat history.
pub async fn serve_audio(
    State(state): State<Arc<AppState>>,
    Path((conv_id, filename)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let path = state.conversations.audio_path(&conv_id, &filename)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read audio file: {}", e)))?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], bytes))
}
