use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::answer::AskRequest;
use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn ask_question(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation_id = payload.conversation_id.clone();
    let outcome = state.answers.ask(payload).await?;

    let audio_url = outcome
        .audio_file
        .as_ref()
        .map(|name| format!("/conversations/{}/{}", conversation_id, name));

    Ok(Json(json!({
        "response": outcome.response,
        "per_source_answers": outcome.per_source_answers,
        "audio_file": outcome.audio_file,
        "audio_url": audio_url,
    })))
}
