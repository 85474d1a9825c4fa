use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::extractor::{DocumentBlob, NO_CONTENT_SENTINEL};
use crate::rag::RebuildOutcome;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    #[serde(default)]
    pub urls: String,
    #[serde(default)]
    pub pdfs: Vec<PdfUpload>,
}

/// A PDF upload, base64-encoded by the front-end. Decoding happens here at
/// the boundary; the extractor only ever sees raw bytes.
#[derive(Debug, Deserialize)]
pub struct PdfUpload {
    pub name: String,
    pub data: String,
}

/// Extract the submitted URLs/PDFs, store the result as a new source, and
/// rebuild the vector index over every stored source.
pub async fn extract_content(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExtractRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let url_input = payload.urls.trim().to_string();
    if url_input.is_empty() && payload.pdfs.is_empty() {
        return Ok(Json(json!({ "content": "" })));
    }

    let mut documents = Vec::with_capacity(payload.pdfs.len());
    for upload in &payload.pdfs {
        let bytes = BASE64
            .decode(&upload.data)
            .map_err(|e| ApiError::BadRequest(format!("Invalid PDF upload {}: {}", upload.name, e)))?;
        documents.push(DocumentBlob {
            name: upload.name.clone(),
            bytes,
        });
    }

    let extracted = state.extractor.extract(&url_input, &documents).await;

    if !extracted.trim().is_empty() && extracted.trim() != NO_CONTENT_SENTINEL {
        state.sources.save(&extracted)?;

        let all_sources = state.sources.read_all()?;
        let outcome = state
            .index
            .rebuild(
                &all_sources,
                &state.chunker,
                state.config.rag.index_chunk_tokens,
                state.llm.as_ref(),
                &state.config.ollama.embed_model,
            )
            .await?;
        if outcome == RebuildOutcome::EmptyCorpus {
            tracing::warn!("Index rebuild found no chunks across stored sources");
        }
    }

    Ok(Json(json!({ "content": extracted })))
}

pub async fn list_extractions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let listed = state.sources.list()?;
    Ok(Json(listed))
}

pub async fn get_extraction(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let content = state.sources.read(&filename)?;
    Ok(Json(json!({ "content": content })))
}

pub async fn delete_extraction(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.sources.delete(&filename)?;
    Ok(Json(json!({ "status": "deleted" })))
}
