use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{ask, conversations, extractions, health, models};
use crate::state::AppState;

/// The application router: content ingestion, question answering, source
/// management, and conversation audio.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/list_models", get(models::list_models))
        .route("/extract_content", post(extractions::extract_content))
        .route("/ask_question", post(ask::ask_question))
        .route("/list_extractions", get(extractions::list_extractions))
        .route("/get_extraction/:filename", get(extractions::get_extraction))
        .route(
            "/delete_extraction/:filename",
            delete(extractions::delete_extraction),
        )
        .route(
            "/conversations/:conv_id/:filename",
            get(conversations::serve_audio),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}
